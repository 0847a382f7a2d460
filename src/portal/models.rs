//! Records exchanged with the booking portal and written to the output stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::portal::errors::PortalError;

/// A building within a campus, as listed by the portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Building {
    pub id: String,
    pub name: String,
}

/// A bookable room within a building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub uid: String,
    pub name: String,
}

/// A booking event exactly as the `bookingstatus3` endpoint returns it.
///
/// `start`/`end` are UTC epoch seconds but arrive as numbers or numeric
/// strings depending on the record, so they are kept raw until
/// [`RawEvent::bounds`] is called.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub start: Value,
    #[serde(default)]
    pub end: Value,
    #[serde(default)]
    pub color: Value,
    #[serde(default, rename = "textColor")]
    pub text_color: Value,
}

impl RawEvent {
    /// Parsed `(start, end)` epoch seconds.
    pub fn bounds(&self) -> Result<(i64, i64), PortalError> {
        Ok((
            parse_epoch(&self.start, "start")?,
            parse_epoch(&self.end, "end")?,
        ))
    }
}

fn parse_epoch(value: &Value, field: &str) -> Result<i64, PortalError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        PortalError::format(
            format!("event {field}"),
            anyhow::anyhow!("expected epoch seconds, got {value}"),
        )
    })
}

/// A raw event with display fields computed in Korea Standard Time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedEvent {
    pub id: Value,
    pub title: String,
    /// `YYYY-MM-DD` of the local start.
    pub date: String,
    pub weekday: &'static str,
    /// `HH:MM - HH:MM`, local.
    pub time: String,
    /// ISO-8601 local timestamp with `+09:00` offset.
    pub start: String,
    pub end: String,
    pub color: Value,
    #[serde(rename = "textColor")]
    pub text_color: Value,
}

/// One line of the output file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    pub campus: String,
    pub building_id: String,
    pub building_name: String,
    pub room_uid: String,
    pub room_name: String,
    #[serde(flatten)]
    pub event: NormalizedEvent,
}

impl OutputRecord {
    pub fn new(campus: &str, building: &Building, room: &Room, event: NormalizedEvent) -> Self {
        Self {
            campus: campus.to_owned(),
            building_id: building.id.clone(),
            building_name: building.name.clone(),
            room_uid: room.uid.clone(),
            room_name: room.name.clone(),
            event,
        }
    }
}
