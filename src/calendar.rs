//! Korea Standard Time week arithmetic and event normalization.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Asia::Seoul;
use chrono_tz::Tz;

use crate::portal::errors::PortalError;
use crate::portal::models::{NormalizedEvent, RawEvent};

/// Local timezone of the booking portal (fixed UTC+9, no DST).
pub const KST: Tz = Seoul;

/// Weekday labels, Monday first.
pub const WEEKDAY_LABELS: [&str; 7] = ["월", "화", "수", "목", "금", "토", "일"];

/// Today's date in KST.
pub fn today_kst() -> NaiveDate {
    Utc::now().with_timezone(&KST).date_naive()
}

/// Monday of the week containing `anchor`.
pub fn week_start(anchor: NaiveDate) -> NaiveDate {
    anchor - TimeDelta::days(i64::from(anchor.weekday().num_days_from_monday()))
}

/// A Monday–Sunday span of local dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Week {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Week {
    /// The week containing `anchor`.
    pub fn containing(anchor: NaiveDate) -> Self {
        let start = week_start(anchor);
        Self {
            start,
            end: start + TimeDelta::days(6),
        }
    }

    /// The `n`-th week after this one (`0` is this week).
    pub fn offset(&self, n: u32) -> Self {
        let shift = TimeDelta::weeks(i64::from(n));
        Self {
            start: self.start + shift,
            end: self.end + shift,
        }
    }

    /// `count` consecutive weeks starting with the week containing `anchor`.
    pub fn sequence(anchor: NaiveDate, count: u32) -> Vec<Week> {
        let first = Self::containing(anchor);
        (0..count).map(|n| first.offset(n)).collect()
    }
}

/// Half-open `[start, end)` interval in UTC epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWindow {
    pub start: i64,
    pub end: i64,
}

impl EventWindow {
    /// Local midnight of `first_day` through local midnight after `last_day`.
    pub fn covering(first_day: NaiveDate, last_day: NaiveDate) -> Result<Self, PortalError> {
        let after_last = last_day.succ_opt().ok_or_else(|| window_error(last_day))?;
        Ok(Self {
            start: kst_midnight(first_day)?.timestamp(),
            end: kst_midnight(after_last)?.timestamp(),
        })
    }
}

fn kst_midnight(date: NaiveDate) -> Result<DateTime<Tz>, PortalError> {
    KST.from_local_datetime(&date.and_time(NaiveTime::MIN))
        .single()
        .ok_or_else(|| window_error(date))
}

fn window_error(date: NaiveDate) -> PortalError {
    PortalError::format(
        "event window",
        anyhow::anyhow!("{date} has no unambiguous local midnight"),
    )
}

fn from_epoch(secs: i64, field: &str) -> Result<DateTime<Tz>, PortalError> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|utc| utc.with_timezone(&KST))
        .ok_or_else(|| {
            PortalError::format(
                format!("event {field}"),
                anyhow::anyhow!("epoch {secs} is out of range"),
            )
        })
}

/// Convert a raw event into its display form in KST.
pub fn normalize(ev: &RawEvent) -> Result<NormalizedEvent, PortalError> {
    let (start_secs, end_secs) = ev.bounds()?;
    let start = from_epoch(start_secs, "start")?;
    let end = from_epoch(end_secs, "end")?;

    Ok(NormalizedEvent {
        id: ev.id.clone(),
        title: ev.title.as_deref().unwrap_or_default().trim().to_owned(),
        date: start.format("%Y-%m-%d").to_string(),
        weekday: WEEKDAY_LABELS[start.weekday().num_days_from_monday() as usize],
        time: format!("{} - {}", start.format("%H:%M"), end.format("%H:%M")),
        start: iso_local(&start),
        end: iso_local(&end),
        color: ev.color.clone(),
        text_color: ev.text_color.clone(),
    })
}

fn iso_local(dt: &DateTime<Tz>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}
