//! Booking-status (event list) fetches.

use chrono::{NaiveDate, Utc};
use reqwest::header::{ACCEPT, REFERER};
use tracing::debug;

use crate::calendar::EventWindow;
use crate::portal::errors::PortalError;
use crate::portal::json::parse_json;
use crate::portal::models::RawEvent;
use crate::portal::session::{Endpoints, LONG_TIMEOUT, Session};

const EVENTS_ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";
const BOOKING_STATUS: &str = "bookingstatus3";

/// Query string for one room over one window; `_` is a millisecond cache buster.
pub fn booking_status_query(
    room_uid: &str,
    window: EventWindow,
    cache_buster_ms: i64,
) -> Vec<(&'static str, String)> {
    vec![
        ("mid", "K06".to_owned()),
        ("act", BOOKING_STATUS.to_owned()),
        ("uid", room_uid.to_owned()),
        ("start", window.start.to_string()),
        ("end", window.end.to_string()),
        ("_", cache_buster_ms.to_string()),
    ]
}

/// Raw events for `room_uid` between local midnight of `week_start` and local
/// midnight after `week_end`.
pub async fn fetch_events(
    session: &Session,
    endpoints: &Endpoints,
    room_uid: &str,
    week_start: NaiveDate,
    week_end: NaiveDate,
) -> Result<Vec<RawEvent>, PortalError> {
    let window = EventWindow::covering(week_start, week_end)?;
    let query = booking_status_query(room_uid, window, Utc::now().timestamp_millis());

    let request = session
        .client()
        .get(endpoints.ajax())
        .query(&query)
        .header("X-Requested-With", "XMLHttpRequest")
        .header(ACCEPT, EVENTS_ACCEPT)
        .header(REFERER, endpoints.calendar_page().as_str())
        .timeout(LONG_TIMEOUT);

    let page = session.fetch(request).await?;
    let events: Vec<RawEvent> = parse_json(&page.body, "event list")?;
    debug!(
        room_uid,
        start = window.start,
        end = window.end,
        count = events.len(),
        "Events fetched"
    );
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_carries_window_and_cache_buster() {
        let window = EventWindow {
            start: 1_756_652_400,
            end: 1_757_257_200,
        };
        let query = booking_status_query("R-17", window, 1_756_700_000_123);
        assert_eq!(
            query,
            vec![
                ("mid", "K06".to_string()),
                ("act", "bookingstatus3".to_string()),
                ("uid", "R-17".to_string()),
                ("start", "1756652400".to_string()),
                ("end", "1757257200".to_string()),
                ("_", "1756700000123".to_string()),
            ]
        );
    }
}
