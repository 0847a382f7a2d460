//! Building and room enumeration through the portal's AJAX option lists.

use chrono::Utc;
use html_scraper::{Html, Selector};
use reqwest::header::{ACCEPT, REFERER};
use tracing::debug;

use crate::portal::errors::PortalError;
use crate::portal::models::{Building, Room};
use crate::portal::session::{Endpoints, PAGE_TIMEOUT, Session};

const OPTIONS_ACCEPT: &str = "text/html, */*; q=0.01";
const LIST_BUILDINGS: &str = "getUserBuilding4";
const LIST_ROOMS: &str = "getUserRoomB";

/// `(value, label)` pairs of every `<option>` with a non-empty value, in document order.
pub fn parse_options(body: &str) -> Vec<(String, String)> {
    let fragment = Html::parse_fragment(body);
    let option_sel = Selector::parse("option").unwrap();

    fragment
        .select(&option_sel)
        .filter_map(|opt| {
            let value = opt.attr("value").unwrap_or_default().trim();
            if value.is_empty() {
                return None;
            }
            let label = opt.text().collect::<String>().trim().to_owned();
            Some((value.to_owned(), label))
        })
        .collect()
}

async fn fetch_options(
    session: &Session,
    endpoints: &Endpoints,
    action: &str,
    params: &[(&str, &str)],
) -> Result<Vec<(String, String)>, PortalError> {
    let ntime = Utc::now().timestamp().to_string();
    let mut form: Vec<(&str, &str)> = vec![("mid", "K06"), ("act", action)];
    form.extend_from_slice(params);
    form.push(("ntime", ntime.as_str()));

    let request = session
        .client()
        .post(endpoints.ajax())
        .form(&form)
        .header("X-Requested-With", "XMLHttpRequest")
        .header(ACCEPT, OPTIONS_ACCEPT)
        .header(REFERER, endpoints.calendar_page().as_str())
        .timeout(PAGE_TIMEOUT);

    let page = session.fetch(request).await?;
    let options = parse_options(&page.body);
    debug!(action, count = options.len(), "Option list fetched");
    Ok(options)
}

/// Buildings of `campus`, in the order the portal lists them.
pub async fn list_buildings(
    session: &Session,
    endpoints: &Endpoints,
    campus: &str,
) -> Result<Vec<Building>, PortalError> {
    let options = fetch_options(session, endpoints, LIST_BUILDINGS, &[("a", campus)]).await?;
    Ok(options
        .into_iter()
        .map(|(id, name)| Building { id, name })
        .collect())
}

/// Rooms of one building.
pub async fn list_rooms(
    session: &Session,
    endpoints: &Endpoints,
    campus: &str,
    building_id: &str,
) -> Result<Vec<Room>, PortalError> {
    let options = fetch_options(
        session,
        endpoints,
        LIST_ROOMS,
        &[("a", campus), ("b", building_id)],
    )
    .await?;
    Ok(options
        .into_iter()
        .map(|(uid, name)| Room { uid, name })
        .collect())
}
