//! The portal as seen by the crawl orchestrator.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::portal::errors::PortalError;
use crate::portal::login::{self, AccountCategory, Credentials};
use crate::portal::models::{Building, RawEvent, Room};
use crate::portal::session::{Endpoints, Session};
use crate::portal::{catalog, events};

/// Operations the crawler needs from the booking system.
///
/// `login` is the only method that mutates session state; everything else
/// assumes an authenticated session.
#[async_trait]
pub trait BookingPortal: Send + Sync {
    /// Authenticate from a clean cookie jar. `Ok(false)` means the handshake
    /// completed but the session verifier did not see a signed-in page.
    async fn login(&mut self) -> Result<bool, PortalError>;

    /// Visit the calendar page so subsequent AJAX calls have session state.
    async fn prepare_calendar(&self) -> Result<(), PortalError>;

    async fn list_buildings(&self, campus: &str) -> Result<Vec<Building>, PortalError>;

    async fn list_rooms(&self, campus: &str, building_id: &str)
    -> Result<Vec<Room>, PortalError>;

    async fn fetch_events(
        &self,
        room_uid: &str,
        week_start: NaiveDate,
        week_end: NaiveDate,
    ) -> Result<Vec<RawEvent>, PortalError>;
}

/// Live client for the Yonsei space-booking portal.
pub struct SpacePortal {
    session: Session,
    endpoints: Endpoints,
    credentials: Credentials,
    category: AccountCategory,
}

impl SpacePortal {
    pub fn new(
        endpoints: Endpoints,
        credentials: Credentials,
        category: AccountCategory,
    ) -> Result<Self, PortalError> {
        Ok(Self {
            session: Session::new()?,
            endpoints,
            credentials,
            category,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn category(&self) -> AccountCategory {
        self.category
    }

    /// `<title>` of the calendar page as the current session sees it.
    pub async fn calendar_title(&self) -> Result<Option<String>, PortalError> {
        let page = login::fetch_calendar_page(&self.session, &self.endpoints).await?;
        Ok(login::page_title(&page.body))
    }
}

#[async_trait]
impl BookingPortal for SpacePortal {
    async fn login(&mut self) -> Result<bool, PortalError> {
        login::login(
            &mut self.session,
            &self.endpoints,
            &self.credentials,
            self.category,
        )
        .await
    }

    async fn prepare_calendar(&self) -> Result<(), PortalError> {
        login::fetch_calendar_page(&self.session, &self.endpoints).await?;
        Ok(())
    }

    async fn list_buildings(&self, campus: &str) -> Result<Vec<Building>, PortalError> {
        catalog::list_buildings(&self.session, &self.endpoints, campus).await
    }

    async fn list_rooms(
        &self,
        campus: &str,
        building_id: &str,
    ) -> Result<Vec<Room>, PortalError> {
        catalog::list_rooms(&self.session, &self.endpoints, campus, building_id).await
    }

    async fn fetch_events(
        &self,
        room_uid: &str,
        week_start: NaiveDate,
        week_end: NaiveDate,
    ) -> Result<Vec<RawEvent>, PortalError> {
        events::fetch_events(
            &self.session,
            &self.endpoints,
            room_uid,
            week_start,
            week_end,
        )
        .await
    }
}
