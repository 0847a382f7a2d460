//! Client for the university facility-booking portal.

pub mod api;
pub mod catalog;
pub mod errors;
pub mod events;
pub mod json;
pub mod login;
pub mod models;
pub mod session;

pub use api::{BookingPortal, SpacePortal};
pub use errors::PortalError;
pub use login::{AccountCategory, Credentials};
pub use models::{Building, NormalizedEvent, OutputRecord, RawEvent, Room};
pub use session::Endpoints;
