//! Crawl orchestration: walks the portal catalog, fetches events week by
//! week, deduplicates and writes JSONL.

mod crawl;
pub mod output;

use std::time::Duration;

pub use crawl::{CrawlPlan, Crawler};
pub use output::JsonlSink;

use crate::portal::PortalError;

/// Lifecycle of one crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    NotLoggedIn,
    LoggingIn,
    LoggedIn,
    Done,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("login rejected: calendar page shows no signed-in markers")]
    NotAuthenticated,
    #[error(transparent)]
    Portal(#[from] PortalError),
    #[error("failed to write output")]
    Output(#[from] std::io::Error),
}

/// Aggregate counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub campuses: usize,
    /// Buildings listed, including those whose rooms could not be fetched.
    pub buildings: usize,
    pub rooms: usize,
    /// Lines written.
    pub events: usize,
    pub duplicates: usize,
    pub malformed_events: usize,
    /// Campus, building or room/week units abandoned after a failure.
    pub skipped_units: usize,
    pub elapsed: Duration,
}
