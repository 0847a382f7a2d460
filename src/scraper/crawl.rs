use std::collections::HashSet;
use std::io::Write;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tokio::time;
use tracing::{debug, info, warn};

use crate::calendar::{self, Week};
use crate::portal::{BookingPortal, Building, OutputRecord, Room};
use crate::scraper::output::JsonlSink;
use crate::scraper::{CrawlError, CrawlState, CrawlSummary};
use crate::utils::fmt_duration;

/// What to crawl.
#[derive(Debug, Clone)]
pub struct CrawlPlan {
    pub campuses: Vec<String>,
    /// Number of consecutive weeks, starting with the anchor week.
    pub weeks: u32,
    /// Any date inside the first week (KST).
    pub anchor: NaiveDate,
    /// Pause after each event fetch.
    pub delay: Duration,
}

/// Keys of events already written during this run.
#[derive(Debug, Default)]
struct SeenSet(HashSet<(String, i64, i64)>);

impl SeenSet {
    fn contains(&self, room_uid: &str, start: i64, end: i64) -> bool {
        self.0.contains(&(room_uid.to_owned(), start, end))
    }

    fn insert(&mut self, room_uid: &str, start: i64, end: i64) {
        self.0.insert((room_uid.to_owned(), start, end));
    }
}

/// Drives campus → building → room → week, writing each unique event once.
pub struct Crawler {
    plan: CrawlPlan,
    state: CrawlState,
}

impl Crawler {
    pub fn new(plan: CrawlPlan) -> Self {
        Self {
            plan,
            state: CrawlState::NotLoggedIn,
        }
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    fn transition(&mut self, next: CrawlState) {
        debug!(from = ?self.state, to = ?next, "Crawl state change");
        self.state = next;
    }

    /// Log in through `portal`. Any error, or a verifier rejection, is fatal.
    pub async fn authenticate<P: BookingPortal>(
        &mut self,
        portal: &mut P,
    ) -> Result<(), CrawlError> {
        self.transition(CrawlState::LoggingIn);
        match portal.login().await {
            Ok(true) => {
                self.transition(CrawlState::LoggedIn);
                info!("Login succeeded");
                Ok(())
            }
            Ok(false) => {
                self.transition(CrawlState::Failed);
                Err(CrawlError::NotAuthenticated)
            }
            Err(e) => {
                self.transition(CrawlState::Failed);
                Err(e.into())
            }
        }
    }

    /// Walk every campus in the plan. Catalog and event failures skip only the
    /// affected unit; output failures abort the run.
    pub async fn crawl<P: BookingPortal, W: Write>(
        &mut self,
        portal: &P,
        sink: &mut JsonlSink<W>,
    ) -> Result<CrawlSummary, CrawlError> {
        if self.state != CrawlState::LoggedIn {
            return Err(CrawlError::NotAuthenticated);
        }

        let started = Instant::now();
        match self.walk(portal, sink).await {
            Ok(mut summary) => {
                self.transition(CrawlState::Done);
                summary.elapsed = started.elapsed();
                info!(
                    campuses = summary.campuses,
                    buildings = summary.buildings,
                    rooms = summary.rooms,
                    events = summary.events,
                    duplicates = summary.duplicates,
                    skipped_units = summary.skipped_units,
                    duration = fmt_duration(summary.elapsed),
                    "Crawl finished"
                );
                Ok(summary)
            }
            Err(e) => {
                self.transition(CrawlState::Failed);
                Err(e)
            }
        }
    }

    async fn walk<P: BookingPortal, W: Write>(
        &self,
        portal: &P,
        sink: &mut JsonlSink<W>,
    ) -> Result<CrawlSummary, CrawlError> {
        if let Err(e) = portal.prepare_calendar().await {
            warn!(error = ?e, "Calendar page visit failed, continuing");
        }

        let weeks = Week::sequence(self.plan.anchor, self.plan.weeks);
        if let Some(first) = weeks.first() {
            info!(from = %first.start, weeks = weeks.len(), "Crawl window");
        }

        let mut seen = SeenSet::default();
        let mut summary = CrawlSummary {
            campuses: self.plan.campuses.len(),
            ..Default::default()
        };

        for campus in &self.plan.campuses {
            let buildings = match portal.list_buildings(campus).await {
                Ok(buildings) => buildings,
                Err(e) => {
                    warn!(
                        campus = %campus,
                        error = ?e,
                        "Failed to list buildings, skipping campus"
                    );
                    summary.skipped_units += 1;
                    continue;
                }
            };
            info!(campus = %campus, count = buildings.len(), "Buildings listed");
            summary.buildings += buildings.len();

            for (i, building) in buildings.iter().enumerate() {
                info!(
                    campus = %campus,
                    building = %building.name,
                    progress = format!("{}/{}", i + 1, buildings.len()),
                    "Crawling building"
                );
                let rooms = match portal.list_rooms(campus, &building.id).await {
                    Ok(rooms) => rooms,
                    Err(e) => {
                        warn!(
                            campus = %campus,
                            building_id = %building.id,
                            error = ?e,
                            "Failed to list rooms, skipping building"
                        );
                        summary.skipped_units += 1;
                        continue;
                    }
                };
                summary.rooms += rooms.len();

                for room in &rooms {
                    self.crawl_room(
                        portal,
                        campus,
                        building,
                        room,
                        &weeks,
                        &mut seen,
                        sink,
                        &mut summary,
                    )
                    .await?;
                }
            }
        }

        sink.flush()?;
        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    async fn crawl_room<P: BookingPortal, W: Write>(
        &self,
        portal: &P,
        campus: &str,
        building: &Building,
        room: &Room,
        weeks: &[Week],
        seen: &mut SeenSet,
        sink: &mut JsonlSink<W>,
        summary: &mut CrawlSummary,
    ) -> Result<(), CrawlError> {
        debug!(room_uid = %room.uid, room = %room.name, "Crawling room");

        for week in weeks {
            let fetched = portal.fetch_events(&room.uid, week.start, week.end).await;
            if !self.plan.delay.is_zero() {
                time::sleep(self.plan.delay).await;
            }

            let events = match fetched {
                Ok(events) => events,
                Err(e) => {
                    warn!(
                        room_uid = %room.uid,
                        week = %week.start,
                        error = ?e,
                        "Failed to fetch events, skipping week"
                    );
                    summary.skipped_units += 1;
                    continue;
                }
            };

            for ev in &events {
                let (start, end) = match ev.bounds() {
                    Ok(bounds) => bounds,
                    Err(e) => {
                        warn!(
                            room_uid = %room.uid,
                            error = ?e,
                            "Skipping event with unusable epochs"
                        );
                        summary.malformed_events += 1;
                        continue;
                    }
                };
                if seen.contains(&room.uid, start, end) {
                    summary.duplicates += 1;
                    continue;
                }

                let normalized = match calendar::normalize(ev) {
                    Ok(normalized) => normalized,
                    Err(e) => {
                        warn!(
                            room_uid = %room.uid,
                            error = ?e,
                            "Skipping event that failed to normalize"
                        );
                        summary.malformed_events += 1;
                        continue;
                    }
                };

                sink.write(&OutputRecord::new(campus, building, room, normalized))?;
                seen.insert(&room.uid, start, end);
                summary.events += 1;
            }
        }

        Ok(())
    }
}
