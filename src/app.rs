use crate::calendar::{self, Week};
use crate::cli::{CatalogArgs, Command, CrawlArgs};
use crate::config::Config;
use crate::portal::{BookingPortal, SpacePortal};
use crate::scraper::{CrawlPlan, Crawler, JsonlSink};
use anyhow::{Context, bail};
use std::process::ExitCode;
use tracing::{error, info, warn};

/// Rooms shown per building by the catalog probe.
const CATALOG_ROOM_PREVIEW: usize = 5;
/// Events shown for the probed room.
const CATALOG_EVENT_PREVIEW: usize = 3;

/// Main application struct: resolved configuration plus the live portal client.
pub struct App {
    config: Config,
    portal: SpacePortal,
}

impl App {
    /// Validate configuration and build the portal client. No network activity.
    pub fn new(config: Config) -> Result<Self, anyhow::Error> {
        let credentials = config
            .credentials()
            .context("Account credentials are not configured")?;
        let category = config
            .category()
            .context("Invalid account category")?;
        let endpoints = config.endpoints().context("Invalid portal URLs")?;
        let portal = SpacePortal::new(endpoints, credentials, category)
            .context("Failed to create portal client")?;

        Ok(App { config, portal })
    }

    /// Run one command to completion.
    pub async fn run(mut self, command: Command) -> ExitCode {
        let result = match command {
            Command::Crawl(args) => self.crawl(args).await,
            Command::Login => self.login_only().await,
            Command::Catalog(args) => self.catalog(args).await,
        };

        match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = ?e, "Run failed");
                ExitCode::FAILURE
            }
        }
    }

    fn plan(&self, args: &CrawlArgs) -> CrawlPlan {
        let campuses = if args.campuses.is_empty() {
            self.config.campuses.clone()
        } else {
            args.campuses.clone()
        };
        CrawlPlan {
            campuses,
            weeks: args.weeks.unwrap_or(self.config.weeks),
            anchor: args
                .start_date
                .or(self.config.start_date)
                .unwrap_or_else(calendar::today_kst),
            delay: self.config.request_delay(),
        }
    }

    async fn crawl(&mut self, args: CrawlArgs) -> Result<(), anyhow::Error> {
        let plan = self.plan(&args);
        let output_path = args
            .output
            .unwrap_or_else(|| self.config.output_path.clone());
        info!(
            campuses = ?plan.campuses,
            weeks = plan.weeks,
            anchor = %plan.anchor,
            output = %output_path.display(),
            "Starting crawl"
        );

        let mut crawler = Crawler::new(plan);
        crawler
            .authenticate(&mut self.portal)
            .await
            .context("Login failed")?;

        // The output file is only truncated once login has succeeded
        let mut sink = JsonlSink::create(&output_path)
            .with_context(|| format!("Failed to open {}", output_path.display()))?;
        let summary = crawler.crawl(&self.portal, &mut sink).await?;

        info!(
            path = %output_path.display(),
            lines = sink.written(),
            duplicates = summary.duplicates,
            "Output written"
        );
        Ok(())
    }

    async fn login_only(&mut self) -> Result<(), anyhow::Error> {
        info!(
            account = %self.portal.credentials().masked_id(),
            category = %self.portal.category(),
            "Attempting login"
        );

        if self.portal.login().await? {
            info!("Login succeeded");
            return Ok(());
        }

        match self.portal.calendar_title().await {
            Ok(title) => warn!(title = ?title, "Calendar page is not signed in"),
            Err(e) => warn!(error = ?e, "Could not re-read calendar page"),
        }
        bail!("Login rejected by portal")
    }

    async fn catalog(&mut self, args: CatalogArgs) -> Result<(), anyhow::Error> {
        if !self.portal.login().await? {
            bail!("Login rejected by portal");
        }
        if let Err(e) = self.portal.prepare_calendar().await {
            warn!(error = ?e, "Calendar page visit failed, continuing");
        }

        let buildings = self
            .portal
            .list_buildings(&args.campus)
            .await
            .context("Failed to list buildings")?;
        info!(campus = %args.campus, count = buildings.len(), "Buildings listed");

        let week = Week::containing(calendar::today_kst());
        for building in buildings.iter().take(args.buildings) {
            let rooms = match self.portal.list_rooms(&args.campus, &building.id).await {
                Ok(rooms) => rooms,
                Err(e) => {
                    warn!(building_id = %building.id, error = ?e, "Failed to list rooms");
                    continue;
                }
            };
            info!(
                building_id = %building.id,
                building = %building.name,
                rooms = rooms.len(),
                "Building"
            );
            for room in rooms.iter().take(CATALOG_ROOM_PREVIEW) {
                info!(room_uid = %room.uid, room = %room.name, "  Room");
            }
            if rooms.len() > CATALOG_ROOM_PREVIEW {
                info!(remaining = rooms.len() - CATALOG_ROOM_PREVIEW, "  ...");
            }

            if let Some(room) = rooms.first() {
                self.probe_events(&room.uid, &room.name, week).await;
            }
        }
        Ok(())
    }

    /// Log a few of this week's events for one room. Failures are only logged.
    async fn probe_events(&self, room_uid: &str, room_name: &str, week: Week) {
        let events = match self.portal.fetch_events(room_uid, week.start, week.end).await {
            Ok(events) => events,
            Err(e) => {
                warn!(room_uid, error = ?e, "Failed to fetch events");
                return;
            }
        };
        info!(room = room_name, week = %week.start, count = events.len(), "  Events this week");
        for ev in events.iter().take(CATALOG_EVENT_PREVIEW) {
            match calendar::normalize(ev) {
                Ok(n) => info!(date = %n.date, time = %n.time, title = %n.title, "    Event"),
                Err(e) => warn!(error = ?e, "    Unreadable event"),
            }
        }
    }
}
