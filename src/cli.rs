use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

/// Crawl the Yonsei space-booking portal and export bookings as JSONL.
#[derive(Parser, Debug)]
#[command(name = "spacecrawl", version, about)]
pub struct Args {
    /// Log output format
    #[arg(long, value_enum, default_value_t = TracingFormat::Pretty, global = true)]
    pub tracing: TracingFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable, one line per event
    Pretty,
    /// One JSON object per line
    Json,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Full crawl (the default)
    Crawl(CrawlArgs),
    /// Log in and report whether the session is authenticated
    Login,
    /// Log in, list buildings and rooms, and probe this week's events
    Catalog(CatalogArgs),
}

impl Default for Command {
    fn default() -> Self {
        Command::Crawl(CrawlArgs::default())
    }
}

/// Overrides for the configured crawl plan.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct CrawlArgs {
    /// Number of consecutive weeks to fetch
    #[arg(long)]
    pub weeks: Option<u32>,

    /// Any date in the first week (YYYY-MM-DD, KST)
    #[arg(long)]
    pub start_date: Option<NaiveDate>,

    /// Campus code; repeat for several
    #[arg(long = "campus")]
    pub campuses: Vec<String>,

    /// JSONL destination
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CatalogArgs {
    #[arg(long, default_value = "SC")]
    pub campus: String,

    /// How many buildings to list rooms for
    #[arg(long, default_value_t = 3)]
    pub buildings: usize,
}
