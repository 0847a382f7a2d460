pub mod app;
pub mod calendar;
pub mod cli;
pub mod config;
pub mod logging;
pub mod portal;
pub mod scraper;
pub mod utils;
