//! jobharvest: scrape job postings from a listings site, filter them against
//! user preferences, deduplicate, and persist them to a store.
//!
//! The pipeline lives in [`pipeline`]; the dashboard API in [`server`].

pub mod config;
pub mod dedup;
pub mod extract;
pub mod filters;
pub mod models;
pub mod pipeline;
pub mod schema;
pub mod scrapers;
pub mod server;
pub mod services;
pub mod store;

pub use config::{load_settings, ConfigError, Settings};
pub use pipeline::{Checkpoint, Harvester, PipelineError, RunReport, Stage};
