//! Service layer shared by the CLI and the dashboard server.

pub mod export;
pub mod listings;
pub mod matching;
pub mod proxy_check;

pub use export::{export_to_file, write_csv, ExportError};
pub use listings::{CvFile, JobStats, ListingPage, ListingRequest};
pub use matching::match_percentage;
pub use proxy_check::{check_proxies, ProxyCheckError, ProxyReport, DEFAULT_IP_ECHO_URL};
