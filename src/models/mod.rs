//! Domain models shared by the scraper, filter engine, stores and dashboard.

mod posting;
mod preferences;

pub(crate) use posting::parse_date_prefix;
pub use posting::{IdentityKey, Posting, PostingDocument, StatusField, StatusFlags, StoredPosting};
pub use preferences::{Preferences, SearchQuery, WorkMode};
