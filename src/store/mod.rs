//! Document store abstraction and backends.
//!
//! The pipeline and the dashboard talk to a [`JobStore`]; which backend sits
//! behind it is decided by the `store.backend` setting:
//! - `memory` - in-process, nothing survives the process
//! - `sqlite:<path>` - local SQLite database via diesel
//! - `http://...` / `https://...` - an Elasticsearch cluster

mod diesel_models;
mod diesel_pool;
pub mod elastic;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

pub use diesel_pool::{DieselError, SqlitePool};
pub use elastic::ElasticStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::config::StoreSettings;
use crate::models::{IdentityKey, PostingDocument, StatusField, StoredPosting};

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unavailable(String),

    #[error("store request failed: {0}")]
    Request(String),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] DieselError),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid store backend `{0}`")]
    InvalidBackend(String),
}

/// Which postings a query selects.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    /// Everything in the index.
    All,
    /// Postings whose (title, company, posted date) equals one of these.
    /// A backend may return extra candidates; callers compare the full
    /// identity tuple on the returned hits.
    Identities(Vec<IdentityKey>),
    /// Postings whose detail URL is one of these.
    Urls(Vec<String>),
    /// Dashboard listing filters.
    Listing(ListingFilter),
}

/// Dashboard filters. Every set field narrows the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFilter {
    /// Free text matched against title, company, description and location.
    pub search: Option<String>,
    /// Required values for status fields.
    pub statuses: Vec<(StatusField, bool)>,
    pub exclude_filtered: bool,
    /// Exact company name.
    pub company: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl ListingFilter {
    /// Evaluate the filter against a document in memory.
    pub fn matches(&self, doc: &PostingDocument) -> bool {
        let p = &doc.posting;
        if self.exclude_filtered && p.filtered {
            return false;
        }
        if self
            .statuses
            .iter()
            .any(|&(field, value)| doc.flag(field) != value)
        {
            return false;
        }
        if let Some(ref company) = self.company {
            if p.company != *company {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if !p.posted_date.is_some_and(|d| d >= from) {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if !p.posted_date.is_some_and(|d| d <= to) {
                return false;
            }
        }
        if let Some(ref search) = self.search {
            let needle = search.trim().to_lowercase();
            if !needle.is_empty() {
                let haystacks = [
                    Some(p.title.as_str()),
                    Some(p.company.as_str()),
                    p.description.as_deref(),
                    Some(p.location.as_str()),
                ];
                if !haystacks
                    .iter()
                    .flatten()
                    .any(|h| h.to_lowercase().contains(&needle))
                {
                    return false;
                }
            }
        }
        true
    }
}

/// A store query: selection plus paging. Results are ordered by date
/// descending (undated last), then detail URL.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreQuery {
    pub criteria: Criteria,
    pub offset: usize,
    pub limit: usize,
}

impl StoreQuery {
    pub fn new(criteria: Criteria) -> Self {
        Self {
            criteria,
            offset: 0,
            limit: 100,
        }
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

/// Hits for one page plus the total number of matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub total: u64,
    pub hits: Vec<StoredPosting>,
}

/// A record the store refused during a bulk insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    /// Position in the submitted batch.
    pub position: usize,
    pub reason: String,
}

/// Outcome of a bulk insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub inserted: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Distinct company with its posting count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyCount {
    pub company: String,
    pub count: u64,
}

/// Sort key shared by backends that order in memory.
pub(crate) fn listing_order(a: &StoredPosting, b: &StoredPosting) -> std::cmp::Ordering {
    let (pa, pb) = (&a.document.posting, &b.document.posting);
    // None sorts below Some, so reversing puts undated postings last
    pb.posted_date
        .cmp(&pa.posted_date)
        .then_with(|| pa.detail_url.cmp(&pb.detail_url))
}

/// Persistent home for postings.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Create the index if missing. Returns true if it was created.
    async fn create_index(&self, index: &str) -> Result<bool, StoreError>;

    /// Drop the index and its postings. Returns true if it existed.
    async fn delete_index(&self, index: &str) -> Result<bool, StoreError>;

    async fn search(&self, index: &str, query: &StoreQuery) -> Result<SearchResults, StoreError>;

    async fn get(&self, index: &str, id: &str) -> Result<Option<StoredPosting>, StoreError>;

    /// Insert documents, reporting per-record failures instead of failing the batch.
    async fn insert_bulk(
        &self,
        index: &str,
        docs: &[PostingDocument],
    ) -> Result<BulkReport, StoreError>;

    /// Set one status flag. `StoreError::NotFound` if the id is unknown.
    async fn update_status(
        &self,
        index: &str,
        id: &str,
        field: StatusField,
        value: bool,
    ) -> Result<(), StoreError>;

    /// Delete one posting. `StoreError::NotFound` if the id is unknown.
    async fn delete(&self, index: &str, id: &str) -> Result<(), StoreError>;

    /// Distinct companies, most postings first.
    async fn companies(&self, index: &str, limit: usize) -> Result<Vec<CompanyCount>, StoreError>;
}

/// Open the backend named by the settings.
pub fn open_store(settings: &StoreSettings) -> Result<Arc<dyn JobStore>, StoreError> {
    let backend = settings.backend.trim();
    if backend == "memory" {
        return Ok(Arc::new(MemoryStore::new()));
    }
    if let Some(path) = backend.strip_prefix("sqlite:") {
        let path = shellexpand::tilde(path.trim_start_matches("//"));
        return Ok(Arc::new(SqliteStore::open(std::path::Path::new(
            path.as_ref(),
        ))?));
    }
    if backend.starts_with("http://") || backend.starts_with("https://") {
        return Ok(Arc::new(ElasticStore::from_settings(settings)?));
    }
    Err(StoreError::InvalidBackend(backend.to_string()))
}
