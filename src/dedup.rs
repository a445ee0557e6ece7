//! Deduplication: within a scraped batch, and against the store.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{IdentityKey, Posting, StoredPosting};
use crate::store::{Criteria, JobStore, StoreError, StoreQuery};

/// Candidates fetched per store round trip.
const DEDUP_PAGE_SIZE: usize = 500;

/// Which key decides that a posting is already stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupKey {
    /// Same title, company and posting date.
    #[default]
    Identity,
    /// Same detail URL.
    Url,
}

/// Keep the first record for each `(title, company)`, then the first for each detail URL.
pub fn dedup_batch(batch: Vec<Posting>) -> Vec<Posting> {
    let mut seen_pairs = HashSet::new();
    let mut seen_urls = HashSet::new();
    batch
        .into_iter()
        .filter(|p| seen_pairs.insert((p.title.clone(), p.company.clone())))
        .filter(|p| seen_urls.insert(p.detail_url.clone()))
        .collect()
}

/// Removes postings that a previous run already stored.
pub struct StoreDeduplicator<'a> {
    store: &'a dyn JobStore,
    index: &'a str,
    key: DedupKey,
}

impl<'a> StoreDeduplicator<'a> {
    pub fn new(store: &'a dyn JobStore, index: &'a str, key: DedupKey) -> Self {
        Self { store, index, key }
    }

    /// Every stored posting the criteria select, paging until the reported total.
    async fn candidates(&self, criteria: Criteria) -> Result<Vec<StoredPosting>, StoreError> {
        let mut query = StoreQuery::new(criteria).page(0, DEDUP_PAGE_SIZE);
        let mut hits = Vec::new();
        loop {
            let page = self.store.search(self.index, &query).await?;
            let fetched = page.hits.len();
            hits.extend(page.hits);
            if fetched < DEDUP_PAGE_SIZE || hits.len() as u64 >= page.total {
                return Ok(hits);
            }
            query = query.page(hits.len(), DEDUP_PAGE_SIZE);
        }
    }

    /// Drop every record whose key is already stored.
    ///
    /// One query covers the whole batch; it only takes more than one round
    /// trip when the matches span several pages. If the store cannot be
    /// queried the batch is returned unchanged.
    pub async fn remove_existing(&self, batch: Vec<Posting>) -> Vec<Posting> {
        if batch.is_empty() {
            return batch;
        }

        let criteria = match self.key {
            DedupKey::Identity => Criteria::Identities(batch.iter().map(Posting::identity).collect()),
            DedupKey::Url => Criteria::Urls(batch.iter().map(|p| p.detail_url.clone()).collect()),
        };

        let stored = match self.candidates(criteria).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(index = self.index, "store dedup skipped: {}", e);
                return batch;
            }
        };

        let before = batch.len();
        let kept: Vec<Posting> = match self.key {
            DedupKey::Identity => {
                let existing: HashSet<IdentityKey> = stored
                    .iter()
                    .map(|h| h.document.posting.identity())
                    .collect();
                batch
                    .into_iter()
                    .filter(|p| !existing.contains(&p.identity()))
                    .collect()
            }
            DedupKey::Url => {
                let existing: HashSet<&str> = stored
                    .iter()
                    .map(|h| h.document.posting.detail_url.as_str())
                    .collect();
                batch
                    .into_iter()
                    .filter(|p| !existing.contains(p.detail_url.as_str()))
                    .collect()
            }
        };

        debug!(
            index = self.index,
            before,
            after = kept.len(),
            "store dedup applied"
        );
        kept
    }
}
