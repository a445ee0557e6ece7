//! In-process store for dry runs and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    listing_order, BulkReport, CompanyCount, Criteria, JobStore, SearchResults, StoreError,
    StoreQuery,
};
use crate::models::{PostingDocument, StatusField, StoredPosting};

type Index = BTreeMap<String, PostingDocument>;

/// Store keeping every index in a map behind an async lock.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    indices: Arc<RwLock<HashMap<String, Index>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in an index (0 if missing).
    pub async fn len(&self, index: &str) -> usize {
        self.indices
            .read()
            .await
            .get(index)
            .map(|i| i.len())
            .unwrap_or(0)
    }
}

fn selects(criteria: &Criteria, doc: &PostingDocument) -> bool {
    match criteria {
        Criteria::All => true,
        Criteria::Identities(keys) => keys
            .iter()
            .any(|k| *k == doc.posting.identity()),
        Criteria::Urls(urls) => urls.iter().any(|u| *u == doc.posting.detail_url),
        Criteria::Listing(filter) => filter.matches(doc),
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_index(&self, index: &str) -> Result<bool, StoreError> {
        let mut indices = self.indices.write().await;
        if indices.contains_key(index) {
            return Ok(false);
        }
        indices.insert(index.to_string(), Index::new());
        Ok(true)
    }

    async fn delete_index(&self, index: &str) -> Result<bool, StoreError> {
        Ok(self.indices.write().await.remove(index).is_some())
    }

    async fn search(&self, index: &str, query: &StoreQuery) -> Result<SearchResults, StoreError> {
        let indices = self.indices.read().await;
        let docs = indices
            .get(index)
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;

        let mut hits: Vec<StoredPosting> = docs
            .iter()
            .filter(|(_, doc)| selects(&query.criteria, doc))
            .map(|(id, doc)| StoredPosting::new(id.clone(), doc.clone()))
            .collect();
        hits.sort_by(listing_order);

        let total = hits.len() as u64;
        let hits = hits
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect();
        Ok(SearchResults { total, hits })
    }

    async fn get(&self, index: &str, id: &str) -> Result<Option<StoredPosting>, StoreError> {
        let indices = self.indices.read().await;
        let docs = indices
            .get(index)
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;
        Ok(docs
            .get(id)
            .map(|doc| StoredPosting::new(id.to_string(), doc.clone())))
    }

    async fn insert_bulk(
        &self,
        index: &str,
        docs: &[PostingDocument],
    ) -> Result<BulkReport, StoreError> {
        let mut indices = self.indices.write().await;
        let target = indices.entry(index.to_string()).or_default();
        for doc in docs {
            target.insert(uuid::Uuid::new_v4().to_string(), doc.clone());
        }
        Ok(BulkReport {
            inserted: docs.len(),
            failures: Vec::new(),
        })
    }

    async fn update_status(
        &self,
        index: &str,
        id: &str,
        field: StatusField,
        value: bool,
    ) -> Result<(), StoreError> {
        let mut indices = self.indices.write().await;
        let doc = indices
            .get_mut(index)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        doc.set_flag(field, value);
        Ok(())
    }

    async fn delete(&self, index: &str, id: &str) -> Result<(), StoreError> {
        let mut indices = self.indices.write().await;
        indices
            .get_mut(index)
            .and_then(|docs| docs.remove(id))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn companies(&self, index: &str, limit: usize) -> Result<Vec<CompanyCount>, StoreError> {
        let indices = self.indices.read().await;
        let docs = indices
            .get(index)
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;

        let mut counts: HashMap<&str, u64> = HashMap::new();
        for doc in docs.values() {
            *counts.entry(doc.posting.company.as_str()).or_default() += 1;
        }
        let mut companies: Vec<CompanyCount> = counts
            .into_iter()
            .filter(|(name, _)| !name.is_empty())
            .map(|(company, count)| CompanyCount {
                company: company.to_string(),
                count,
            })
            .collect();
        companies.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.company.cmp(&b.company)));
        companies.truncate(limit);
        Ok(companies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IdentityKey, Posting};
    use crate::store::ListingFilter;
    use std::collections::HashSet;

    async fn stored_urls(store: &MemoryStore, index: &str) -> HashSet<String> {
        store
            .indices
            .read()
            .await
            .get(index)
            .map(|docs| docs.values().map(|d| d.posting.detail_url.clone()).collect())
            .unwrap_or_default()
    }

    fn doc(title: &str, company: &str) -> PostingDocument {
        PostingDocument::annotate(Posting::new(
            title,
            company,
            "",
            None,
            format!("https://x/{}", title),
        ))
    }

    #[tokio::test]
    async fn test_create_index_idempotent() {
        let store = MemoryStore::new();
        assert!(store.create_index("jobs").await.unwrap());
        assert!(!store.create_index("jobs").await.unwrap());
        assert!(store.delete_index("jobs").await.unwrap());
        assert!(!store.delete_index("jobs").await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_search_update_delete() {
        let store = MemoryStore::new();
        store.create_index("jobs").await.unwrap();
        let report = store
            .insert_bulk("jobs", &[doc("a", "Acme"), doc("b", "Initech"), doc("c", "Acme")])
            .await
            .unwrap();
        assert_eq!(report.inserted, 3);
        assert!(report.is_complete());

        let all = store
            .search("jobs", &StoreQuery::new(Criteria::All))
            .await
            .unwrap();
        assert_eq!(all.total, 3);

        let by_identity = store
            .search(
                "jobs",
                &StoreQuery::new(Criteria::Identities(vec![IdentityKey {
                    title: "a".into(),
                    company: "Acme".into(),
                    posted_date: None,
                }])),
            )
            .await
            .unwrap();
        assert_eq!(by_identity.total, 1);
        let id = by_identity.hits[0].id.clone();

        store
            .update_status("jobs", &id, StatusField::Interest, true)
            .await
            .unwrap();
        let interested = store
            .search(
                "jobs",
                &StoreQuery::new(Criteria::Listing(ListingFilter {
                    statuses: vec![(StatusField::Interest, true)],
                    ..Default::default()
                })),
            )
            .await
            .unwrap();
        assert_eq!(interested.hits.len(), 1);
        assert_eq!(interested.hits[0].id, id);

        store.delete("jobs", &id).await.unwrap();
        assert_eq!(store.len("jobs").await, 2);
        assert!(matches!(
            store.delete("jobs", &id).await,
            Err(StoreError::NotFound(_))
        ));

        let companies = store.companies("jobs", 10).await.unwrap();
        assert_eq!(companies[0].company, "Acme");
        assert_eq!(companies[0].count, 1);
        assert_eq!(stored_urls(&store, "jobs").await.len(), 2);
    }

    #[tokio::test]
    async fn test_search_missing_index() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.search("nope", &StoreQuery::new(Criteria::All)).await,
            Err(StoreError::IndexNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_paging() {
        let store = MemoryStore::new();
        let docs: Vec<_> = (0..5).map(|i| doc(&format!("t{}", i), "x")).collect();
        store.insert_bulk("jobs", &docs).await.unwrap();
        let page = store
            .search("jobs", &StoreQuery::new(Criteria::All).page(3, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.hits.len(), 2);
    }
}
