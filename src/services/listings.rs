//! Dashboard queries over a store: stats, paginated listing, companies, CV.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use super::matching::match_percentage;
use crate::models::{StatusField, StoredPosting};
use crate::store::{Criteria, JobStore, ListingFilter, StoreError, StoreQuery};

pub const DEFAULT_PER_PAGE: usize = 20;
pub const MAX_PER_PAGE: usize = 100;
/// Hits scored when sorting by CV match; paging then happens in memory.
pub const CV_SORT_WINDOW: usize = 1000;
/// Distinct companies returned by the companies endpoint.
pub const COMPANY_LIMIT: usize = 100;

/// Per-status totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub total: u64,
    pub interested: u64,
    pub applied: u64,
    pub interview: u64,
    pub rejected: u64,
    pub hidden: u64,
    pub filtered: u64,
}

async fn count(
    store: &dyn JobStore,
    index: &str,
    criteria: Criteria,
) -> Result<u64, StoreError> {
    Ok(store
        .search(index, &StoreQuery::new(criteria).page(0, 0))
        .await?
        .total)
}

async fn count_flag(
    store: &dyn JobStore,
    index: &str,
    field: StatusField,
) -> Result<u64, StoreError> {
    let filter = ListingFilter {
        statuses: vec![(field, true)],
        ..Default::default()
    };
    count(store, index, Criteria::Listing(filter)).await
}

pub async fn stats(store: &dyn JobStore, index: &str) -> Result<JobStats, StoreError> {
    Ok(JobStats {
        total: count(store, index, Criteria::All).await?,
        interested: count_flag(store, index, StatusField::Interest).await?,
        applied: count_flag(store, index, StatusField::Applied).await?,
        interview: count_flag(store, index, StatusField::Interview).await?,
        rejected: count_flag(store, index, StatusField::Rejected).await?,
        hidden: count_flag(store, index, StatusField::Hidden).await?,
        filtered: count_flag(store, index, StatusField::Filtered).await?,
    })
}

/// One listing request. `page` is 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingRequest {
    pub filter: ListingFilter,
    pub page: usize,
    pub per_page: usize,
    pub sort_by_cv_match: bool,
}

impl Default for ListingRequest {
    fn default() -> Self {
        Self {
            filter: ListingFilter::default(),
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            sort_by_cv_match: false,
        }
    }
}

impl ListingRequest {
    /// Clamp paging to sane bounds.
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        self.per_page = self.per_page.clamp(1, MAX_PER_PAGE);
        self
    }

    fn offset(&self) -> usize {
        (self.page - 1) * self.per_page
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingPage {
    pub jobs: Vec<StoredPosting>,
    pub total: u64,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: u64,
    pub cv_available: bool,
}

/// Fetch one page of postings, each scored against `cv` when present.
pub async fn list_jobs(
    store: &dyn JobStore,
    index: &str,
    request: ListingRequest,
    cv: Option<&str>,
) -> Result<ListingPage, StoreError> {
    let request = request.normalized();
    let criteria = Criteria::Listing(request.filter.clone());

    let query = if request.sort_by_cv_match {
        StoreQuery::new(criteria).page(0, CV_SORT_WINDOW)
    } else {
        StoreQuery::new(criteria).page(request.offset(), request.per_page)
    };
    let results = store.search(index, &query).await?;

    let mut jobs = results.hits;
    for job in &mut jobs {
        let description = job.document.posting.description.as_deref().unwrap_or_default();
        job.match_score = Some(cv.map_or(0.0, |cv| match_percentage(description, cv)));
    }

    if request.sort_by_cv_match {
        jobs.sort_by(|a, b| {
            b.match_score
                .unwrap_or(0.0)
                .total_cmp(&a.match_score.unwrap_or(0.0))
        });
        jobs = jobs
            .into_iter()
            .skip(request.offset())
            .take(request.per_page)
            .collect();
    }

    let per_page = request.per_page as u64;
    Ok(ListingPage {
        jobs,
        total: results.total,
        page: request.page,
        per_page: request.per_page,
        total_pages: results.total.div_ceil(per_page),
        cv_available: cv.is_some(),
    })
}

/// Distinct company names, alphabetical.
pub async fn companies(store: &dyn JobStore, index: &str) -> Result<Vec<String>, StoreError> {
    let mut names: Vec<String> = store
        .companies(index, COMPANY_LIMIT)
        .await?
        .into_iter()
        .map(|c| c.company)
        .filter(|c| !c.trim().is_empty())
        .collect();
    names.sort();
    Ok(names)
}

/// Plain-text résumé kept on disk next to the data directory.
#[derive(Debug, Clone)]
pub struct CvFile {
    path: PathBuf,
}

impl CvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The résumé text, or `None` when missing, unreadable or blank.
    pub async fn load(&self) -> Option<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %self.path.display(), "failed to read CV: {}", e);
                None
            }
        }
    }

    pub async fn save(&self, text: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, text).await?;
        debug!(path = %self.path.display(), bytes = text.len(), "saved CV");
        Ok(())
    }

    pub async fn is_available(&self) -> bool {
        self.load().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Posting, PostingDocument};
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let docs: Vec<PostingDocument> = [
            ("Rust engineer", "Acme", 5, "rust tokio async services"),
            ("Java developer", "Initech", 4, "java spring hibernate"),
            ("Go developer", "Globex", 3, "go kubernetes services"),
        ]
        .into_iter()
        .map(|(title, company, day, desc)| {
            let mut p = Posting::new(
                title,
                company,
                "Paris",
                NaiveDate::from_ymd_opt(2024, 1, day),
                format!("https://jobs.test/{}", day),
            );
            p.description = Some(desc.into());
            PostingDocument::annotate(p)
        })
        .collect();
        store.insert_bulk("jobs", &docs).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_stats_counts_flags() {
        let store = seeded().await;
        let hits = store
            .search("jobs", &StoreQuery::new(Criteria::All))
            .await
            .unwrap()
            .hits;
        store
            .update_status("jobs", &hits[0].id, StatusField::Applied, true)
            .await
            .unwrap();
        store
            .update_status("jobs", &hits[1].id, StatusField::Filtered, true)
            .await
            .unwrap();

        let stats = stats(&store, "jobs").await.unwrap();
        assert_eq!(
            stats,
            JobStats {
                total: 3,
                applied: 1,
                filtered: 1,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn test_listing_paginates_by_date() {
        let store = seeded().await;
        let request = ListingRequest {
            page: 2,
            per_page: 2,
            ..Default::default()
        };
        let page = list_jobs(&store, "jobs", request, None).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.jobs.len(), 1);
        assert_eq!(page.jobs[0].document.posting.title, "Go developer");
        assert!(!page.cv_available);
        assert_eq!(page.jobs[0].match_score, Some(0.0));
    }

    #[tokio::test]
    async fn test_listing_sorted_by_cv_match() {
        let store = seeded().await;
        let request = ListingRequest {
            sort_by_cv_match: true,
            ..Default::default()
        };
        let page = list_jobs(&store, "jobs", request, Some("Kubernetes and Go services"))
            .await
            .unwrap();
        assert!(page.cv_available);
        assert_eq!(page.jobs[0].document.posting.title, "Go developer");
        let scores: Vec<f64> = page.jobs.iter().map(|j| j.match_score.unwrap()).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(scores[2], 0.0);
    }

    #[test]
    fn test_request_normalization() {
        let r = ListingRequest {
            page: 0,
            per_page: 500,
            ..Default::default()
        }
        .normalized();
        assert_eq!((r.page, r.per_page), (1, MAX_PER_PAGE));
    }

    #[tokio::test]
    async fn test_companies_sorted() {
        let store = seeded().await;
        assert_eq!(
            companies(&store, "jobs").await.unwrap(),
            vec!["Acme", "Globex", "Initech"]
        );
    }

    #[tokio::test]
    async fn test_cv_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cv = CvFile::new(dir.path().join("data/cv.txt"));
        assert!(!cv.is_available().await);
        cv.save("Rust, Tokio").await.unwrap();
        assert_eq!(cv.load().await.as_deref(), Some("Rust, Tokio"));
        cv.save("   ").await.unwrap();
        assert!(cv.load().await.is_none());
    }
}
