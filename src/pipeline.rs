//! End-to-end harvest run.
//!
//! Stages, in order:
//! 1. setup: ping the store and make sure the index exists
//! 2. fetch listing pages and parse cards
//! 3. batch dedup by (title, company), then by detail URL
//! 4. cheap filters (title, company, max age) in drop mode
//! 5. store dedup
//! 6. fetch detail pages for descriptions
//! 7. expensive filters (language, description) in mark mode
//! 8. annotate with default status flags
//! 9. bulk persist
//!
//! An empty batch after stage 3, 4 or 5 ends the run early with a
//! [`Checkpoint`] saying where it stopped. Fetch failures never abort a run;
//! a failed persist does.

use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dedup::{dedup_batch, DedupKey, StoreDeduplicator};
use crate::extract::Extractor;
use crate::filters::{
    apply_filters_with, FilterContext, FilterMode, FilterStage, LanguageDetector, WhatlangDetector,
};
use crate::models::{Posting, PostingDocument, Preferences};
use crate::scrapers::{FetchOutcome, PageFetcher, UrlGenerator};
use crate::store::{BulkFailure, JobStore, StoreError};

/// Pipeline stage, used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Setup,
    FetchListings,
    BatchDedup,
    CheapFilter,
    StoreDedup,
    FetchDescriptions,
    ExpensiveFilter,
    Annotate,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Setup => "setup",
            Stage::FetchListings => "fetch_listings",
            Stage::BatchDedup => "batch_dedup",
            Stage::CheapFilter => "cheap_filter",
            Stage::StoreDedup => "store_dedup",
            Stage::FetchDescriptions => "fetch_descriptions",
            Stage::ExpensiveFilter => "expensive_filter",
            Stage::Annotate => "annotate",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// Where a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    /// No cards were found on any listing page.
    NoPostings,
    /// Everything failed the cheap filters.
    AllFiltered,
    /// Everything was already stored.
    NothingNew,
    /// New postings were persisted.
    Persisted,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Checkpoint::NoPostings => "no postings found",
            Checkpoint::AllFiltered => "all postings filtered",
            Checkpoint::NothingNew => "no new postings",
            Checkpoint::Persisted => "persisted",
        };
        f.write_str(text)
    }
}

/// Fatal run errors. Every variant knows its stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} stage failed: {source}")]
    Store {
        stage: Stage,
        #[source]
        source: StoreError,
    },

    #[error("persist stage failed: {} of {attempted} postings rejected (first: {})",
        .failures.len(), first_reason(.failures))]
    Persist {
        attempted: usize,
        failures: Vec<BulkFailure>,
    },

    #[error("run cancelled during {stage} stage")]
    Cancelled { stage: Stage },
}

fn first_reason(failures: &[BulkFailure]) -> &str {
    failures.first().map(|f| f.reason.as_str()).unwrap_or("unknown")
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Store { stage, .. } => *stage,
            PipelineError::Persist { .. } => Stage::Persist,
            PipelineError::Cancelled { stage } => *stage,
        }
    }
}

/// Counts for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Cards parsed from listing pages.
    pub discovered: usize,
    /// After batch dedup.
    pub unique: usize,
    pub cheap_survivors: usize,
    /// Not yet in the store.
    pub new_postings: usize,
    /// New postings with a non-empty description.
    pub described: usize,
    pub marked_filtered: usize,
    pub persisted: usize,
    pub completed_at: Checkpoint,
}

impl RunReport {
    fn new() -> Self {
        Self {
            discovered: 0,
            unique: 0,
            cheap_survivors: 0,
            new_postings: 0,
            described: 0,
            marked_filtered: 0,
            persisted: 0,
            completed_at: Checkpoint::NoPostings,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run finished: {}", self.completed_at)?;
        writeln!(f, "  discovered:       {}", self.discovered)?;
        writeln!(f, "  unique:           {}", self.unique)?;
        writeln!(f, "  passed filters:   {}", self.cheap_survivors)?;
        writeln!(f, "  new:              {}", self.new_postings)?;
        writeln!(f, "  with description: {}", self.described)?;
        writeln!(f, "  marked filtered:  {}", self.marked_filtered)?;
        write!(f, "  persisted:        {}", self.persisted)
    }
}

/// Runs the harvest pipeline against injected fetcher and store.
pub struct Harvester {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn JobStore>,
    extractor: Extractor,
    urls: UrlGenerator,
    index: String,
    dedup_key: DedupKey,
    concurrency: usize,
    cancel: CancellationToken,
    today: Option<NaiveDate>,
    detector: Arc<dyn LanguageDetector>,
}

impl Harvester {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn JobStore>,
        extractor: Extractor,
        urls: UrlGenerator,
        index: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            store,
            extractor,
            urls,
            index: index.into(),
            dedup_key: DedupKey::default(),
            concurrency: 1,
            cancel: CancellationToken::new(),
            today: None,
            detector: Arc::new(WhatlangDetector),
        }
    }

    pub fn with_dedup_key(mut self, key: DedupKey) -> Self {
        self.dedup_key = key;
        self
    }

    /// Maximum concurrent fetches (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Pin the date used by the age filter.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn with_language_detector(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn checkpoint(&self, stage: Stage) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            warn!(%stage, "run cancelled");
            return Err(PipelineError::Cancelled { stage });
        }
        Ok(())
    }

    /// Fetch URLs with bounded concurrency; outcomes come back in input order.
    async fn fetch_all(
        &self,
        urls: Vec<String>,
        stage: Stage,
    ) -> Result<Vec<FetchOutcome>, PipelineError> {
        let mut outcomes: Vec<Option<FetchOutcome>> = vec![None; urls.len()];

        let mut results = stream::iter(urls.into_iter().enumerate())
            .map(|(position, url)| {
                let fetcher = Arc::clone(&self.fetcher);
                let cancel = self.cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return (position, None);
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => (position, None),
                        outcome = fetcher.fetch(&url) => (position, Some(outcome)),
                    }
                }
            })
            .buffer_unordered(self.concurrency);

        while let Some((position, outcome)) = results.next().await {
            match outcome {
                Some(outcome) => outcomes[position] = Some(outcome),
                None => return Err(PipelineError::Cancelled { stage }),
            }
        }

        Ok(outcomes
            .into_iter()
            .map(|o| o.unwrap_or(FetchOutcome::Failed))
            .collect())
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Execute one full run.
    pub async fn run(&self, prefs: &Preferences) -> Result<RunReport, PipelineError> {
        let mut report = RunReport::new();
        let today = self.today();
        let ctx = FilterContext {
            today,
            detector: self.detector.as_ref(),
        };

        // 1. setup
        self.checkpoint(Stage::Setup)?;
        self.store.ping().await.map_err(|source| PipelineError::Store {
            stage: Stage::Setup,
            source,
        })?;
        if self
            .store
            .create_index(&self.index)
            .await
            .map_err(|source| PipelineError::Store {
                stage: Stage::Setup,
                source,
            })?
        {
            info!(index = %self.index, backend = self.store.backend_name(), "created index");
        }

        // 2. listings
        self.checkpoint(Stage::FetchListings)?;
        let urls = self.urls.generate(prefs);
        info!(pages = urls.len(), "fetching listing pages");
        let listing_urls = urls.clone();
        let pages = self.fetch_all(urls, Stage::FetchListings).await?;
        let mut postings = Vec::new();
        for (url, outcome) in listing_urls.iter().zip(pages) {
            match outcome {
                FetchOutcome::Page(page) => {
                    let cards = self.extractor.cards(&page);
                    if cards.is_empty() {
                        warn!(url = %url, "listing page had no cards");
                    }
                    postings.extend(cards);
                }
                FetchOutcome::Failed => debug!(url = %url, "listing page skipped"),
            }
        }
        report.discovered = postings.len();

        // 3. batch dedup
        self.checkpoint(Stage::BatchDedup)?;
        let postings = dedup_batch(postings);
        report.unique = postings.len();
        if postings.is_empty() {
            info!("no postings found");
            return Ok(self.finish(report, Checkpoint::NoPostings));
        }

        // 4. cheap filters
        self.checkpoint(Stage::CheapFilter)?;
        let postings =
            apply_filters_with(postings, prefs, &FilterStage::CHEAP, FilterMode::Drop, &ctx);
        report.cheap_survivors = postings.len();
        if postings.is_empty() {
            info!("all postings filtered");
            return Ok(self.finish(report, Checkpoint::AllFiltered));
        }

        // 5. store dedup
        self.checkpoint(Stage::StoreDedup)?;
        let postings = StoreDeduplicator::new(self.store.as_ref(), &self.index, self.dedup_key)
            .remove_existing(postings)
            .await;
        report.new_postings = postings.len();
        if postings.is_empty() {
            info!("no new postings");
            return Ok(self.finish(report, Checkpoint::NothingNew));
        }

        // 6. descriptions
        self.checkpoint(Stage::FetchDescriptions)?;
        let detail_urls: Vec<String> = postings.iter().map(|p| p.detail_url.clone()).collect();
        let details = self.fetch_all(detail_urls, Stage::FetchDescriptions).await?;
        let postings: Vec<Posting> = postings
            .into_iter()
            .zip(details)
            .map(|(mut posting, outcome)| {
                posting.description = outcome
                    .into_page()
                    .and_then(|page| self.extractor.description(&page));
                posting
            })
            .collect();
        report.described = postings.iter().filter(|p| !p.description_is_blank()).count();

        // 7. expensive filters
        self.checkpoint(Stage::ExpensiveFilter)?;
        let postings =
            apply_filters_with(postings, prefs, &FilterStage::EXPENSIVE, FilterMode::Mark, &ctx);
        report.marked_filtered = postings.iter().filter(|p| p.filtered).count();

        // 8. annotate
        self.checkpoint(Stage::Annotate)?;
        let documents: Vec<PostingDocument> =
            postings.into_iter().map(PostingDocument::annotate).collect();

        // 9. persist
        self.checkpoint(Stage::Persist)?;
        let bulk = self
            .store
            .insert_bulk(&self.index, &documents)
            .await
            .map_err(|source| {
                error!("bulk insert failed: {}", source);
                PipelineError::Store {
                    stage: Stage::Persist,
                    source,
                }
            })?;
        if !bulk.is_complete() {
            error!(
                failed = bulk.failures.len(),
                attempted = documents.len(),
                "bulk insert rejected postings"
            );
            return Err(PipelineError::Persist {
                attempted: documents.len(),
                failures: bulk.failures,
            });
        }
        report.persisted = bulk.inserted;

        Ok(self.finish(report, Checkpoint::Persisted))
    }

    fn finish(&self, mut report: RunReport, checkpoint: Checkpoint) -> RunReport {
        report.completed_at = checkpoint;
        info!(
            discovered = report.discovered,
            unique = report.unique,
            cheap_survivors = report.cheap_survivors,
            new_postings = report.new_postings,
            described = report.described,
            marked_filtered = report.marked_filtered,
            persisted = report.persisted,
            checkpoint = %checkpoint,
            "run complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SearchQuery, WorkMode};
    use crate::scrapers::Page;
    use crate::store::{Criteria, MemoryStore, StoreQuery};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TEMPLATE: &str = "https://jobs.test/view/{id}/";

    fn card(id: u32, title: &str, company: &str, date: &str) -> String {
        format!(
            r#"<li><div data-entity-urn="urn:li:jobPosting:{id}">
                 <div class="base-search-card__info">
                   <h3>{title}</h3>
                   <a class="hidden-nested-link">{company}</a>
                   <span class="job-search-card__location">Paris</span>
                   <time class="job-search-card__listdate" datetime="{date}"></time>
                 </div></div></li>"#
        )
    }

    fn detail(text: &str) -> String {
        format!(
            r#"<div class="description__text description__text--rich"><p>{}</p></div>"#,
            text
        )
    }

    /// Serves canned bodies keyed by URL substring.
    #[derive(Default)]
    struct CannedFetcher {
        routes: HashMap<String, String>,
        calls: AtomicUsize,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl CannedFetcher {
        fn route(mut self, needle: &str, body: String) -> Self {
            self.routes.insert(needle.to_string(), body);
            self
        }
    }

    #[async_trait]
    impl PageFetcher for CannedFetcher {
        async fn fetch(&self, url: &str) -> FetchOutcome {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((limit, ref token)) = self.cancel_after {
                if n >= limit {
                    token.cancel();
                }
            }
            self.routes
                .iter()
                .find(|(needle, _)| url.contains(needle.as_str()))
                .map(|(_, body)| {
                    FetchOutcome::Page(Page {
                        url: url.to_string(),
                        body: body.clone(),
                    })
                })
                .unwrap_or(FetchOutcome::Failed)
        }
    }

    struct FixedDetector;

    impl LanguageDetector for FixedDetector {
        fn detect(&self, text: &str) -> Option<String> {
            Some(if text.contains("Bonjour") { "fr" } else { "en" }.to_string())
        }
    }

    fn prefs() -> Preferences {
        Preferences {
            search_queries: vec![SearchQuery {
                keywords: "rust".into(),
                location: "Paris".into(),
                work_mode: WorkMode::Any,
            }],
            title_include: vec!["rust".into()],
            title_exclude: vec!["senior".into()],
            company_exclude: vec!["BadCo".into()],
            max_age_days: 7,
            allowed_languages: vec!["en".into()],
            description_required_words: vec!["tokio".into()],
        }
    }

    fn listing() -> String {
        [
            card(1, "Rust Engineer", "Acme", "2024-01-09"),
            card(1, "Rust Engineer", "Acme", "2024-01-09"),
            card(2, "Senior Rust Engineer", "Acme", "2024-01-09"),
            card(3, "Rust Developer", "BadCo", "2024-01-09"),
            card(4, "Rust Backend", "Initech", "2024-01-08"),
            card(5, "Rust Platform", "Globex", "2023-06-01"),
            card(6, "Rust SRE", "Hooli", "2024-01-10"),
        ]
        .concat()
    }

    fn harvester(fetcher: CannedFetcher, store: Arc<MemoryStore>) -> Harvester {
        Harvester::new(
            Arc::new(fetcher),
            store,
            Extractor::new(TEMPLATE),
            UrlGenerator::new("https://jobs.test/search", 1, 1),
            "jobs",
        )
        .with_today(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap())
        .with_language_detector(Arc::new(FixedDetector))
    }

    fn full_fetcher() -> CannedFetcher {
        CannedFetcher::default()
            .route("/search", listing())
            .route("/view/1/", detail("Async services with Tokio"))
            .route("/view/4/", detail("Bonjour, Tokio et Rust"))
        // /view/6/ has no route: description fetch fails
    }

    #[tokio::test]
    async fn test_full_run() {
        let store = Arc::new(MemoryStore::new());
        let report = harvester(full_fetcher(), store.clone())
            .run(&prefs())
            .await
            .unwrap();

        assert_eq!(report.discovered, 6 + 1);
        assert_eq!(report.unique, 6);
        assert_eq!(report.cheap_survivors, 3);
        assert_eq!(report.new_postings, 3);
        assert_eq!(report.described, 2);
        assert_eq!(report.marked_filtered, 1);
        assert_eq!(report.persisted, 3);
        assert_eq!(report.completed_at, Checkpoint::Persisted);

        let stored = store
            .search("jobs", &StoreQuery::new(Criteria::All))
            .await
            .unwrap();
        let by_title: HashMap<_, _> = stored
            .hits
            .iter()
            .map(|h| (h.document.posting.title.clone(), h.document.clone()))
            .collect();
        assert!(!by_title["Rust Engineer"].posting.filtered);
        assert!(by_title["Rust Backend"].posting.filtered);
        assert_eq!(by_title["Rust Backend"].posting.language.as_deref(), Some("fr"));
        assert!(by_title["Rust SRE"].posting.description.is_none());
        assert!(!by_title["Rust SRE"].posting.filtered);
        assert!(by_title.values().all(|d| !d.status.interest && !d.status.hidden));
    }

    #[tokio::test]
    async fn test_second_run_finds_nothing_new() {
        let store = Arc::new(MemoryStore::new());
        harvester(full_fetcher(), store.clone())
            .run(&prefs())
            .await
            .unwrap();
        let report = harvester(full_fetcher(), store.clone())
            .run(&prefs())
            .await
            .unwrap();
        assert_eq!(report.completed_at, Checkpoint::NothingNew);
        assert_eq!(report.persisted, 0);
        assert_eq!(store.len("jobs").await, 3);
    }

    #[tokio::test]
    async fn test_empty_listing_stops_early() {
        let store = Arc::new(MemoryStore::new());
        let report = harvester(CannedFetcher::default(), store.clone())
            .run(&prefs())
            .await
            .unwrap();
        assert_eq!(report.completed_at, Checkpoint::NoPostings);
        assert_eq!(store.len("jobs").await, 0);
    }

    #[tokio::test]
    async fn test_all_filtered_stops_early() {
        let fetcher = CannedFetcher::default().route(
            "/search",
            card(9, "Senior Rust Lead", "Acme", "2024-01-09"),
        );
        let report = harvester(fetcher, Arc::new(MemoryStore::new()))
            .run(&prefs())
            .await
            .unwrap();
        assert_eq!(report.completed_at, Checkpoint::AllFiltered);
        assert_eq!(report.unique, 1);
    }

    #[tokio::test]
    async fn test_concurrent_run_matches_sequential() {
        let sequential = harvester(full_fetcher(), Arc::new(MemoryStore::new()))
            .run(&prefs())
            .await
            .unwrap();
        let concurrent = harvester(full_fetcher(), Arc::new(MemoryStore::new()))
            .with_concurrency(4)
            .run(&prefs())
            .await
            .unwrap();
        assert_eq!(sequential, concurrent);
    }

    #[tokio::test]
    async fn test_cancelled_run_persists_nothing() {
        let token = CancellationToken::new();
        let mut fetcher = full_fetcher();
        fetcher.cancel_after = Some((2, token.clone()));
        let store = Arc::new(MemoryStore::new());

        let err = harvester(fetcher, store.clone())
            .with_cancellation(token)
            .run(&prefs())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { .. }));
        assert_eq!(err.stage(), Stage::FetchDescriptions);
        assert_eq!(store.len("jobs").await, 0);
    }

    #[test]
    fn test_persist_error_names_stage() {
        let err = PipelineError::Persist {
            attempted: 3,
            failures: vec![BulkFailure {
                position: 1,
                reason: "mapper_parsing_exception".into(),
            }],
        };
        assert_eq!(err.stage(), Stage::Persist);
        assert!(err.to_string().contains("1 of 3"));
    }
}
