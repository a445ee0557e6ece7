//! Search and detail URL construction.

use crate::config::EngineSettings;
use crate::models::Preferences;

/// Cards returned per search page; the `start` offset steps by this much.
pub const PAGE_SIZE: u32 = 25;

/// Builds the ordered list of search-page URLs for a run.
#[derive(Debug, Clone)]
pub struct UrlGenerator {
    search_url: String,
    time_posted_range: String,
    rounds: u32,
    pages_to_scrape: u32,
}

impl UrlGenerator {
    pub fn new(search_url: impl Into<String>, rounds: u32, pages_to_scrape: u32) -> Self {
        Self {
            search_url: search_url.into(),
            time_posted_range: String::new(),
            rounds,
            pages_to_scrape,
        }
    }

    pub fn with_time_posted_range(mut self, range: impl Into<String>) -> Self {
        self.time_posted_range = range.into();
        self
    }

    pub fn from_settings(engine: &EngineSettings) -> Self {
        Self::new(&engine.search_url, engine.rounds, engine.pages_to_scrape)
            .with_time_posted_range(&engine.time_posted_range)
    }

    /// One URL per (round, query, page), rounds outermost and pages innermost.
    pub fn generate(&self, prefs: &Preferences) -> Vec<String> {
        let mut urls = Vec::with_capacity(
            (self.rounds * self.pages_to_scrape) as usize * prefs.search_queries.len(),
        );
        for _round in 0..self.rounds {
            for query in &prefs.search_queries {
                for page in 0..self.pages_to_scrape {
                    urls.push(format!(
                        "{}?keywords={}&location={}&f_WT={}&f_TPR={}&start={}",
                        self.search_url,
                        urlencoding::encode(&query.keywords),
                        urlencoding::encode(&query.location),
                        query.work_mode.code(),
                        urlencoding::encode(&self.time_posted_range),
                        page * PAGE_SIZE,
                    ));
                }
            }
        }
        urls
    }
}

/// Substitute a posting id into a detail URL template.
pub fn detail_url(template: &str, id: &str) -> String {
    template.replace("{id}", id)
}
