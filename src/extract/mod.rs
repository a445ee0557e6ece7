//! HTML extraction: listing cards and posting descriptions.
//!
//! Extraction is forgiving. A card missing its title or id is skipped and
//! a page without a description container yields `None`; neither is an error.

mod cards;
mod description;

pub use cards::parse_cards;
pub use description::parse_description;

use crate::config::DEFAULT_DETAIL_URL_TEMPLATE;
use crate::models::Posting;
use crate::scrapers::Page;

/// Turns fetched pages into postings and description text.
#[derive(Debug, Clone)]
pub struct Extractor {
    detail_url_template: String,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(DEFAULT_DETAIL_URL_TEMPLATE)
    }
}

impl Extractor {
    pub fn new(detail_url_template: impl Into<String>) -> Self {
        Self {
            detail_url_template: detail_url_template.into(),
        }
    }

    /// Parse every well-formed card on a search results page.
    pub fn cards(&self, page: &Page) -> Vec<Posting> {
        parse_cards(&page.document(), &self.detail_url_template)
    }

    /// Extract the description text from a detail page.
    pub fn description(&self, page: &Page) -> Option<String> {
        parse_description(&page.document())
    }
}
