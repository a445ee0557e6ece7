//! Rule-based posting filters.
//!
//! Stages run in the order given. In [`FilterMode::Drop`] a failing record is
//! removed; in [`FilterMode::Mark`] it is kept with `filtered = true`. A stage
//! never clears `filtered`, so running the same stages twice changes nothing.
//!
//! Records with a blank description are exempt from the language and
//! description stages.

pub mod language;

use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate, Utc};

pub use language::{LanguageDetector, WhatlangDetector};

use crate::models::{Posting, Preferences};

/// A single filter rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterStage {
    Title,
    Company,
    MaxAge,
    Languages,
    Description,
}

impl FilterStage {
    /// Stages that only need listing-card fields.
    pub const CHEAP: [FilterStage; 3] = [FilterStage::Title, FilterStage::Company, FilterStage::MaxAge];
    /// Stages that need the fetched description.
    pub const EXPENSIVE: [FilterStage; 2] = [FilterStage::Languages, FilterStage::Description];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterStage::Title => "title",
            FilterStage::Company => "company",
            FilterStage::MaxAge => "max_age",
            FilterStage::Languages => "languages",
            FilterStage::Description => "description",
        }
    }
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "title" => Ok(FilterStage::Title),
            "company" => Ok(FilterStage::Company),
            "max_age" => Ok(FilterStage::MaxAge),
            "languages" | "language" => Ok(FilterStage::Languages),
            "description" => Ok(FilterStage::Description),
            other => Err(format!("unknown filter stage: {}", other)),
        }
    }
}

/// What happens to a record that fails a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Drop,
    Mark,
}

/// Inputs that vary between runs: the current date and the language detector.
pub struct FilterContext<'a> {
    pub today: NaiveDate,
    pub detector: &'a dyn LanguageDetector,
}

/// Preference word lists, lowercased once per call.
struct Rules<'p> {
    prefs: &'p Preferences,
    title_include: Vec<String>,
    title_exclude: Vec<String>,
    company_exclude: Vec<String>,
    description_words: Vec<String>,
}

fn lowered(words: &[String]) -> Vec<String> {
    words
        .iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

impl<'p> Rules<'p> {
    fn new(prefs: &'p Preferences) -> Self {
        Self {
            prefs,
            title_include: lowered(&prefs.title_include),
            title_exclude: lowered(&prefs.title_exclude),
            company_exclude: lowered(&prefs.company_exclude),
            description_words: lowered(&prefs.description_required_words),
        }
    }

    /// Returns true when the record passes the stage.
    fn passes(&self, stage: FilterStage, posting: &mut Posting, ctx: &FilterContext<'_>) -> bool {
        match stage {
            FilterStage::Title => {
                let title = posting.title.to_lowercase();
                if self.title_exclude.iter().any(|w| title.contains(w.as_str())) {
                    return false;
                }
                self.title_include.iter().any(|w| title.contains(w.as_str()))
            }
            FilterStage::Company => {
                let company = posting.company.trim().to_lowercase();
                !self.company_exclude.iter().any(|c| *c == company)
            }
            FilterStage::MaxAge => match posting.posted_date {
                Some(date) => {
                    let cutoff = ctx
                        .today
                        .checked_sub_days(Days::new(u64::from(self.prefs.max_age_days)))
                        .unwrap_or(NaiveDate::MIN);
                    date >= cutoff
                }
                None => true,
            },
            FilterStage::Languages => {
                if posting.description_is_blank() {
                    return true;
                }
                let description = posting.description.as_deref().unwrap_or_default();
                let lang = ctx.detector.detect_or_default(description);
                let allowed = self
                    .prefs
                    .allowed_languages
                    .iter()
                    .any(|l| l.trim().eq_ignore_ascii_case(&lang));
                posting.language = Some(lang);
                allowed
            }
            FilterStage::Description => {
                if posting.description_is_blank() {
                    return true;
                }
                let description = posting
                    .description
                    .as_deref()
                    .unwrap_or_default()
                    .to_lowercase();
                self.description_words
                    .iter()
                    .any(|w| description.contains(w.as_str()))
            }
        }
    }
}

/// Apply stages using today's UTC date and the default language detector.
pub fn apply_filters(
    records: Vec<Posting>,
    prefs: &Preferences,
    stages: &[FilterStage],
    mode: FilterMode,
) -> Vec<Posting> {
    let detector = WhatlangDetector;
    let ctx = FilterContext {
        today: Utc::now().date_naive(),
        detector: &detector,
    };
    apply_filters_with(records, prefs, stages, mode, &ctx)
}

/// Apply stages with an explicit date and detector.
pub fn apply_filters_with(
    records: Vec<Posting>,
    prefs: &Preferences,
    stages: &[FilterStage],
    mode: FilterMode,
    ctx: &FilterContext<'_>,
) -> Vec<Posting> {
    let rules = Rules::new(prefs);
    let mut records = records;

    for &stage in stages {
        let before = records.len();
        records = match mode {
            FilterMode::Drop => records
                .into_iter()
                .filter_map(|mut p| rules.passes(stage, &mut p, ctx).then_some(p))
                .collect(),
            FilterMode::Mark => records
                .into_iter()
                .map(|mut p| {
                    if !rules.passes(stage, &mut p, ctx) {
                        p.filtered = true;
                    }
                    p
                })
                .collect(),
        };
        tracing::debug!(
            stage = stage.as_str(),
            before,
            after = records.len(),
            "filter stage applied"
        );
    }

    records
}
