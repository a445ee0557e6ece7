//! User preferences: what to search for and what to keep.
//!
//! Preferences are loaded from a YAML document. Every key is required; a
//! missing key fails the load instead of silently scraping with defaults.

use std::fmt;
use std::path::Path;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// One search: keywords, a location and a work-mode code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub keywords: String,
    pub location: String,
    #[serde(alias = "f_WT")]
    pub work_mode: WorkMode,
}

/// Work arrangement filter sent to the search endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkMode {
    /// No constraint.
    #[default]
    Any,
    OnSite,
    Remote,
    Hybrid,
}

impl WorkMode {
    /// The code the search endpoint expects in its `f_WT` parameter.
    pub fn code(&self) -> &'static str {
        match self {
            WorkMode::Any => "",
            WorkMode::OnSite => "1",
            WorkMode::Remote => "2",
            WorkMode::Hybrid => "3",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "" | "any" => Some(WorkMode::Any),
            "1" | "on_site" | "onsite" => Some(WorkMode::OnSite),
            "2" | "remote" => Some(WorkMode::Remote),
            "3" | "hybrid" => Some(WorkMode::Hybrid),
            _ => None,
        }
    }
}

impl fmt::Display for WorkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkMode::Any => "any",
            WorkMode::OnSite => "on_site",
            WorkMode::Remote => "remote",
            WorkMode::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

impl<'de> Deserialize<'de> for WorkMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(u64),
            Name(String),
        }

        let text = match Raw::deserialize(deserializer)? {
            Raw::Code(n) => n.to_string(),
            Raw::Name(s) => s,
        };
        WorkMode::parse(&text).ok_or_else(|| {
            de::Error::custom(format!(
                "invalid work mode `{}` (expected 1/2/3 or on_site/remote/hybrid)",
                text
            ))
        })
    }
}

/// Search and filtering preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub search_queries: Vec<SearchQuery>,
    /// A title must contain at least one of these words (case-insensitive).
    pub title_include: Vec<String>,
    /// A title containing any of these words is filtered, even if it also
    /// matches an include word.
    pub title_exclude: Vec<String>,
    /// Companies to drop, matched exactly after trimming and lowercasing.
    pub company_exclude: Vec<String>,
    /// Postings older than this many days are filtered.
    #[serde(rename = "max_age", alias = "max_age_days")]
    pub max_age_days: u32,
    /// ISO 639-1 codes of acceptable description languages.
    #[serde(rename = "languages", alias = "allowed_languages")]
    pub allowed_languages: Vec<String>,
    /// A description must contain at least one of these words.
    #[serde(rename = "description_words_include", alias = "desc_words")]
    pub description_required_words: Vec<String>,
}

impl Preferences {
    /// Parse preferences from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load and validate preferences from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let prefs = Self::from_yaml_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        prefs.validate()?;
        Ok(prefs)
    }

    /// Reject preference sets that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search_queries.is_empty() {
            return Err(ConfigError::Invalid {
                field: "search_queries",
                reason: "at least one search query is required".to_string(),
            });
        }
        if let Some(q) = self.search_queries.iter().find(|q| q.keywords.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "search_queries",
                reason: format!("query for location `{}` has empty keywords", q.location),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
search_queries:
  - keywords: rust developer
    location: Paris
    f_WT: 2
  - keywords: backend
    location: Lyon
    work_mode: hybrid
title_include: [rust, backend]
title_exclude: [senior]
company_exclude: [Acme Corp]
max_age: 7
languages: [en, fr]
description_words_include: [tokio]
"#;

    #[test]
    fn test_parse_sample() {
        let prefs = Preferences::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(prefs.search_queries.len(), 2);
        assert_eq!(prefs.search_queries[0].work_mode, WorkMode::Remote);
        assert_eq!(prefs.search_queries[1].work_mode, WorkMode::Hybrid);
        assert_eq!(prefs.max_age_days, 7);
        assert_eq!(prefs.allowed_languages, vec!["en", "fr"]);
        assert_eq!(prefs.description_required_words, vec!["tokio"]);
    }

    #[test]
    fn test_string_work_mode_codes() {
        let q: SearchQuery =
            serde_yaml::from_str("keywords: x\nlocation: y\nf_WT: '1'\n").unwrap();
        assert_eq!(q.work_mode, WorkMode::OnSite);
        assert_eq!(q.work_mode.code(), "1");
    }

    #[test]
    fn test_invalid_work_mode_rejected() {
        let err = serde_yaml::from_str::<SearchQuery>("keywords: x\nlocation: y\nwork_mode: 9\n")
            .unwrap_err();
        assert!(err.to_string().contains("invalid work mode"));
    }

    #[test]
    fn test_missing_key_fails_fast() {
        let yaml = SAMPLE.replace("title_exclude: [senior]\n", "");
        let err = Preferences::from_yaml_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("title_exclude"));
    }

    #[test]
    fn test_load_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let yaml = SAMPLE
            .split("title_include")
            .nth(1)
            .map(|rest| format!("search_queries: []\ntitle_include{}", rest))
            .unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let err = Preferences::load(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "search_queries",
                ..
            }
        ));
    }
}
