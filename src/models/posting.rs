//! Job posting records.
//!
//! A [`Posting`] is the transient record that flows through one pipeline run.
//! Once annotated with [`StatusFlags`] it becomes a [`PostingDocument`], the
//! shape written to every store backend. Stored documents come back as
//! [`StoredPosting`], which adds the backend-assigned id.
//!
//! Field names on the wire (`job_url`, `date`) match the documents written by
//! earlier versions of the harvester so existing indices stay readable.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// A single job posting as scraped from a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: String,
    /// Calendar date the posting was published, if the card carried one.
    #[serde(
        rename = "date",
        default,
        deserialize_with = "deserialize_lenient_date"
    )]
    pub posted_date: Option<NaiveDate>,
    /// Canonical detail URL, built from the card's numeric id.
    #[serde(rename = "job_url")]
    pub detail_url: String,
    #[serde(default)]
    pub description: Option<String>,
    /// ISO 639-1 code detected from the description.
    #[serde(default)]
    pub language: Option<String>,
    /// Set by a filter stage in mark mode. Never cleared once set.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub filtered: bool,
}

impl Posting {
    /// Create a posting with the fields available on a listing card.
    pub fn new(
        title: impl Into<String>,
        company: impl Into<String>,
        location: impl Into<String>,
        posted_date: Option<NaiveDate>,
        detail_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            company: company.into(),
            location: location.into(),
            posted_date,
            detail_url: detail_url.into(),
            description: None,
            language: None,
            filtered: false,
        }
    }

    /// The `(title, company, posted_date)` identity used for store dedup.
    pub fn identity(&self) -> IdentityKey {
        IdentityKey {
            title: self.title.clone(),
            company: self.company.clone(),
            posted_date: self.posted_date,
        }
    }

    /// True when the description is missing or only whitespace.
    pub fn description_is_blank(&self) -> bool {
        self.description
            .as_deref()
            .map(|d| d.trim().is_empty())
            .unwrap_or(true)
    }
}

/// Identity of a posting: same title, company and date means same posting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    pub title: String,
    pub company: String,
    pub posted_date: Option<NaiveDate>,
}

/// User-managed status flags, all false on first insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFlags {
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub interest: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub applied: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub interview: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub rejected: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub hidden: bool,
}

impl StatusFlags {
    pub fn set(&mut self, field: StatusField, value: bool) {
        match field {
            StatusField::Interest => self.interest = value,
            StatusField::Applied => self.applied = value,
            StatusField::Interview => self.interview = value,
            StatusField::Rejected => self.rejected = value,
            StatusField::Hidden => self.hidden = value,
            // `filtered` lives on the posting itself
            StatusField::Filtered => {}
        }
    }
}

/// A posting plus its status flags, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingDocument {
    #[serde(flatten)]
    pub posting: Posting,
    #[serde(flatten)]
    pub status: StatusFlags,
}

impl PostingDocument {
    /// Annotate a freshly scraped posting with default status flags.
    pub fn annotate(posting: Posting) -> Self {
        Self {
            posting,
            status: StatusFlags::default(),
        }
    }

    pub fn flag(&self, field: StatusField) -> bool {
        match field {
            StatusField::Interest => self.status.interest,
            StatusField::Applied => self.status.applied,
            StatusField::Interview => self.status.interview,
            StatusField::Rejected => self.status.rejected,
            StatusField::Hidden => self.status.hidden,
            StatusField::Filtered => self.posting.filtered,
        }
    }

    pub fn set_flag(&mut self, field: StatusField, value: bool) {
        match field {
            StatusField::Filtered => self.posting.filtered = value,
            other => self.status.set(other, value),
        }
    }
}

/// A document read back from a store, with its backend id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredPosting {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub document: PostingDocument,
    /// Similarity to the uploaded CV, filled in by the dashboard listing.
    #[serde(
        rename = "cv_match_percentage",
        skip_serializing_if = "Option::is_none"
    )]
    pub match_score: Option<f64>,
}

impl StoredPosting {
    pub fn new(id: impl Into<String>, document: PostingDocument) -> Self {
        Self {
            id: id.into(),
            document,
            match_score: None,
        }
    }
}

/// Status flags that can be toggled through the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusField {
    Interest,
    Applied,
    Interview,
    Rejected,
    Hidden,
    Filtered,
}

impl StatusField {
    pub const ALL: [StatusField; 6] = [
        StatusField::Interest,
        StatusField::Applied,
        StatusField::Interview,
        StatusField::Rejected,
        StatusField::Hidden,
        StatusField::Filtered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusField::Interest => "interest",
            StatusField::Applied => "applied",
            StatusField::Interview => "interview",
            StatusField::Rejected => "rejected",
            StatusField::Hidden => "hidden",
            StatusField::Filtered => "filtered",
        }
    }
}

impl fmt::Display for StatusField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatusField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("unknown status field: {}", s))
    }
}

/// Accept `true`/`false` as well as the `0`/`1` integers older indices stored.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Null(()),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
        Flag::Null(()) => false,
    })
}

/// Accept `2024-01-05` as well as full timestamps like `2024-01-05T00:00:00`.
fn deserialize_lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| parse_date_prefix(&s)))
}

/// Parse the leading `YYYY-MM-DD` of a date or timestamp string.
pub(crate) fn parse_date_prefix(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let head = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_uses_legacy_field_names() {
        let posting = Posting::new(
            "Rust Engineer",
            "Acme",
            "Paris",
            NaiveDate::from_ymd_opt(2024, 1, 5),
            "https://www.linkedin.com/jobs/view/42/",
        );
        let doc = PostingDocument::annotate(posting);
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["job_url"], "https://www.linkedin.com/jobs/view/42/");
        assert_eq!(json["date"], "2024-01-05");
        assert_eq!(json["interest"], false);
        assert_eq!(json["hidden"], false);
        assert_eq!(json["filtered"], false);
    }

    #[test]
    fn test_reads_integer_flags_and_timestamps() {
        let json = serde_json::json!({
            "title": "Dev",
            "company": "Acme",
            "location": "Lyon",
            "date": "2024-03-01T00:00:00",
            "job_url": "https://example.com/1",
            "description": null,
            "language": "fr",
            "filtered": 1,
            "interest": 0,
            "applied": 1,
            "interview": 0,
            "rejected": 0
        });

        let doc: PostingDocument = serde_json::from_value(json).unwrap();
        assert_eq!(doc.posting.posted_date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert!(doc.posting.filtered);
        assert!(doc.status.applied);
        assert!(!doc.status.hidden);
    }

    #[test]
    fn test_status_field_parse() {
        assert_eq!("hidden".parse::<StatusField>(), Ok(StatusField::Hidden));
        assert!("salary".parse::<StatusField>().is_err());
    }

    #[test]
    fn test_set_flag_routes_filtered_to_posting() {
        let mut doc = PostingDocument::annotate(Posting::new("a", "b", "", None, "u"));
        doc.set_flag(StatusField::Filtered, true);
        doc.set_flag(StatusField::Interview, true);
        assert!(doc.posting.filtered);
        assert!(doc.flag(StatusField::Interview));
        assert!(!doc.flag(StatusField::Rejected));
    }
}
