//! Diesel row types for the SQLite store.

use diesel::prelude::*;

use crate::models::{parse_date_prefix, Posting, PostingDocument, StatusFlags, StoredPosting};
use crate::schema;

/// Posting row from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::postings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PostingRecord {
    pub id: String,
    pub index_name: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub posted_date: Option<String>,
    pub job_url: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub filtered: bool,
    pub interest: bool,
    pub applied: bool,
    pub interview: bool,
    pub rejected: bool,
    pub hidden: bool,
    pub created_at: String,
}

impl From<PostingRecord> for StoredPosting {
    fn from(record: PostingRecord) -> Self {
        let posting = Posting {
            title: record.title,
            company: record.company,
            location: record.location,
            posted_date: record.posted_date.as_deref().and_then(parse_date_prefix),
            detail_url: record.job_url,
            description: record.description,
            language: record.language,
            filtered: record.filtered,
        };
        let status = StatusFlags {
            interest: record.interest,
            applied: record.applied,
            interview: record.interview,
            rejected: record.rejected,
            hidden: record.hidden,
        };
        StoredPosting::new(record.id, PostingDocument { posting, status })
    }
}

/// New posting row for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::postings)]
pub struct NewPostingRecord<'a> {
    pub id: String,
    pub index_name: &'a str,
    pub title: &'a str,
    pub company: &'a str,
    pub location: &'a str,
    pub posted_date: Option<String>,
    pub job_url: &'a str,
    pub description: Option<&'a str>,
    pub language: Option<&'a str>,
    pub filtered: bool,
    pub interest: bool,
    pub applied: bool,
    pub interview: bool,
    pub rejected: bool,
    pub hidden: bool,
    pub created_at: &'a str,
}

impl<'a> NewPostingRecord<'a> {
    pub fn new(index_name: &'a str, doc: &'a PostingDocument, created_at: &'a str) -> Self {
        let p = &doc.posting;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            index_name,
            title: &p.title,
            company: &p.company,
            location: &p.location,
            posted_date: p.posted_date.map(|d| d.format("%Y-%m-%d").to_string()),
            job_url: &p.detail_url,
            description: p.description.as_deref(),
            language: p.language.as_deref(),
            filtered: p.filtered,
            interest: doc.status.interest,
            applied: doc.status.applied,
            interview: doc.status.interview,
            rejected: doc.status.rejected,
            hidden: doc.status.hidden,
            created_at,
        }
    }
}
