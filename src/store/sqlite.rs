//! SQLite-backed store.
//!
//! All indices share one `postings` table; each row carries its
//! `index_name`. Indices themselves are rows in `indices`.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::Sqlite;

use super::diesel_models::{NewPostingRecord, PostingRecord};
use super::diesel_pool::{create_diesel_pool, run_blocking, DieselError, SqlitePool};
use super::{
    BulkFailure, BulkReport, CompanyCount, Criteria, JobStore, SearchResults, StoreError,
    StoreQuery,
};
use crate::models::{PostingDocument, StatusField, StoredPosting};
use crate::schema::{indices, postings};

const DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS indices (
        name TEXT PRIMARY KEY NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS postings (
        id TEXT PRIMARY KEY NOT NULL,
        index_name TEXT NOT NULL,
        title TEXT NOT NULL,
        company TEXT NOT NULL,
        location TEXT NOT NULL,
        posted_date TEXT,
        job_url TEXT NOT NULL,
        description TEXT,
        language TEXT,
        filtered BOOLEAN NOT NULL DEFAULT 0,
        interest BOOLEAN NOT NULL DEFAULT 0,
        applied BOOLEAN NOT NULL DEFAULT 0,
        interview BOOLEAN NOT NULL DEFAULT 0,
        rejected BOOLEAN NOT NULL DEFAULT 0,
        hidden BOOLEAN NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_postings_identity ON postings(index_name, title, company)",
    "CREATE INDEX IF NOT EXISTS idx_postings_url ON postings(index_name, job_url)",
    "CREATE INDEX IF NOT EXISTS idx_postings_date ON postings(index_name, posted_date)",
];

/// Build the filtered (unordered, unpaged) query for a criteria set.
fn select<'a>(index: &'a str, criteria: &'a Criteria) -> postings::BoxedQuery<'a, Sqlite> {
    let mut query = postings::table
        .filter(postings::index_name.eq(index))
        .into_boxed();

    match criteria {
        Criteria::All => {}
        Criteria::Identities(keys) => {
            // Per-column IN lists keep the expression flat for large batches.
            // The result can hold cross combinations; callers compare full keys.
            let titles: Vec<&str> = keys.iter().map(|k| k.title.as_str()).collect();
            let companies: Vec<&str> = keys.iter().map(|k| k.company.as_str()).collect();
            let dates: Vec<String> = keys
                .iter()
                .filter_map(|k| k.posted_date)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .collect();
            query = query
                .filter(postings::title.eq_any(titles))
                .filter(postings::company.eq_any(companies));
            query = if keys.iter().any(|k| k.posted_date.is_none()) {
                query.filter(
                    postings::posted_date
                        .eq_any(dates)
                        .or(postings::posted_date.is_null()),
                )
            } else {
                query.filter(postings::posted_date.eq_any(dates))
            };
        }
        Criteria::Urls(urls) => {
            query = query.filter(postings::job_url.eq_any(urls));
        }
        Criteria::Listing(filter) => {
            if filter.exclude_filtered {
                query = query.filter(postings::filtered.eq(false));
            }
            for &(field, value) in &filter.statuses {
                query = match field {
                    StatusField::Interest => query.filter(postings::interest.eq(value)),
                    StatusField::Applied => query.filter(postings::applied.eq(value)),
                    StatusField::Interview => query.filter(postings::interview.eq(value)),
                    StatusField::Rejected => query.filter(postings::rejected.eq(value)),
                    StatusField::Hidden => query.filter(postings::hidden.eq(value)),
                    StatusField::Filtered => query.filter(postings::filtered.eq(value)),
                };
            }
            if let Some(ref company) = filter.company {
                query = query.filter(postings::company.eq(company));
            }
            if let Some(from) = filter.date_from {
                query = query.filter(postings::posted_date.ge(from.format("%Y-%m-%d").to_string()));
            }
            if let Some(to) = filter.date_to {
                query = query.filter(postings::posted_date.le(to.format("%Y-%m-%d").to_string()));
            }
            if let Some(search) = filter.search.as_deref().map(str::trim) {
                if !search.is_empty() {
                    // LIKE is case-insensitive for ASCII in SQLite
                    let pattern = format!("%{}%", search);
                    query = query.filter(
                        postings::title
                            .like(pattern.clone())
                            .or(postings::company.like(pattern.clone()))
                            .or(postings::location.like(pattern.clone()))
                            .or(postings::description.like(pattern)),
                    );
                }
            }
        }
    }

    query
}

fn index_exists(conn: &mut SqliteConnection, index: &str) -> Result<bool, DieselError> {
    indices::table
        .find(index)
        .select(indices::name)
        .first::<String>(conn)
        .optional()
        .map(|found| found.is_some())
}

/// Diesel-backed store with an r2d2 pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file and ensure tables exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("{}: {}", parent.display(), e)))?;
        }
        let pool = create_diesel_pool(path).map_err(|e| StoreError::Pool(e.to_string()))?;
        let mut conn = pool.get().map_err(|e| StoreError::Pool(e.to_string()))?;
        for statement in DDL {
            diesel::sql_query(*statement).execute(&mut *conn)?;
        }
        Ok(Self { pool })
    }

    async fn require_index(&self, index: &str) -> Result<(), StoreError> {
        let name = index.to_string();
        let exists = run_blocking(self.pool.clone(), move |conn| index_exists(conn, &name)).await?;
        if exists {
            Ok(())
        } else {
            Err(StoreError::IndexNotFound(index.to_string()))
        }
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        run_blocking(self.pool.clone(), |conn| {
            diesel::sql_query("SELECT 1").execute(conn)
        })
        .await
        .map(|_| ())
        .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn create_index(&self, index: &str) -> Result<bool, StoreError> {
        let name = index.to_string();
        let now = Utc::now().to_rfc3339();
        let rows = run_blocking(self.pool.clone(), move |conn| {
            diesel::insert_or_ignore_into(indices::table)
                .values((indices::name.eq(&name), indices::created_at.eq(&now)))
                .execute(conn)
        })
        .await?;
        Ok(rows > 0)
    }

    async fn delete_index(&self, index: &str) -> Result<bool, StoreError> {
        let name = index.to_string();
        let rows = run_blocking(self.pool.clone(), move |conn| {
            conn.transaction(|conn| {
                diesel::delete(postings::table.filter(postings::index_name.eq(&name)))
                    .execute(conn)?;
                diesel::delete(indices::table.find(&name)).execute(conn)
            })
        })
        .await?;
        Ok(rows > 0)
    }

    async fn search(&self, index: &str, query: &StoreQuery) -> Result<SearchResults, StoreError> {
        self.require_index(index).await?;

        let index = index.to_string();
        let query = query.clone();
        let (total, records) = run_blocking(self.pool.clone(), move |conn| {
            let total: i64 = select(&index, &query.criteria).count().get_result(conn)?;
            let records = select(&index, &query.criteria)
                .order((postings::posted_date.desc(), postings::job_url.asc()))
                .offset(query.offset as i64)
                .limit(query.limit as i64)
                .select(PostingRecord::as_select())
                .load::<PostingRecord>(conn)?;
            Ok((total, records))
        })
        .await?;

        Ok(SearchResults {
            total: total.max(0) as u64,
            hits: records.into_iter().map(StoredPosting::from).collect(),
        })
    }

    async fn get(&self, index: &str, id: &str) -> Result<Option<StoredPosting>, StoreError> {
        let index = index.to_string();
        let id = id.to_string();
        let record = run_blocking(self.pool.clone(), move |conn| {
            postings::table
                .filter(postings::index_name.eq(&index))
                .filter(postings::id.eq(&id))
                .select(PostingRecord::as_select())
                .first::<PostingRecord>(conn)
                .optional()
        })
        .await?;
        Ok(record.map(StoredPosting::from))
    }

    async fn insert_bulk(
        &self,
        index: &str,
        docs: &[PostingDocument],
    ) -> Result<BulkReport, StoreError> {
        let index = index.to_string();
        let docs = docs.to_vec();
        let report = run_blocking(self.pool.clone(), move |conn| {
            let now = Utc::now().to_rfc3339();
            let mut report = BulkReport::default();
            for (position, doc) in docs.iter().enumerate() {
                let record = NewPostingRecord::new(&index, doc, &now);
                match diesel::insert_into(postings::table)
                    .values(&record)
                    .execute(conn)
                {
                    Ok(_) => report.inserted += 1,
                    Err(e) => report.failures.push(BulkFailure {
                        position,
                        reason: e.to_string(),
                    }),
                }
            }
            Ok(report)
        })
        .await?;
        Ok(report)
    }

    async fn update_status(
        &self,
        index: &str,
        id: &str,
        field: StatusField,
        value: bool,
    ) -> Result<(), StoreError> {
        let index_name = index.to_string();
        let doc_id = id.to_string();
        let rows = run_blocking(self.pool.clone(), move |conn| {
            let target = postings::table
                .filter(postings::index_name.eq(index_name))
                .filter(postings::id.eq(doc_id));
            let update = diesel::update(target);
            match field {
                StatusField::Interest => update.set(postings::interest.eq(value)).execute(conn),
                StatusField::Applied => update.set(postings::applied.eq(value)).execute(conn),
                StatusField::Interview => update.set(postings::interview.eq(value)).execute(conn),
                StatusField::Rejected => update.set(postings::rejected.eq(value)).execute(conn),
                StatusField::Hidden => update.set(postings::hidden.eq(value)).execute(conn),
                StatusField::Filtered => update.set(postings::filtered.eq(value)).execute(conn),
            }
        })
        .await?;

        if rows == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, index: &str, id: &str) -> Result<(), StoreError> {
        let index_name = index.to_string();
        let doc_id = id.to_string();
        let rows = run_blocking(self.pool.clone(), move |conn| {
            diesel::delete(
                postings::table
                    .filter(postings::index_name.eq(index_name))
                    .filter(postings::id.eq(doc_id)),
            )
            .execute(conn)
        })
        .await?;

        if rows == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn companies(&self, index: &str, limit: usize) -> Result<Vec<CompanyCount>, StoreError> {
        self.require_index(index).await?;

        let index = index.to_string();
        let rows: Vec<(String, i64)> = run_blocking(self.pool.clone(), move |conn| {
            postings::table
                .filter(postings::index_name.eq(index))
                .filter(postings::company.ne(""))
                .group_by(postings::company)
                .select((postings::company, diesel::dsl::count(postings::id)))
                .load(conn)
        })
        .await?;

        let mut companies: Vec<CompanyCount> = rows
            .into_iter()
            .map(|(company, count)| CompanyCount {
                company,
                count: count.max(0) as u64,
            })
            .collect();
        companies.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.company.cmp(&b.company)));
        companies.truncate(limit);
        Ok(companies)
    }
}
