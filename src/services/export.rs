//! CSV export of an index.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::info;

use crate::models::{StatusField, StoredPosting};
use crate::store::{Criteria, JobStore, StoreError, StoreQuery};

/// Postings fetched per search round trip.
pub const EXPORT_PAGE_SIZE: usize = 100;

pub const CSV_COLUMNS: [&str; 14] = [
    "id",
    "title",
    "company",
    "location",
    "date",
    "job_url",
    "interest",
    "applied",
    "interview",
    "rejected",
    "hidden",
    "filtered",
    "language",
    "description",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("store error during export: {0}")]
    Store(#[from] StoreError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// `jobs_export_<YYYYMMDD_HHMMSS>.csv`
pub fn default_file_name(now: DateTime<Local>) -> String {
    format!("jobs_export_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

fn flag(hit: &StoredPosting, field: StatusField) -> &'static str {
    if hit.document.flag(field) {
        "1"
    } else {
        "0"
    }
}

fn row(hit: &StoredPosting) -> [String; 14] {
    let p = &hit.document.posting;
    [
        hit.id.clone(),
        p.title.clone(),
        p.company.clone(),
        p.location.clone(),
        p.posted_date.map(|d| d.to_string()).unwrap_or_default(),
        p.detail_url.clone(),
        flag(hit, StatusField::Interest).to_string(),
        flag(hit, StatusField::Applied).to_string(),
        flag(hit, StatusField::Interview).to_string(),
        flag(hit, StatusField::Rejected).to_string(),
        flag(hit, StatusField::Hidden).to_string(),
        flag(hit, StatusField::Filtered).to_string(),
        p.language.clone().unwrap_or_default(),
        p.description.clone().unwrap_or_default(),
    ]
}

/// Write every posting of `index` as CSV, paging through the store.
/// Returns the number of rows written.
pub async fn write_csv<W: Write>(
    store: &dyn JobStore,
    index: &str,
    writer: W,
) -> Result<usize, ExportError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_COLUMNS)?;

    let mut offset = 0;
    loop {
        let query = StoreQuery::new(Criteria::All).page(offset, EXPORT_PAGE_SIZE);
        let page = store.search(index, &query).await?;
        let fetched = page.hits.len();
        for hit in &page.hits {
            csv.write_record(row(hit))?;
        }
        offset += fetched;
        if fetched < EXPORT_PAGE_SIZE || offset as u64 >= page.total {
            break;
        }
    }

    csv.flush().map_err(csv::Error::from)?;
    Ok(offset)
}

/// Export `index` to `output`, or to a timestamped file in the current
/// directory. Parent directories are created.
pub async fn export_to_file(
    store: &dyn JobStore,
    index: &str,
    output: Option<&Path>,
) -> Result<(PathBuf, usize), ExportError> {
    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(default_file_name(Local::now())));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ExportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let file = std::fs::File::create(&path).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;

    let rows = write_csv(store, index, std::io::BufWriter::new(file)).await?;
    info!(path = %path.display(), rows, "exported postings");
    Ok((path, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Posting, PostingDocument};
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, TimeZone};

    async fn store_with(n: usize) -> MemoryStore {
        let store = MemoryStore::new();
        let docs: Vec<PostingDocument> = (0..n)
            .map(|i| {
                let mut p = Posting::new(
                    format!("Engineer {}", i),
                    "Acme, Inc.",
                    "Lyon",
                    NaiveDate::from_ymd_opt(2024, 2, 1),
                    format!("https://jobs.test/view/{}/", i),
                );
                p.description = Some("Line one\n- \"quoted\" item".into());
                p.language = Some("en".into());
                PostingDocument::annotate(p)
            })
            .collect();
        store.insert_bulk("jobs", &docs).await.unwrap();
        store
    }

    #[test]
    fn test_default_file_name() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(default_file_name(now), "jobs_export_20240309_140507.csv");
    }

    #[tokio::test]
    async fn test_write_csv_pages_through_everything() {
        let store = store_with(EXPORT_PAGE_SIZE + 5).await;
        let mut buf = Vec::new();
        let rows = write_csv(&store, "jobs", &mut buf).await.unwrap();
        assert_eq!(rows, EXPORT_PAGE_SIZE + 5);

        let mut reader = csv::Reader::from_reader(buf.as_slice());
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, CSV_COLUMNS);

        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), EXPORT_PAGE_SIZE + 5);
        let first = &records[0];
        assert_eq!(&first[2], "Acme, Inc.");
        assert_eq!(&first[4], "2024-02-01");
        assert_eq!(&first[6], "0");
        assert_eq!(&first[13], "Line one\n- \"quoted\" item");
    }

    #[tokio::test]
    async fn test_export_creates_parent_dir() {
        let store = store_with(2).await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/out.csv");
        let (path, rows) = export_to_file(&store, "jobs", Some(&target)).await.unwrap();
        assert_eq!(path, target);
        assert_eq!(rows, 2);
        assert!(std::fs::read_to_string(&target).unwrap().starts_with("id,title,"));
    }

    #[tokio::test]
    async fn test_missing_index_is_store_error() {
        let store = MemoryStore::new();
        let err = write_csv(&store, "nope", Vec::new()).await.unwrap_err();
        assert!(matches!(err, ExportError::Store(_)));
    }
}
