//! Elasticsearch-backed store over its REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{
    BulkFailure, BulkReport, CompanyCount, Criteria, JobStore, ListingFilter, SearchResults,
    StoreError, StoreQuery,
};
use crate::config::StoreSettings;
use crate::models::{PostingDocument, StatusField, StoredPosting};

/// Mapping used when creating an index.
pub fn index_mapping() -> Value {
    let keyword_text = json!({
        "type": "text",
        "fields": { "keyword": { "type": "keyword", "ignore_above": 512 } }
    });
    json!({
        "mappings": {
            "properties": {
                "title": keyword_text,
                "company": keyword_text,
                "location": { "type": "text" },
                "date": { "type": "date", "format": "strict_date_optional_time||yyyy-MM-dd" },
                "job_url": { "type": "keyword" },
                "description": { "type": "text" },
                "language": { "type": "keyword" },
                "filtered": { "type": "boolean" },
                "interest": { "type": "boolean" },
                "applied": { "type": "boolean" },
                "interview": { "type": "boolean" },
                "rejected": { "type": "boolean" },
                "hidden": { "type": "boolean" }
            }
        }
    })
}

fn listing_query(filter: &ListingFilter) -> Value {
    let mut must = Vec::new();
    let mut filters = Vec::new();
    let mut must_not = Vec::new();

    if let Some(search) = filter.search.as_deref().map(str::trim) {
        if !search.is_empty() {
            must.push(json!({
                "multi_match": {
                    "query": search,
                    "fields": ["title", "company", "description", "location"]
                }
            }));
        }
    }
    for &(field, value) in &filter.statuses {
        filters.push(json!({ "term": { field.as_str(): value } }));
    }
    if filter.exclude_filtered {
        must_not.push(json!({ "term": { "filtered": true } }));
    }
    if let Some(ref company) = filter.company {
        filters.push(json!({ "term": { "company.keyword": company } }));
    }
    if filter.date_from.is_some() || filter.date_to.is_some() {
        let mut range = serde_json::Map::new();
        if let Some(from) = filter.date_from {
            range.insert("gte".into(), json!(from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = filter.date_to {
            range.insert("lte".into(), json!(to.format("%Y-%m-%d").to_string()));
        }
        filters.push(json!({ "range": { "date": range } }));
    }

    if must.is_empty() && filters.is_empty() && must_not.is_empty() {
        return json!({ "match_all": {} });
    }
    json!({ "bool": { "must": must, "filter": filters, "must_not": must_not } })
}

/// Query clause for a criteria set.
pub fn criteria_query(criteria: &Criteria) -> Value {
    match criteria {
        Criteria::All => json!({ "match_all": {} }),
        Criteria::Identities(keys) => {
            let should: Vec<Value> = keys
                .iter()
                .map(|k| match k.posted_date {
                    Some(date) => json!({ "bool": { "filter": [
                        { "term": { "title.keyword": k.title } },
                        { "term": { "company.keyword": k.company } },
                        { "term": { "date": date.format("%Y-%m-%d").to_string() } }
                    ] } }),
                    None => json!({ "bool": {
                        "filter": [
                            { "term": { "title.keyword": k.title } },
                            { "term": { "company.keyword": k.company } }
                        ],
                        "must_not": [{ "exists": { "field": "date" } }]
                    } }),
                })
                .collect();
            json!({ "bool": { "should": should, "minimum_should_match": 1 } })
        }
        Criteria::Urls(urls) => json!({ "terms": { "job_url": urls } }),
        Criteria::Listing(filter) => listing_query(filter),
    }
}

/// Full `_search` request body.
pub fn search_body(query: &StoreQuery) -> Value {
    json!({
        "from": query.offset,
        "size": query.limit,
        "track_total_hits": true,
        "sort": [
            { "date": { "order": "desc", "missing": "_last" } },
            { "job_url": { "order": "asc" } }
        ],
        "query": criteria_query(&query.criteria)
    })
}

/// NDJSON body for `_bulk`.
pub fn bulk_body(docs: &[PostingDocument]) -> Result<String, serde_json::Error> {
    let mut body = String::new();
    for doc in docs {
        body.push_str("{\"index\":{}}\n");
        body.push_str(&serde_json::to_string(doc)?);
        body.push('\n');
    }
    Ok(body)
}

/// Split a `_bulk` response into successes and per-item failures.
pub fn parse_bulk_response(response: &Value, submitted: usize) -> BulkReport {
    let items = response["items"].as_array().cloned().unwrap_or_default();
    let mut report = BulkReport::default();

    for (position, item) in items.iter().enumerate() {
        let action = &item["index"];
        if action["error"].is_null() {
            report.inserted += 1;
        } else {
            let reason = action["error"]["reason"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| action["error"].to_string());
            report.failures.push(BulkFailure { position, reason });
        }
    }
    // Items the cluster never acknowledged count as failures too
    for position in items.len()..submitted {
        report.failures.push(BulkFailure {
            position,
            reason: "no result returned for item".to_string(),
        });
    }
    report
}

fn parse_hit(hit: &Value) -> Result<StoredPosting, StoreError> {
    let id = hit["_id"].as_str().unwrap_or_default().to_string();
    let document: PostingDocument = serde_json::from_value(hit["_source"].clone())?;
    Ok(StoredPosting::new(id, document))
}

/// Parse a `_search` response.
pub fn parse_search_response(response: &Value) -> Result<SearchResults, StoreError> {
    let total = response["hits"]["total"]["value"]
        .as_u64()
        .or_else(|| response["hits"]["total"].as_u64())
        .unwrap_or(0);
    let hits = response["hits"]["hits"]
        .as_array()
        .map(|hits| hits.iter().map(parse_hit).collect::<Result<Vec<_>, _>>())
        .transpose()?
        .unwrap_or_default();
    Ok(SearchResults { total, hits })
}

/// Elasticsearch REST client.
#[derive(Clone)]
pub struct ElasticStore {
    client: Client,
    base_url: String,
    basic_auth: Option<(String, Option<String>)>,
}

impl ElasticStore {
    pub fn new(base_url: &str, timeout: Duration, verify_certs: bool) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!verify_certs)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            basic_auth: None,
        })
    }

    pub fn from_settings(settings: &StoreSettings) -> Result<Self, StoreError> {
        let mut store = Self::new(
            &settings.backend,
            settings.request_timeout,
            settings.verify_certs,
        )?;
        if let Some(ref auth) = settings.basic_auth {
            store = store.with_basic_auth(auth);
        }
        Ok(store)
    }

    /// `user:password`, or just `user`.
    pub fn with_basic_auth(mut self, credentials: &str) -> Self {
        let (user, password) = match credentials.split_once(':') {
            Some((u, p)) => (u.to_string(), Some(p.to_string())),
            None => (credentials.to_string(), None),
        };
        self.basic_auth = Some((user, password));
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match self.basic_auth {
            Some((ref user, ref password)) => request.basic_auth(user, password.as_ref()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        self.authed(request).send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                StoreError::Unavailable(e.to_string())
            } else {
                StoreError::Request(e.to_string())
            }
        })
    }

    async fn json_body(response: Response) -> Result<Value, StoreError> {
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Request(format!("invalid response body: {}", e)))?;
        if !status.is_success() {
            return Err(StoreError::Request(format!("HTTP {}: {}", status, body)));
        }
        Ok(body)
    }

    fn doc_path(index: &str, action: &str, id: &str) -> String {
        format!(
            "{}/{}/{}?refresh=wait_for",
            index,
            action,
            urlencoding::encode(id)
        )
    }
}

#[async_trait]
impl JobStore for ElasticStore {
    fn backend_name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let response = self.send(self.client.get(self.url("/"))).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!("HTTP {}", response.status())))
        }
    }

    async fn create_index(&self, index: &str) -> Result<bool, StoreError> {
        let exists = self.send(self.client.head(self.url(index))).await?;
        if exists.status().is_success() {
            return Ok(false);
        }

        let response = self
            .send(self.client.put(self.url(index)).json(&index_mapping()))
            .await?;
        if response.status() == StatusCode::BAD_REQUEST {
            let body: Value = response.json().await.unwrap_or_default();
            if body["error"]["type"] == "resource_already_exists_exception" {
                debug!(index, "index created concurrently");
                return Ok(false);
            }
            return Err(StoreError::Request(format!("create index: {}", body)));
        }
        Self::json_body(response).await?;
        Ok(true)
    }

    async fn delete_index(&self, index: &str) -> Result<bool, StoreError> {
        let response = self.send(self.client.delete(self.url(index))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::json_body(response).await?;
        Ok(true)
    }

    async fn search(&self, index: &str, query: &StoreQuery) -> Result<SearchResults, StoreError> {
        let path = format!("{}/_search", index);
        let response = self
            .send(self.client.post(self.url(&path)).json(&search_body(query)))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::IndexNotFound(index.to_string()));
        }
        parse_search_response(&Self::json_body(response).await?)
    }

    async fn get(&self, index: &str, id: &str) -> Result<Option<StoredPosting>, StoreError> {
        let path = format!("{}/_doc/{}", index, urlencoding::encode(id));
        let response = self.send(self.client.get(self.url(&path))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = Self::json_body(response).await?;
        if body["found"] == false {
            return Ok(None);
        }
        parse_hit(&body).map(Some)
    }

    async fn insert_bulk(
        &self,
        index: &str,
        docs: &[PostingDocument],
    ) -> Result<BulkReport, StoreError> {
        if docs.is_empty() {
            return Ok(BulkReport::default());
        }
        let path = format!("{}/_bulk?refresh=wait_for", index);
        let response = self
            .send(
                self.client
                    .post(self.url(&path))
                    .header("Content-Type", "application/x-ndjson")
                    .body(bulk_body(docs)?),
            )
            .await?;
        let body = Self::json_body(response).await?;
        let report = parse_bulk_response(&body, docs.len());
        if !report.is_complete() {
            warn!(
                index,
                failed = report.failures.len(),
                "bulk insert rejected some documents"
            );
        }
        Ok(report)
    }

    async fn update_status(
        &self,
        index: &str,
        id: &str,
        field: StatusField,
        value: bool,
    ) -> Result<(), StoreError> {
        let body = json!({ "doc": { field.as_str(): value } });
        let response = self
            .send(
                self.client
                    .post(self.url(&Self::doc_path(index, "_update", id)))
                    .json(&body),
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Self::json_body(response).await.map(|_| ())
    }

    async fn delete(&self, index: &str, id: &str) -> Result<(), StoreError> {
        let response = self
            .send(
                self.client
                    .delete(self.url(&Self::doc_path(index, "_doc", id))),
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Self::json_body(response).await.map(|_| ())
    }

    async fn companies(&self, index: &str, limit: usize) -> Result<Vec<CompanyCount>, StoreError> {
        let body = json!({
            "size": 0,
            "aggs": { "companies": { "terms": { "field": "company.keyword", "size": limit } } }
        });
        let path = format!("{}/_search", index);
        let response = self
            .send(self.client.post(self.url(&path)).json(&body))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::IndexNotFound(index.to_string()));
        }
        let body = Self::json_body(response).await?;
        Ok(body["aggregations"]["companies"]["buckets"]
            .as_array()
            .map(|buckets| {
                buckets
                    .iter()
                    .filter_map(|b| {
                        Some(CompanyCount {
                            company: b["key"].as_str()?.to_string(),
                            count: b["doc_count"].as_u64().unwrap_or(0),
                        })
                    })
                    .filter(|c| !c.company.is_empty())
                    .collect()
            })
            .unwrap_or_default())
    }
}
