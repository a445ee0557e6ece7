//! HTTP request handlers for the dashboard API.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, AppState};
use crate::models::StatusField;
use crate::services::listings::{self, JobStats, ListingPage, ListingRequest, DEFAULT_PER_PAGE};
use crate::store::ListingFilter;

/// Query parameters for the job listing. Status flags only filter when `"true"`.
#[derive(Debug, Default, Deserialize)]
pub struct JobsParams {
    pub search: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    pub sort_by_cv_match: Option<String>,
    pub interest: Option<String>,
    pub applied: Option<String>,
    pub interview: Option<String>,
    pub rejected: Option<String>,
    pub hidden: Option<String>,
    pub filtered: Option<String>,
    pub exclude_filtered: Option<String>,
    pub company: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

fn is_true(value: &Option<String>) -> bool {
    value
        .as_deref()
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

fn parse_date(name: &str, value: &Option<String>) -> Result<Option<NaiveDate>, ApiError> {
    match value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => crate::models::parse_date_prefix(raw)
            .map(Some)
            .ok_or_else(|| ApiError::BadRequest(format!("invalid {}: {}", name, raw))),
    }
}

impl JobsParams {
    fn into_request(self) -> Result<ListingRequest, ApiError> {
        let flags = [
            (StatusField::Interest, &self.interest),
            (StatusField::Applied, &self.applied),
            (StatusField::Interview, &self.interview),
            (StatusField::Rejected, &self.rejected),
            (StatusField::Hidden, &self.hidden),
            (StatusField::Filtered, &self.filtered),
        ];
        let statuses = flags
            .into_iter()
            .filter(|(_, v)| is_true(v))
            .map(|(field, _)| (field, true))
            .collect();

        let filter = ListingFilter {
            search: self.search.clone().filter(|s| !s.trim().is_empty()),
            statuses,
            exclude_filtered: is_true(&self.exclude_filtered),
            company: self.company.clone().filter(|c| !c.is_empty()),
            date_from: parse_date("date_from", &self.date_from)?,
            date_to: parse_date("date_to", &self.date_to)?,
        };

        Ok(ListingRequest {
            filter,
            page: self.page.unwrap_or(1),
            per_page: self.per_page.unwrap_or(DEFAULT_PER_PAGE),
            sort_by_cv_match: is_true(&self.sort_by_cv_match),
        })
    }
}

pub async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.store.ping().await?;
    Ok(Json(json!({
        "status": "ok",
        "backend": state.store.backend_name(),
    })))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<JobStats>, ApiError> {
    Ok(Json(listings::stats(state.store.as_ref(), &state.index).await?))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobsParams>,
) -> Result<Json<ListingPage>, ApiError> {
    let request = params.into_request()?;
    let cv = state.cv.load().await;
    let page = listings::list_jobs(state.store.as_ref(), &state.index, request, cv.as_deref())
        .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    pub field: String,
    pub value: Value,
}

pub async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<Value>, ApiError> {
    let field: StatusField = body
        .field
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid field".into()))?;
    let Value::Bool(value) = body.value else {
        return Err(ApiError::BadRequest("Value must be boolean".into()));
    };

    state
        .store
        .update_status(&state.index, &id, field, value)
        .await?;
    tracing::debug!(%id, %field, value, "updated posting status");
    Ok(Json(json!({ "success": true })))
}

pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.store.delete(&state.index, &id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn companies(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(listings::companies(state.store.as_ref(), &state.index).await?))
}

pub async fn upload_cv(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    if body.trim().is_empty() {
        return Err(ApiError::BadRequest("CV text is empty".into()));
    }
    state
        .cv
        .save(&body)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to save CV: {}", e)))?;
    Ok(Json(json!({ "success": true, "message": "CV uploaded successfully" })))
}

pub async fn cv_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "cv_available": state.cv.is_available().await }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Posting, PostingDocument};
    use crate::server::create_router;
    use crate::services::CvFile;
    use crate::store::{JobStore, MemoryStore};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> (axum::Router, Arc<MemoryStore>, String, tempfile::TempDir) {
        let store = Arc::new(MemoryStore::new());
        let doc = PostingDocument::annotate(Posting::new(
            "Rust engineer",
            "Acme",
            "Paris",
            NaiveDate::from_ymd_opt(2024, 1, 2),
            "https://jobs.test/1",
        ));
        store.insert_bulk("jobs", &[doc]).await.unwrap();
        let id = store
            .search("jobs", &crate::store::StoreQuery::new(crate::store::Criteria::All))
            .await
            .unwrap()
            .hits[0]
            .id
            .clone();
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(store.clone(), "jobs", CvFile::new(dir.path().join("cv.txt")));
        (create_router(state), store, id, dir)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn update(id: &str, body: Value) -> Request<Body> {
        Request::post(format!("/api/jobs/{}/update", id))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_field() {
        let (app, _, id, _dir) = app().await;
        let response = app
            .oneshot(update(&id, json!({"field": "salary", "value": true})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Invalid field");
    }

    #[tokio::test]
    async fn test_update_rejects_non_boolean() {
        let (app, _, id, _dir) = app().await;
        let response = app
            .oneshot(update(&id, json!({"field": "applied", "value": 1})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_sets_flag() {
        let (app, store, id, _dir) = app().await;
        let response = app
            .oneshot(update(&id, json!({"field": "applied", "value": true})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let stored = store.get("jobs", &id).await.unwrap().unwrap();
        assert!(stored.document.status.applied);
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_404() {
        let (app, _, _, _dir) = app().await;
        let response = app
            .oneshot(update("missing", json!({"field": "hidden", "value": true})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_jobs_shape() {
        let (app, _, _, _dir) = app().await;
        let response = app
            .oneshot(
                Request::get("/api/jobs?search=rust&applied=false&per_page=5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["per_page"], 5);
        assert_eq!(body["total_pages"], 1);
        assert_eq!(body["cv_available"], false);
        assert_eq!(body["jobs"][0]["title"], "Rust engineer");
        assert_eq!(body["jobs"][0]["cv_match_percentage"], 0.0);
    }

    #[tokio::test]
    async fn test_list_jobs_bad_date_is_400() {
        let (app, _, _, _dir) = app().await;
        let response = app
            .oneshot(
                Request::get("/api/jobs?date_from=yesterday")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cv_upload_then_status() {
        let (app, _, _, _dir) = app().await;
        let response = app
            .clone()
            .oneshot(Request::post("/api/cv").body(Body::from("Rust, Tokio")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/api/cv/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await["cv_available"], true);
    }

    #[tokio::test]
    async fn test_delete_then_stats() {
        let (app, _, id, _dir) = app().await;
        let response = app
            .clone()
            .oneshot(
                Request::delete(format!("/api/jobs/{}/delete", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/api/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await["total"], 0);
    }
}
