//! Dashboard API over the posting store.
//!
//! JSON endpoints for browsing postings, updating their status flags,
//! per-status stats, the company list and the résumé used for match scoring.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::config::Settings;
use crate::services::CvFile;
use crate::store::{open_store, JobStore, StoreError};

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub index: String,
    pub cv: CvFile,
}

impl AppState {
    pub fn new(store: Arc<dyn JobStore>, index: impl Into<String>, cv: CvFile) -> Self {
        Self {
            store,
            index: index.into(),
            cv,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, StoreError> {
        let store = open_store(&settings.store)?;
        Ok(Self::new(
            store,
            &settings.store.index,
            CvFile::new(&settings.server.cv_path),
        ))
    }
}

/// Handler errors, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::NotFound(_) | StoreError::IndexNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Start the web server.
pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting dashboard at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
