pub mod authors;
pub mod quotes;
pub mod scrape;
pub mod stats;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{error, info};

use crate::db::Store;
use crate::error::{StoreError, TaskError};
use crate::service::{ScrapeService, StatusError};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub scrape: Arc<ScrapeService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .route("/quotes", get(quotes::list).post(quotes::create))
        .route(
            "/quotes/:id",
            get(quotes::get_one).put(quotes::update).delete(quotes::delete),
        )
        .route("/authors", get(authors::list).post(authors::create))
        .route(
            "/authors/:id",
            get(authors::get_one).put(authors::update).delete(authors::delete),
        )
        .route("/stats", get(stats::get_stats))
        .route("/scrape", post(scrape::trigger))
        .route("/scrape/tasks/:task_id", get(scrape::status))
        .route("/scrape/scheduled", get(scrape::scheduled))
        .with_state(state)
}

pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Task(#[from] TaskError),
}

impl From<StatusError> for ApiError {
    fn from(err: StatusError) -> Self {
        match err {
            StatusError::Task(e) => ApiError::Task(e),
            StatusError::Store(e) => ApiError::Store(e),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
            ApiError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Task(TaskError::WorkerUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Task(TaskError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Task(TaskError::UnknownHandler(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        }
        (status, Json(json!({ "Error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::fetch::testing::StaticSource;
    use crate::tasks::TaskBackend;
    use url::Url;

    pub fn state() -> AppState {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let scrape = ScrapeService::new(
            Arc::clone(&store),
            TaskBackend::new(),
            Arc::new(Arc::new(StaticSource::default())),
            Url::parse("https://quotes.example/").unwrap(),
        );
        AppState { store, scrape }
    }
}
