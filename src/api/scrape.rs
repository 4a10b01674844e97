use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiResult, AppState};
use crate::models::ScheduledTask;
use crate::service::ScrapeStatus;
use crate::tasks::TaskId;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerQuery {
    #[serde(default)]
    pub single_page: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScheduledQuery {
    pub kind: Option<String>,
}

pub async fn trigger(
    State(state): State<AppState>,
    Query(query): Query<TriggerQuery>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let task_id = state.scrape.trigger_scrape(query.single_page)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "taskId": task_id }))))
}

pub async fn status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<ScrapeStatus>> {
    Ok(Json(state.scrape.get_scrape_status(&TaskId(task_id))?))
}

pub async fn scheduled(
    State(state): State<AppState>,
    Query(query): Query<ScheduledQuery>,
) -> ApiResult<Json<Vec<ScheduledTask>>> {
    Ok(Json(state.scrape.list_scheduled_tasks(query.kind.as_deref())?))
}
