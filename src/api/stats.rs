use axum::extract::State;
use axum::Json;

use super::{ApiResult, AppState};
use crate::stats::{catalog_stats, CatalogStats};

pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<CatalogStats>> {
    Ok(Json(catalog_stats(&state.store)?))
}
