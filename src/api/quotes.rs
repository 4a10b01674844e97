use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::{ApiError, ApiResult, AppState};
use crate::db::{NewQuote, QuotePatch};
use crate::models::{Actor, AuthorRef, Quote};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Comma separated.
    pub tags: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuote {
    pub quote: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub author: Option<i64>,
    pub scraped_author: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuote {
    pub quote: Option<String>,
    pub tags: Option<Vec<String>>,
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Quote>>> {
    let tags = query.tags.as_deref().map(split_tags).unwrap_or_default();
    let quotes = if tags.is_empty() {
        state.store.list_quotes()?
    } else {
        state.store.list_quotes_by_tags(&tags)?
    };
    Ok(Json(quotes))
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateQuote>,
) -> ApiResult<(StatusCode, Json<Quote>)> {
    let text = body.quote.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("quote must not be empty".into()));
    }
    let author = match (body.author, body.scraped_author) {
        (Some(id), None) => {
            state.store.get_author(id)?;
            AuthorRef::Author(id)
        }
        (None, Some(id)) => {
            state.store.get_scraped_author(id)?;
            AuthorRef::ScrapedAuthor(id)
        }
        _ => {
            return Err(ApiError::BadRequest(
                "exactly one of author or scrapedAuthor is required".into(),
            ))
        }
    };

    let id = state.store.insert_quote(&NewQuote {
        text,
        tags: &body.tags,
        author,
        actor: Actor::Author,
    })?;
    Ok((StatusCode::CREATED, Json(state.store.get_quote(id)?)))
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Quote>> {
    Ok(Json(state.store.get_quote(id)?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateQuote>,
) -> ApiResult<Json<Quote>> {
    if body.quote.as_deref().is_some_and(|q| q.trim().is_empty()) {
        return Err(ApiError::BadRequest("quote must not be empty".into()));
    }
    let patch = QuotePatch {
        text: body.quote.map(|q| q.trim().to_string()),
        tags: body.tags,
    };
    state.store.update_quote(id, &patch)?;
    Ok(Json(state.store.get_quote(id)?))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    state.store.delete_quote(id)?;
    Ok(StatusCode::NO_CONTENT)
}
