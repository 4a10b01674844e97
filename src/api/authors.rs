use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::{ApiError, ApiResult, AppState};
use crate::db::{AuthorPatch, NewAuthor};
use crate::models::{Actor, Author};

#[derive(Debug, Deserialize)]
pub struct CreateAuthor {
    pub name: String,
    pub dob: NaiveDate,
    pub country: String,
    pub description: String,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAuthor {
    pub name: Option<String>,
    pub dob: Option<NaiveDate>,
    pub country: Option<String>,
    pub description: Option<String>,
}

fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Author>>> {
    Ok(Json(state.store.list_authors()?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateAuthor>,
) -> ApiResult<(StatusCode, Json<Author>)> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".into()));
    }
    let password = body.password.as_deref().map(hash_password);
    let id = state.store.insert_author(&NewAuthor {
        name,
        dob: Some(body.dob),
        country: Some(body.country.trim()),
        description: Some(body.description.trim()),
        password: password.as_deref(),
        scrape_id: None,
        actor: Actor::Author,
    })?;
    Ok((StatusCode::CREATED, Json(state.store.get_author(id)?)))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Author>> {
    Ok(Json(state.store.get_author(id)?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateAuthor>,
) -> ApiResult<Json<Author>> {
    if body.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::BadRequest("name must not be empty".into()));
    }
    let patch = AuthorPatch {
        name: body.name.map(|n| n.trim().to_string()),
        dob: body.dob,
        country: body.country,
        description: body.description,
    };
    state.store.update_author(id, &patch)?;
    Ok(Json(state.store.get_author(id)?))
}

/// Removes the author and every quote attributed to it.
pub async fn delete(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    state.store.delete_author(id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing;
    use crate::db::NewQuote;
    use crate::models::AuthorRef;

    fn body(name: &str) -> CreateAuthor {
        CreateAuthor {
            name: name.into(),
            dob: NaiveDate::from_ymd_opt(1854, 10, 16).unwrap(),
            country: "Ireland".into(),
            description: "Playwright.".into(),
            password: Some("secret".into()),
        }
    }

    #[test]
    fn password_is_hex_digest() {
        let digest = hash_password("secret");
        assert_eq!(digest.len(), 64);
        assert_ne!(digest, "secret");
    }

    #[tokio::test]
    async fn duplicate_name_conflicts() {
        let state = testing::state();
        let (status, Json(author)) = create(State(state.clone()), Json(body("Oscar Wilde")))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(author.created_by, Actor::Author);
        let stored = state.store.get_author(author.id).unwrap();
        assert_eq!(stored.password.as_deref(), Some(hash_password("secret").as_str()));

        let err = create(State(state), Json(body("Oscar Wilde"))).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let state = testing::state();
        let (_, Json(author)) = create(State(state.clone()), Json(body("Oscar Wilde")))
            .await
            .unwrap();
        let Json(updated) = update(
            State(state),
            Path(author.id),
            Json(UpdateAuthor {
                country: Some("United Kingdom".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.country.as_deref(), Some("United Kingdom"));
        assert_eq!(updated.description.as_deref(), Some("Playwright."));
        assert_eq!(updated.updated_by, Actor::Author);
    }

    #[tokio::test]
    async fn delete_takes_quotes_along() {
        let state = testing::state();
        let (_, Json(author)) = create(State(state.clone()), Json(body("Oscar Wilde")))
            .await
            .unwrap();
        state
            .store
            .insert_quote(&NewQuote {
                text: "Be yourself.",
                tags: &[],
                author: AuthorRef::Author(author.id),
                actor: Actor::Author,
            })
            .unwrap();

        delete(State(state.clone()), Path(author.id)).await.unwrap();
        assert_eq!(state.store.count_all_quotes().unwrap(), 0);
        let err = delete(State(state), Path(author.id)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
