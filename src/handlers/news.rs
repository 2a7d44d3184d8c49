use crate::{
    AppState,
    auth::AuthUser,
    handlers::MANAGE_NEWS,
    models::{CreateNewsRequest, News, UpdateNewsRequest},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

const CATEGORIES: [&str; 3] = ["news", "activity", "announcement"];
const STATUSES: [&str; 2] = ["draft", "published"];

/// NewsFilter
///
/// Query parameters for GET /news. Both filters are exact matches.
#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NewsFilter {
    pub category: Option<String>,
    pub status: Option<String>,
}

fn valid_choice(value: Option<&str>, allowed: &[&str]) -> bool {
    value.is_none_or(|v| allowed.contains(&v))
}

/// list_news
///
/// [Public Route] News items ordered by display order.
#[utoipa::path(
    get,
    path = "/news",
    params(NewsFilter),
    responses((status = 200, description = "News items", body = [News]))
)]
pub async fn list_news(
    State(state): State<AppState>,
    Query(filter): Query<NewsFilter>,
) -> Result<Json<Vec<News>>, StatusCode> {
    Ok(Json(state.repo.list_news(filter.category, filter.status).await?))
}

/// get_news
#[utoipa::path(
    get,
    path = "/news/{id}",
    params(("id" = i32, Path, description = "News ID")),
    responses(
        (status = 200, description = "Found", body = News),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_news(State(state): State<AppState>, Path(id): Path<i32>) -> Result<Json<News>, StatusCode> {
    state.repo.get_news(id).await?.map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// create_news
///
/// [Authenticated Route] Requires `manage_news`. Items created as `published` get
/// `published_at` stamped immediately.
#[utoipa::path(
    post,
    path = "/news",
    request_body = CreateNewsRequest,
    responses(
        (status = 201, description = "Created", body = News),
        (status = 400, description = "Missing title/content or invalid category/status"),
        (status = 403, description = "Missing manage_news")
    )
)]
pub async fn create_news(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateNewsRequest>,
) -> Result<(StatusCode, Json<News>), StatusCode> {
    user.require_any(&state.authorizer(), &[MANAGE_NEWS]).await?;

    if payload.title.trim().is_empty() || payload.content.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !valid_choice(payload.category.as_deref(), &CATEGORIES) || !valid_choice(payload.status.as_deref(), &STATUSES) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let created = state.repo.create_news(payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// update_news
///
/// [Authenticated Route] Partial update; requires `manage_news`.
#[utoipa::path(
    put,
    path = "/news/{id}",
    params(("id" = i32, Path, description = "News ID")),
    request_body = UpdateNewsRequest,
    responses(
        (status = 200, description = "Updated", body = News),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_news(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateNewsRequest>,
) -> Result<Json<News>, StatusCode> {
    user.require_any(&state.authorizer(), &[MANAGE_NEWS]).await?;

    if !valid_choice(payload.category.as_deref(), &CATEGORIES) || !valid_choice(payload.status.as_deref(), &STATUSES) {
        return Err(StatusCode::BAD_REQUEST);
    }

    state
        .repo
        .update_news(id, payload)
        .await?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// delete_news
#[utoipa::path(
    delete,
    path = "/news/{id}",
    params(("id" = i32, Path, description = "News ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_news(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, StatusCode> {
    user.require_any(&state.authorizer(), &[MANAGE_NEWS]).await?;

    if state.repo.delete_news(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}
