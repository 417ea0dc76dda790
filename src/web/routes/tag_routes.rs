use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::entities::tag;
use crate::db::services::{self, TagWithCount};
use crate::web::models::SuccessResponse;
use crate::web::{AppError, AppState};

// --- Request/Response Structs ---

#[derive(Deserialize, Debug, Default)]
pub struct CreateTagRequest {
    #[serde(default)]
    name: String,
    color: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct UpdateTagRequest {
    name: Option<String>,
    color: Option<String>,
}

// --- Route Handlers ---

/// Answers 201 for a new tag and 200 when a tag with that name already existed.
async fn create_tag_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<CreateTagRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<tag::Model>), AppError> {
    let Json(payload) = payload?;
    let (tag, created) =
        services::create_tag(&app_state.db_pool, &payload.name, payload.color.as_deref()).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(tag)))
}

async fn list_tags_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<TagWithCount>>, AppError> {
    let tags = services::list_tags(&app_state.db_pool).await?;
    Ok(Json(tags))
}

async fn update_tag_handler(
    State(app_state): State<Arc<AppState>>,
    Path(tag_id): Path<String>,
    payload: Result<Json<UpdateTagRequest>, JsonRejection>,
) -> Result<Json<tag::Model>, AppError> {
    let Json(payload) = payload?;
    let tag = services::update_tag(
        &app_state.db_pool,
        &tag_id,
        payload.name.as_deref(),
        payload.color.as_deref(),
    )
    .await?;
    Ok(Json(tag))
}

async fn delete_tag_handler(
    State(app_state): State<Arc<AppState>>,
    Path(tag_id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    services::delete_tag(&app_state.db_pool, &tag_id).await?;
    Ok(Json(SuccessResponse::OK))
}

// --- Router ---

pub fn create_tags_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tags", get(list_tags_handler).post(create_tag_handler))
        .route("/api/tags/{tag_id}", put(update_tag_handler).delete(delete_tag_handler))
}
