use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::db::services::{self, DesignFilter, DesignPatch, DesignWithTags, NewDesign};
use crate::web::models::{double_option, non_blank, split_csv, DesignResponse, SuccessResponse};
use crate::web::{AppError, AppState};

// --- Request/Response Structs ---

#[derive(Deserialize, Debug, Default)]
pub struct ListDesignsQuery {
    folder_id: Option<String>,
    /// Comma-separated tag names; a design matches if it carries any of them.
    tag: Option<String>,
    unfiled: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
pub struct CreateDesignRequest {
    name: Option<String>,
    folder_id: Option<String>,
    document: Option<Value>,
}

#[derive(Deserialize, Debug, Default)]
pub struct UpdateDesignRequest {
    name: Option<String>,
    document: Option<Value>,
    #[serde(default, deserialize_with = "double_option")]
    rendered_cache: Option<Option<String>>,
}

#[derive(Deserialize, Debug, Default)]
pub struct MoveDesignRequest {
    folder_id: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct AddTagRequest {
    tag_id: String,
}

// --- Route Handlers ---

async fn list_designs_handler(
    State(app_state): State<Arc<AppState>>,
    query: Result<Query<ListDesignsQuery>, QueryRejection>,
) -> Result<Json<Vec<DesignResponse>>, AppError> {
    let Query(query) = query?;
    let filter = DesignFilter {
        folder_id: non_blank(query.folder_id),
        unfiled_only: query.unfiled.unwrap_or(false),
        tag_names: split_csv(query.tag.as_deref()),
    };
    let designs = services::list_designs(&app_state.db_pool, &filter).await?;
    Ok(Json(designs.into_iter().map(DesignResponse::from).collect()))
}

async fn create_design_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<CreateDesignRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DesignResponse>), AppError> {
    let Json(payload) = payload?;
    let design = services::create_design(
        &app_state.db_pool,
        NewDesign {
            name: payload.name,
            folder_id: non_blank(payload.folder_id),
            document: payload.document.map(|doc| doc.to_string()),
        },
    )
    .await?;
    let created = DesignWithTags {
        design,
        tags: Vec::new(),
    };
    Ok((StatusCode::CREATED, Json(created.into())))
}

async fn get_design_handler(
    State(app_state): State<Arc<AppState>>,
    Path(design_id): Path<String>,
) -> Result<Json<DesignResponse>, AppError> {
    let design = services::get_design(&app_state.db_pool, &design_id).await?;
    Ok(Json(design.into()))
}

async fn update_design_handler(
    State(app_state): State<Arc<AppState>>,
    Path(design_id): Path<String>,
    payload: Result<Json<UpdateDesignRequest>, JsonRejection>,
) -> Result<Json<DesignResponse>, AppError> {
    let Json(payload) = payload?;
    let patch = DesignPatch {
        name: payload.name,
        document: payload.document.map(|doc| doc.to_string()),
        rendered_cache: payload.rendered_cache,
    };
    services::update_design(&app_state.db_pool, &design_id, patch).await?;
    let design = services::get_design(&app_state.db_pool, &design_id).await?;
    Ok(Json(design.into()))
}

async fn delete_design_handler(
    State(app_state): State<Arc<AppState>>,
    Path(design_id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    services::delete_design(&app_state.db_pool, &design_id).await?;
    Ok(Json(SuccessResponse::OK))
}

async fn move_design_handler(
    State(app_state): State<Arc<AppState>>,
    Path(design_id): Path<String>,
    payload: Result<Json<MoveDesignRequest>, JsonRejection>,
) -> Result<Json<DesignResponse>, AppError> {
    let Json(payload) = payload?;
    let folder_id = non_blank(payload.folder_id);
    services::move_design(&app_state.db_pool, &design_id, folder_id.as_deref()).await?;
    let design = services::get_design(&app_state.db_pool, &design_id).await?;
    Ok(Json(design.into()))
}

async fn add_tag_handler(
    State(app_state): State<Arc<AppState>>,
    Path(design_id): Path<String>,
    payload: Result<Json<AddTagRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, AppError> {
    let Json(payload) = payload?;
    services::add_tag_to_design(&app_state.db_pool, &design_id, &payload.tag_id).await?;
    Ok(Json(SuccessResponse::OK))
}

async fn remove_tag_handler(
    State(app_state): State<Arc<AppState>>,
    Path((design_id, tag_id)): Path<(String, String)>,
) -> Result<Json<SuccessResponse>, AppError> {
    services::remove_tag_from_design(&app_state.db_pool, &design_id, &tag_id).await?;
    Ok(Json(SuccessResponse::OK))
}

// --- Router ---

pub fn create_designs_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/designs", get(list_designs_handler).post(create_design_handler))
        .route(
            "/api/designs/{design_id}",
            get(get_design_handler)
                .put(update_design_handler)
                .delete(delete_design_handler),
        )
        .route("/api/designs/{design_id}/move", put(move_design_handler))
        .route("/api/designs/{design_id}/tags", post(add_tag_handler))
        .route("/api/designs/{design_id}/tags/{tag_id}", delete(remove_tag_handler))
}
