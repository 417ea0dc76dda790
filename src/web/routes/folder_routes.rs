use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::entities::folder;
use crate::db::services::{self, FolderWithCounts};
use crate::web::models::{double_option, non_blank};
use crate::web::{AppError, AppState};

#[derive(Deserialize, Debug, Default)]
pub struct CreateFolderRequest {
    #[serde(default)]
    name: String,
    parent_id: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct UpdateFolderRequest {
    name: Option<String>,
    /// Absent keeps the parent; `null` or `""` moves the folder to the root.
    #[serde(default, deserialize_with = "double_option")]
    parent_id: Option<Option<String>>,
}

async fn list_folders_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<FolderWithCounts>>, AppError> {
    let folders = services::list_folders(&app_state.db_pool).await?;
    Ok(Json(folders))
}

async fn create_folder_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<CreateFolderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<folder::Model>), AppError> {
    let Json(payload) = payload?;
    let parent_id = non_blank(payload.parent_id);
    let folder =
        services::create_folder(&app_state.db_pool, &payload.name, parent_id.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(folder)))
}

async fn update_folder_handler(
    State(app_state): State<Arc<AppState>>,
    Path(folder_id): Path<String>,
    payload: Result<Json<UpdateFolderRequest>, JsonRejection>,
) -> Result<Json<folder::Model>, AppError> {
    let Json(payload) = payload?;
    let parent_id = payload.parent_id.map(non_blank);
    let folder = services::update_folder(
        &app_state.db_pool,
        &folder_id,
        payload.name.as_deref(),
        parent_id.as_ref().map(|p| p.as_deref()),
    )
    .await?;
    Ok(Json(folder))
}

async fn delete_folder_handler(
    State(app_state): State<Arc<AppState>>,
    Path(folder_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deletion = services::delete_folder(&app_state.db_pool, &folder_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "folders_deleted": deletion.folders_deleted,
        "designs_unfiled": deletion.designs_unfiled,
    })))
}

pub fn create_folders_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/folders", get(list_folders_handler).post(create_folder_handler))
        .route(
            "/api/folders/{folder_id}",
            put(update_folder_handler).delete(delete_folder_handler),
        )
}
