use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    routing::get,
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServerConfig;
use crate::db::now_timestamp;

pub use error::AppError;
use routes::*;

pub mod error;
pub mod models;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DatabaseConnection,
}

async fn health_check_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "timestamp": now_timestamp() }))
}

pub fn create_axum_router(db_pool: DatabaseConnection, config: &ServerConfig) -> Router {
    let app_state = Arc::new(AppState { db_pool });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check_handler))
        .merge(design_routes::create_designs_router())
        .merge(folder_routes::create_folders_router())
        .merge(tag_routes::create_tags_router())
        .merge(search_routes::create_search_router())
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors)
}
