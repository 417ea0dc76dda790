use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::services::{self, SearchQuery};
use crate::web::models::{split_csv, SearchHitResponse};
use crate::web::{AppError, AppState};

#[derive(Deserialize, Debug, Default)]
pub struct SearchParams {
    /// Name substring, matched as given. Whitespace-only means no name filter.
    q: Option<String>,
    /// Comma-separated tag names; a design must carry all of them.
    tags: Option<String>,
}

async fn search_handler(
    State(app_state): State<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Vec<SearchHitResponse>>, AppError> {
    let Query(params) = params?;
    let query = SearchQuery {
        q: params.q.filter(|q| !q.trim().is_empty()),
        tag_names: split_csv(params.tags.as_deref()),
    };
    let hits = services::search_designs(&app_state.db_pool, &query).await?;
    Ok(Json(hits.into_iter().map(SearchHitResponse::from).collect()))
}

pub fn create_search_router() -> Router<Arc<AppState>> {
    Router::new().route("/api/search", get(search_handler))
}
