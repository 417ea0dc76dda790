use std::collections::{HashMap, HashSet};

use sea_orm::sea_query::{Expr, LikeExpr};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use tracing::debug;

use super::design_service::{attach_tags, designs_tagged_with_any, normalize_tag_names, DesignWithTags};
use super::ID_CHUNK;
use crate::db::entities::{design, folder};
use crate::db::StoreError;

/// Cross-folder search criteria.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Case-insensitive substring of the design name.
    pub q: Option<String>,
    /// Every name listed must be attached to a design for it to match.
    pub tag_names: Vec<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    #[serde(flatten)]
    pub design: DesignWithTags,
    pub folder_name: Option<String>,
}

/// `%q%` with LIKE wildcards in `q` escaped so they match literally.
fn contains_pattern(q: &str) -> String {
    let mut pattern = String::with_capacity(q.len() + 2);
    pattern.push('%');
    for ch in q.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn like_contains(q: &str) -> LikeExpr {
    LikeExpr::new(contains_pattern(q)).escape('\\')
}

/// Searches designs across all folders.
///
/// The name filter uses SQLite `LIKE`, which is case-insensitive for ASCII.
/// The tag filter is an intersection, unlike the union used by
/// [`super::design_service::list_designs`].
pub async fn search_designs(
    db: &DatabaseConnection,
    query: &SearchQuery,
) -> Result<Vec<SearchHit>, StoreError> {
    let mut select = design::Entity::find();

    if let Some(q) = query.q.as_deref().filter(|q| !q.trim().is_empty()) {
        select = select.filter(Expr::col((design::Entity, design::Column::Name)).like(like_contains(q)));
    }
    for name in normalize_tag_names(&query.tag_names) {
        select = select.filter(design::Column::Id.in_subquery(designs_tagged_with_any(&[name])));
    }

    let designs = select
        .order_by_desc(design::Column::UpdatedAt)
        .all(db)
        .await?;

    let folder_ids: Vec<String> = designs
        .iter()
        .filter_map(|d| d.folder_id.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let mut folder_names: HashMap<String, String> = HashMap::new();
    for chunk in folder_ids.chunks(ID_CHUNK) {
        let folders = folder::Entity::find()
            .filter(folder::Column::Id.is_in(chunk.to_vec()))
            .all(db)
            .await?;
        folder_names.extend(folders.into_iter().map(|f| (f.id, f.name)));
    }

    let hits: Vec<SearchHit> = attach_tags(db, designs)
        .await?
        .into_iter()
        .map(|design| SearchHit {
            folder_name: design
                .design
                .folder_id
                .as_ref()
                .and_then(|id| folder_names.get(id).cloned()),
            design,
        })
        .collect();

    debug!(?query, hits = hits.len(), "Search completed.");
    Ok(hits)
}
