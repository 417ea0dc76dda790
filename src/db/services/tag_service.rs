use std::collections::HashMap;

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use tracing::{debug, info};

use super::design_service::tag_name_matches;
use crate::db::entities::{design_tag, tag};
use crate::db::error::is_unique_violation;
use crate::db::{new_id, now_timestamp, StoreError};

pub const DEFAULT_TAG_COLOR: &str = "#6B7280";

/// A tag together with the number of designs carrying it.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TagWithCount {
    #[serde(flatten)]
    pub tag: tag::Model,
    pub usage_count: i64,
}

fn color_or_default(color: Option<&str>) -> String {
    match color.map(str::trim) {
        Some(color) if !color.is_empty() => color.to_owned(),
        _ => DEFAULT_TAG_COLOR.to_owned(),
    }
}

/// Creates a tag, or returns the existing one whose name matches
/// case-insensitively. The boolean is `true` when a new row was written.
///
/// An existing tag is returned unchanged; `color` is ignored for it.
pub async fn create_tag(
    db: &DatabaseConnection,
    name: &str,
    color: Option<&str>,
) -> Result<(tag::Model, bool), StoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::invalid_argument("Tag name is required"));
    }

    if let Some(existing) = find_tag_by_name(db, name).await? {
        return Ok((existing, false));
    }

    let inserted = tag::ActiveModel {
        id: Set(new_id()),
        name: Set(name.to_owned()),
        color: Set(color_or_default(color)),
        created_at: Set(now_timestamp()),
    }
    .insert(db)
    .await;

    match inserted {
        Ok(created) => {
            info!(tag_id = %created.id, name = %created.name, "Tag created.");
            Ok((created, true))
        }
        // Lost a race against a concurrent creator of the same name.
        Err(err) if is_unique_violation(&err) => find_tag_by_name(db, name)
            .await?
            .map(|existing| (existing, false))
            .ok_or_else(|| StoreError::Unexpected(err.to_string())),
        Err(err) => Err(err.into()),
    }
}

/// Retrieves all tags ordered by name, with their usage counts.
pub async fn list_tags(db: &DatabaseConnection) -> Result<Vec<TagWithCount>, StoreError> {
    let tags = tag::Entity::find()
        .order_by_asc(tag::Column::Name)
        .all(db)
        .await?;

    let usage: HashMap<String, i64> = design_tag::Entity::find()
        .select_only()
        .column(design_tag::Column::TagId)
        .column_as(Expr::col(design_tag::Column::DesignId).count(), "count")
        .group_by(design_tag::Column::TagId)
        .into_tuple::<(String, i64)>()
        .all(db)
        .await?
        .into_iter()
        .collect();

    Ok(tags
        .into_iter()
        .map(|tag| TagWithCount {
            usage_count: usage.get(&tag.id).copied().unwrap_or(0),
            tag,
        })
        .collect())
}

/// Renames and/or recolors a tag. With neither field supplied the tag is
/// returned as is.
pub async fn update_tag(
    db: &DatabaseConnection,
    tag_id: &str,
    name: Option<&str>,
    color: Option<&str>,
) -> Result<tag::Model, StoreError> {
    let txn = db.begin().await?;
    let existing = tag::Entity::find_by_id(tag_id)
        .one(&txn)
        .await?
        .ok_or_else(|| StoreError::not_found(format!("Tag {tag_id} not found")))?;

    if name.is_none() && color.is_none() {
        return Ok(existing);
    }

    let mut active_model = existing.into_active_model();
    if let Some(name) = name {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::invalid_argument("Tag name must not be empty"));
        }
        if let Some(other) = find_tag_by_name(&txn, name).await? {
            if other.id != tag_id {
                return Err(StoreError::Conflict(format!(
                    "A tag named '{}' already exists",
                    other.name
                )));
            }
        }
        active_model.name = Set(name.to_owned());
    }
    if let Some(color) = color {
        active_model.color = Set(color_or_default(Some(color)));
    }

    let updated = active_model.update(&txn).await?;
    txn.commit().await?;

    info!(tag_id = %updated.id, name = %updated.name, "Tag updated.");
    Ok(updated)
}

/// Deletes a tag and detaches it from every design.
pub async fn delete_tag(db: &DatabaseConnection, tag_id: &str) -> Result<(), StoreError> {
    let txn = db.begin().await?;
    let detached = design_tag::Entity::delete_many()
        .filter(design_tag::Column::TagId.eq(tag_id))
        .exec(&txn)
        .await?
        .rows_affected;
    let result = tag::Entity::delete_by_id(tag_id).exec(&txn).await?;
    if result.rows_affected == 0 {
        return Err(StoreError::not_found(format!("Tag {tag_id} not found")));
    }
    txn.commit().await?;

    info!(tag_id, detached, "Tag deleted.");
    Ok(())
}

/// Case-insensitive lookup by name.
pub async fn find_tag_by_name<C: ConnectionTrait>(
    db: &C,
    name: &str,
) -> Result<Option<tag::Model>, StoreError> {
    let found = tag::Entity::find()
        .filter(tag_name_matches(name.trim()))
        .one(db)
        .await?;
    debug!(name, found = found.is_some(), "Tag lookup by name.");
    Ok(found)
}
