use std::collections::{HashMap, HashSet};

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use tracing::info;

use super::ID_CHUNK;
use crate::db::entities::{design, folder};
use crate::db::{new_id, now_timestamp, StoreError};

const DEFAULT_FOLDER_NAME: &str = "New Folder";

/// A folder annotated with its direct (non-recursive) contents.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FolderWithCounts {
    #[serde(flatten)]
    pub folder: folder::Model,
    pub design_count: i64,
    pub subfolder_count: i64,
}

/// Outcome of a recursive folder delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderDeletion {
    pub folders_deleted: u64,
    pub designs_unfiled: u64,
}

/// Creates a folder, optionally nested under `parent_id`.
pub async fn create_folder(
    db: &DatabaseConnection,
    name: &str,
    parent_id: Option<&str>,
) -> Result<folder::Model, StoreError> {
    let name = match name.trim() {
        "" => DEFAULT_FOLDER_NAME,
        trimmed => trimmed,
    };

    let txn = db.begin().await?;
    if let Some(parent_id) = parent_id {
        if folder::Entity::find_by_id(parent_id).one(&txn).await?.is_none() {
            return Err(StoreError::invalid_reference(format!(
                "Parent folder {parent_id} not found"
            )));
        }
    }

    let now = now_timestamp();
    let created = folder::ActiveModel {
        id: Set(new_id()),
        name: Set(name.to_owned()),
        parent_id: Set(parent_id.map(str::to_owned)),
        created_at: Set(now.clone()),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    info!(folder_id = %created.id, parent_id = ?created.parent_id, "Folder created.");
    Ok(created)
}

/// Retrieves a folder by its ID.
pub async fn get_folder(db: &DatabaseConnection, folder_id: &str) -> Result<folder::Model, StoreError> {
    folder::Entity::find_by_id(folder_id)
        .one(db)
        .await?
        .ok_or_else(|| StoreError::not_found(format!("Folder {folder_id} not found")))
}

/// Lists every folder ordered by name, with direct design and subfolder counts.
pub async fn list_folders(db: &DatabaseConnection) -> Result<Vec<FolderWithCounts>, StoreError> {
    let folders = folder::Entity::find()
        .order_by_asc(folder::Column::Name)
        .all(db)
        .await?;

    let design_counts: HashMap<String, i64> = design::Entity::find()
        .select_only()
        .column(design::Column::FolderId)
        .column_as(Expr::col(design::Column::Id).count(), "count")
        .filter(design::Column::FolderId.is_not_null())
        .group_by(design::Column::FolderId)
        .into_tuple::<(Option<String>, i64)>()
        .all(db)
        .await?
        .into_iter()
        .filter_map(|(folder_id, count)| folder_id.map(|id| (id, count)))
        .collect();

    let subfolder_counts: HashMap<String, i64> = folder::Entity::find()
        .select_only()
        .column(folder::Column::ParentId)
        .column_as(Expr::col(folder::Column::Id).count(), "count")
        .filter(folder::Column::ParentId.is_not_null())
        .group_by(folder::Column::ParentId)
        .into_tuple::<(Option<String>, i64)>()
        .all(db)
        .await?
        .into_iter()
        .filter_map(|(parent_id, count)| parent_id.map(|id| (id, count)))
        .collect();

    Ok(folders
        .into_iter()
        .map(|folder| FolderWithCounts {
            design_count: design_counts.get(&folder.id).copied().unwrap_or(0),
            subfolder_count: subfolder_counts.get(&folder.id).copied().unwrap_or(0),
            folder,
        })
        .collect())
}

/// Renames and/or moves a folder.
///
/// `parent_id` is tri-state: `None` leaves the parent untouched, `Some(None)`
/// moves the folder to the root, `Some(Some(id))` moves it under `id`.
/// `updated_at` is refreshed even when no field changes.
pub async fn update_folder(
    db: &DatabaseConnection,
    folder_id: &str,
    name: Option<&str>,
    parent_id: Option<Option<&str>>,
) -> Result<folder::Model, StoreError> {
    let txn = db.begin().await?;
    let existing = folder::Entity::find_by_id(folder_id)
        .one(&txn)
        .await?
        .ok_or_else(|| StoreError::not_found(format!("Folder {folder_id} not found")))?;

    let mut active_model = existing.into_active_model();
    if let Some(name) = name {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::invalid_argument("Folder name must not be empty"));
        }
        active_model.name = Set(name.to_owned());
    }
    if let Some(new_parent) = parent_id {
        if let Some(new_parent) = new_parent {
            ensure_valid_parent(&txn, folder_id, new_parent).await?;
        }
        active_model.parent_id = Set(new_parent.map(str::to_owned));
    }
    active_model.updated_at = Set(now_timestamp());

    let updated = active_model.update(&txn).await?;
    txn.commit().await?;

    info!(folder_id = %updated.id, parent_id = ?updated.parent_id, "Folder updated.");
    Ok(updated)
}

/// Deletes a folder and its whole subtree.
///
/// Every design filed anywhere in the subtree is unfiled before any folder
/// row is removed; designs are never deleted. The walk and both mutations run
/// in a single transaction.
pub async fn delete_folder(
    db: &DatabaseConnection,
    folder_id: &str,
) -> Result<FolderDeletion, StoreError> {
    let txn = db.begin().await?;
    if folder::Entity::find_by_id(folder_id).one(&txn).await?.is_none() {
        return Err(StoreError::not_found(format!("Folder {folder_id} not found")));
    }

    let subtree = collect_subtree(&txn, folder_id).await?;

    let mut designs_unfiled = 0;
    for chunk in subtree.chunks(ID_CHUNK) {
        designs_unfiled += design::Entity::update_many()
            .col_expr(design::Column::FolderId, Expr::value(Option::<String>::None))
            .filter(design::Column::FolderId.is_in(chunk.to_vec()))
            .exec(&txn)
            .await?
            .rows_affected;
    }

    // Rows removed by the parent_id cascade are not counted by SQLite, so the
    // subtree size is reported instead of rows_affected.
    let folders_deleted = subtree.len() as u64;
    for chunk in subtree.chunks(ID_CHUNK) {
        folder::Entity::delete_many()
            .filter(folder::Column::Id.is_in(chunk.to_vec()))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    let deletion = FolderDeletion {
        folders_deleted,
        designs_unfiled,
    };
    info!(
        folder_id,
        folders_deleted, designs_unfiled, "Folder subtree deleted."
    );
    Ok(deletion)
}

/// Ids of `root` and every transitive subfolder, breadth first.
async fn collect_subtree<C: ConnectionTrait>(db: &C, root: &str) -> Result<Vec<String>, StoreError> {
    let mut seen: HashSet<String> = HashSet::from([root.to_owned()]);
    let mut subtree = vec![root.to_owned()];
    let mut frontier = vec![root.to_owned()];

    while !frontier.is_empty() {
        let mut children: Vec<String> = Vec::new();
        for chunk in frontier.chunks(ID_CHUNK) {
            let ids: Vec<String> = folder::Entity::find()
                .select_only()
                .column(folder::Column::Id)
                .filter(folder::Column::ParentId.is_in(chunk.to_vec()))
                .into_tuple()
                .all(db)
                .await?;
            children.extend(ids);
        }

        frontier = children
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        subtree.extend(frontier.iter().cloned());
    }

    Ok(subtree)
}

/// Rejects a parent that is missing, is the folder itself, or sits below it.
async fn ensure_valid_parent<C: ConnectionTrait>(
    db: &C,
    folder_id: &str,
    new_parent: &str,
) -> Result<(), StoreError> {
    if new_parent == folder_id {
        return Err(StoreError::CycleDetected(
            "Cannot move folder into itself".to_owned(),
        ));
    }

    let mut cursor = folder::Entity::find_by_id(new_parent)
        .one(db)
        .await?
        .ok_or_else(|| {
            StoreError::invalid_reference(format!("Parent folder {new_parent} not found"))
        })?
        .parent_id;

    let mut visited = HashSet::new();
    while let Some(ancestor) = cursor {
        if ancestor == folder_id {
            return Err(StoreError::CycleDetected(
                "Cannot move folder into one of its own subfolders".to_owned(),
            ));
        }
        if !visited.insert(ancestor.clone()) {
            break;
        }
        cursor = folder::Entity::find_by_id(ancestor.as_str())
            .one(db)
            .await?
            .and_then(|f| f.parent_id);
    }

    Ok(())
}
