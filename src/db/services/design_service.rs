use std::collections::{HashMap, HashSet};

use sea_orm::sea_query::{Condition, Expr, Func, OnConflict, Query, SelectStatement, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use tracing::{debug, info};

use super::ID_CHUNK;
use crate::db::entities::{design, design_tag, folder, tag};
use crate::db::{new_id, now_timestamp, StoreError};

pub const DEFAULT_DESIGN_NAME: &str = "Untitled Design";
pub const EMPTY_DOCUMENT: &str = "{}";

/// A design together with the tags attached to it.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DesignWithTags {
    #[serde(flatten)]
    pub design: design::Model,
    pub tags: Vec<tag::Model>,
}

/// Input for [`create_design`]; every field falls back to a default.
#[derive(Debug, Clone, Default)]
pub struct NewDesign {
    pub name: Option<String>,
    pub folder_id: Option<String>,
    pub document: Option<String>,
}

/// Partial update for [`update_design`]. `None` leaves a field untouched;
/// `rendered_cache: Some(None)` clears the cache.
#[derive(Debug, Clone, Default)]
pub struct DesignPatch {
    pub name: Option<String>,
    pub document: Option<String>,
    pub rendered_cache: Option<Option<String>>,
}

/// Dashboard listing filter. All present criteria must hold; `tag_names`
/// matches designs carrying *any* of the names.
#[derive(Debug, Clone, Default)]
pub struct DesignFilter {
    pub folder_id: Option<String>,
    pub unfiled_only: bool,
    pub tag_names: Vec<String>,
}

fn name_or_default(name: Option<&str>) -> String {
    match name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_owned(),
        _ => DEFAULT_DESIGN_NAME.to_owned(),
    }
}

/// Creates a new design, optionally filed into `folder_id`.
pub async fn create_design(
    db: &DatabaseConnection,
    new_design: NewDesign,
) -> Result<design::Model, StoreError> {
    let txn = db.begin().await?;
    if let Some(folder_id) = new_design.folder_id.as_deref() {
        ensure_folder_exists(&txn, folder_id).await?;
    }

    let now = now_timestamp();
    let created = design::ActiveModel {
        id: Set(new_id()),
        name: Set(name_or_default(new_design.name.as_deref())),
        folder_id: Set(new_design.folder_id),
        document: Set(new_design
            .document
            .unwrap_or_else(|| EMPTY_DOCUMENT.to_owned())),
        rendered_cache: Set(None),
        created_at: Set(now.clone()),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    info!(design_id = %created.id, folder_id = ?created.folder_id, "Design created.");
    Ok(created)
}

/// Retrieves a design and its tags.
pub async fn get_design(
    db: &DatabaseConnection,
    design_id: &str,
) -> Result<DesignWithTags, StoreError> {
    let design = find_design(db, design_id).await?;
    let mut with_tags = attach_tags(db, vec![design]).await?;
    with_tags
        .pop()
        .ok_or_else(|| StoreError::Unexpected("design vanished while loading tags".to_owned()))
}

/// Lists designs, most recently updated first.
pub async fn list_designs(
    db: &DatabaseConnection,
    filter: &DesignFilter,
) -> Result<Vec<DesignWithTags>, StoreError> {
    let mut query = design::Entity::find();

    if let Some(folder_id) = filter.folder_id.as_deref().filter(|id| !id.is_empty()) {
        query = query.filter(design::Column::FolderId.eq(folder_id));
    }
    if filter.unfiled_only {
        query = query.filter(design::Column::FolderId.is_null());
    }
    let tag_names = normalize_tag_names(&filter.tag_names);
    if !tag_names.is_empty() {
        query = query.filter(design::Column::Id.in_subquery(designs_tagged_with_any(&tag_names)));
    }

    let designs = query
        .order_by_desc(design::Column::UpdatedAt)
        .all(db)
        .await?;
    debug!(count = designs.len(), ?filter, "Listed designs.");
    attach_tags(db, designs).await
}

/// Applies a partial update. `updated_at` is always refreshed.
pub async fn update_design(
    db: &DatabaseConnection,
    design_id: &str,
    patch: DesignPatch,
) -> Result<design::Model, StoreError> {
    let txn = db.begin().await?;
    let mut active_model = find_design(&txn, design_id).await?.into_active_model();

    if let Some(name) = patch.name {
        active_model.name = Set(name_or_default(Some(&name)));
    }
    if let Some(document) = patch.document {
        active_model.document = Set(document);
    }
    if let Some(rendered_cache) = patch.rendered_cache {
        active_model.rendered_cache = Set(rendered_cache);
    }
    active_model.updated_at = Set(now_timestamp());

    let updated = active_model.update(&txn).await?;
    txn.commit().await?;

    debug!(design_id = %updated.id, "Design updated.");
    Ok(updated)
}

/// Files a design into `folder_id`, or unfiles it when `None`.
pub async fn move_design(
    db: &DatabaseConnection,
    design_id: &str,
    folder_id: Option<&str>,
) -> Result<design::Model, StoreError> {
    let txn = db.begin().await?;
    let mut active_model = find_design(&txn, design_id).await?.into_active_model();
    if let Some(folder_id) = folder_id {
        ensure_folder_exists(&txn, folder_id).await?;
    }

    active_model.folder_id = Set(folder_id.map(str::to_owned));
    active_model.updated_at = Set(now_timestamp());
    let moved = active_model.update(&txn).await?;
    txn.commit().await?;

    info!(design_id = %moved.id, folder_id = ?moved.folder_id, "Design moved.");
    Ok(moved)
}

/// Deletes a design. Its tag associations go with it.
pub async fn delete_design(db: &DatabaseConnection, design_id: &str) -> Result<(), StoreError> {
    let txn = db.begin().await?;
    design_tag::Entity::delete_many()
        .filter(design_tag::Column::DesignId.eq(design_id))
        .exec(&txn)
        .await?;
    let result = design::Entity::delete_by_id(design_id).exec(&txn).await?;
    if result.rows_affected == 0 {
        return Err(StoreError::not_found(format!("Design {design_id} not found")));
    }
    txn.commit().await?;

    info!(design_id, "Design deleted.");
    Ok(())
}

/// Associates a tag with a design. Adding an existing association is a no-op.
pub async fn add_tag_to_design(
    db: &DatabaseConnection,
    design_id: &str,
    tag_id: &str,
) -> Result<(), StoreError> {
    let txn = db.begin().await?;
    find_design(&txn, design_id).await?;
    if tag::Entity::find_by_id(tag_id).one(&txn).await?.is_none() {
        return Err(StoreError::invalid_reference(format!("Tag {tag_id} not found")));
    }

    let inserted = design_tag::Entity::insert(design_tag::ActiveModel {
        design_id: Set(design_id.to_owned()),
        tag_id: Set(tag_id.to_owned()),
    })
    .on_conflict(
        OnConflict::columns([design_tag::Column::DesignId, design_tag::Column::TagId])
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(&txn)
    .await?;
    txn.commit().await?;

    debug!(design_id, tag_id, inserted, "Tag attached to design.");
    Ok(())
}

/// Removes a tag from a design. Removing an absent association succeeds.
pub async fn remove_tag_from_design(
    db: &DatabaseConnection,
    design_id: &str,
    tag_id: &str,
) -> Result<(), StoreError> {
    let removed = design_tag::Entity::delete_many()
        .filter(design_tag::Column::DesignId.eq(design_id))
        .filter(design_tag::Column::TagId.eq(tag_id))
        .exec(db)
        .await?
        .rows_affected;

    debug!(design_id, tag_id, removed, "Tag detached from design.");
    Ok(())
}

async fn find_design<C: ConnectionTrait>(db: &C, design_id: &str) -> Result<design::Model, StoreError> {
    design::Entity::find_by_id(design_id)
        .one(db)
        .await?
        .ok_or_else(|| StoreError::not_found(format!("Design {design_id} not found")))
}

async fn ensure_folder_exists<C: ConnectionTrait>(db: &C, folder_id: &str) -> Result<(), StoreError> {
    match folder::Entity::find_by_id(folder_id).one(db).await? {
        Some(_) => Ok(()),
        None => Err(StoreError::invalid_reference(format!(
            "Folder {folder_id} not found"
        ))),
    }
}

/// Loads the tags of `designs` (one query per [`ID_CHUNK`] designs) and zips
/// them back on, preserving the order of `designs`.
pub(crate) async fn attach_tags<C: ConnectionTrait>(
    db: &C,
    designs: Vec<design::Model>,
) -> Result<Vec<DesignWithTags>, StoreError> {
    let ids: Vec<String> = designs.iter().map(|d| d.id.clone()).collect();
    let mut tags_by_design: HashMap<String, Vec<tag::Model>> = HashMap::new();

    for chunk in ids.chunks(ID_CHUNK) {
        let rows = design_tag::Entity::find()
            .filter(design_tag::Column::DesignId.is_in(chunk.to_vec()))
            .find_also_related(tag::Entity)
            .order_by_asc(tag::Column::Name)
            .all(db)
            .await?;

        for (link, tag) in rows {
            if let Some(tag) = tag {
                tags_by_design.entry(link.design_id).or_default().push(tag);
            }
        }
    }

    Ok(designs
        .into_iter()
        .map(|design| DesignWithTags {
            tags: tags_by_design.remove(&design.id).unwrap_or_default(),
            design,
        })
        .collect())
}

/// Trims, drops blanks and removes duplicates under ASCII case folding (the
/// folding SQLite's `lower()` and `NOCASE` apply), keeping the first spelling
/// seen.
pub(crate) fn normalize_tag_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_ascii_lowercase()))
        .map(str::to_owned)
        .collect()
}

/// Case-insensitive comparison of `tags.name` against `name`, mirroring the
/// column's NOCASE collation.
pub(crate) fn tag_name_matches(name: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col((tag::Entity, tag::Column::Name))))
        .eq(Func::lower(Expr::val(name.to_owned())))
}

/// Subquery selecting the ids of designs tagged with at least one of `names`.
pub(crate) fn designs_tagged_with_any(names: &[String]) -> SelectStatement {
    let any_name = names
        .iter()
        .fold(Condition::any(), |cond, name| cond.add(tag_name_matches(name)));

    Query::select()
        .column((design_tag::Entity, design_tag::Column::DesignId))
        .from(design_tag::Entity)
        .inner_join(
            tag::Entity,
            Expr::col((tag::Entity, tag::Column::Id))
                .equals((design_tag::Entity, design_tag::Column::TagId)),
        )
        .cond_where(any_name)
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::services::{folder_service, tag_service};
    use crate::db::{file_test_db, test_db};
    use sea_orm::PaginatorTrait;
    use std::time::Duration;

    async fn tagged_design(db: &DatabaseConnection, name: &str, tags: &[&str]) -> design::Model {
        let design = create_design(
            db,
            NewDesign {
                name: Some(name.to_owned()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        for tag_name in tags {
            let (tag, _) = tag_service::create_tag(db, tag_name, None).await.unwrap();
            add_tag_to_design(db, &design.id, &tag.id).await.unwrap();
        }
        design
    }

    #[tokio::test]
    async fn test_create_design_fills_defaults() {
        let db = test_db().await;
        let design = create_design(&db, NewDesign::default()).await.unwrap();

        assert_eq!(design.name, DEFAULT_DESIGN_NAME);
        assert_eq!(design.document, EMPTY_DOCUMENT);
        assert_eq!(design.folder_id, None);
        assert_eq!(design.rendered_cache, None);
        assert_eq!(design.created_at, design.updated_at);
    }

    #[tokio::test]
    async fn test_create_design_in_missing_folder_is_invalid_reference() {
        let db = test_db().await;
        let err = create_design(
            &db,
            NewDesign {
                folder_id: Some("ghost".to_owned()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn test_document_round_trips_verbatim() {
        let db = test_db().await;
        let document = r#"{"body":{"rows":[{"cells":[1,2]}]},"schemaVersion":16,"unicode":"héllo ✓"}"#;
        let created = create_design(
            &db,
            NewDesign {
                name: Some("Newsletter".to_owned()),
                document: Some(document.to_owned()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let loaded = get_design(&db, &created.id).await.unwrap();
        assert_eq!(loaded.design.document, document);
        assert_eq!(loaded.design.name, "Newsletter");
        assert!(loaded.tags.is_empty());
    }

    #[tokio::test]
    async fn test_update_only_touches_supplied_fields() {
        let db = test_db().await;
        let created = create_design(
            &db,
            NewDesign {
                name: Some("Original".to_owned()),
                document: Some(r#"{"v":1}"#.to_owned()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let with_cache = update_design(
            &db,
            &created.id,
            DesignPatch {
                rendered_cache: Some(Some("<html></html>".to_owned())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(with_cache.name, "Original");
        assert_eq!(with_cache.document, r#"{"v":1}"#);
        assert_eq!(with_cache.rendered_cache.as_deref(), Some("<html></html>"));

        let new_doc = update_design(
            &db,
            &created.id,
            DesignPatch {
                document: Some(r#"{"v":2}"#.to_owned()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(new_doc.document, r#"{"v":2}"#);
        assert_eq!(new_doc.rendered_cache.as_deref(), Some("<html></html>"));
        assert!(new_doc.updated_at >= with_cache.updated_at);

        let cleared = update_design(
            &db,
            &created.id,
            DesignPatch {
                rendered_cache: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(cleared.rendered_cache, None);
        assert_eq!(cleared.document, r#"{"v":2}"#);
    }

    #[tokio::test]
    async fn test_update_missing_design_is_not_found() {
        let db = test_db().await;
        let err = update_design(&db, "missing", DesignPatch::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_move_design_between_folders_and_unfile() {
        let db = test_db().await;
        let folder = folder_service::create_folder(&db, "Campaigns", None).await.unwrap();
        let design = create_design(&db, NewDesign::default()).await.unwrap();

        let moved = move_design(&db, &design.id, Some(&folder.id)).await.unwrap();
        assert_eq!(moved.folder_id.as_deref(), Some(folder.id.as_str()));

        let unfiled = move_design(&db, &design.id, None).await.unwrap();
        assert_eq!(unfiled.folder_id, None);

        let err = move_design(&db, &design.id, Some("ghost")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference(_)));
        let err = move_design(&db, "missing", None).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_adding_same_tag_twice_keeps_one_association() {
        let db = test_db().await;
        let design = create_design(&db, NewDesign::default()).await.unwrap();
        let (tag, _) = tag_service::create_tag(&db, "promo", None).await.unwrap();

        add_tag_to_design(&db, &design.id, &tag.id).await.unwrap();
        add_tag_to_design(&db, &design.id, &tag.id).await.unwrap();

        let links = design_tag::Entity::find()
            .filter(design_tag::Column::DesignId.eq(design.id.as_str()))
            .count(&db)
            .await
            .unwrap();
        assert_eq!(links, 1);
        assert_eq!(get_design(&db, &design.id).await.unwrap().tags, vec![tag]);
    }

    #[tokio::test]
    async fn test_removing_absent_tag_succeeds() {
        let db = test_db().await;
        let design = create_design(&db, NewDesign::default()).await.unwrap();
        remove_tag_from_design(&db, &design.id, "never-attached").await.unwrap();
    }

    #[tokio::test]
    async fn test_add_tag_rejects_unknown_design_and_tag() {
        let db = test_db().await;
        let design = create_design(&db, NewDesign::default()).await.unwrap();
        let (tag, _) = tag_service::create_tag(&db, "promo", None).await.unwrap();

        let err = add_tag_to_design(&db, "missing", &tag.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        let err = add_tag_to_design(&db, &design.id, "missing").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn test_delete_design_cascades_associations() {
        let db = test_db().await;
        let design = tagged_design(&db, "Doomed", &["a", "b"]).await;

        delete_design(&db, &design.id).await.unwrap();

        let links = design_tag::Entity::find().count(&db).await.unwrap();
        assert_eq!(links, 0);
        let err = get_design(&db, &design.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        let err = delete_design(&db, &design.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_tag_filter_is_union() {
        let db = test_db().await;
        let only_a = tagged_design(&db, "only a", &["a"]).await;
        let only_b = tagged_design(&db, "only b", &["b"]).await;
        let both = tagged_design(&db, "both", &["a", "b"]).await;
        tagged_design(&db, "neither", &["c"]).await;

        let filter = DesignFilter {
            tag_names: vec!["a".to_owned(), "B".to_owned()],
            ..Default::default()
        };
        let mut ids: Vec<String> = list_designs(&db, &filter)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.design.id)
            .collect();
        ids.sort();
        let mut expected = vec![only_a.id, only_b.id, both.id];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_list_orders_by_most_recently_updated() {
        let db = test_db().await;
        let first = create_design(&db, NewDesign::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = create_design(&db, NewDesign::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        update_design(
            &db,
            &first.id,
            DesignPatch {
                name: Some("touched".to_owned()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let ids: Vec<String> = list_designs(&db, &DesignFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.design.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_list_folder_and_unfiled_filters() {
        let db = test_db().await;
        let folder = folder_service::create_folder(&db, "Filed", None).await.unwrap();
        let filed = create_design(
            &db,
            NewDesign {
                folder_id: Some(folder.id.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let loose = create_design(&db, NewDesign::default()).await.unwrap();

        let in_folder = list_designs(
            &db,
            &DesignFilter {
                folder_id: Some(folder.id.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(in_folder.len(), 1);
        assert_eq!(in_folder[0].design.id, filed.id);

        let unfiled = list_designs(
            &db,
            &DesignFilter {
                unfiled_only: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(unfiled.len(), 1);
        assert_eq!(unfiled[0].design.id, loose.id);
    }

    #[test]
    fn test_normalize_tag_names() {
        let names = vec![
            " Promo ".to_owned(),
            "".to_owned(),
            "promo".to_owned(),
            "Sale".to_owned(),
        ];
        assert_eq!(normalize_tag_names(&names), vec!["Promo", "Sale"]);
    }

    #[test]
    fn test_normalize_tag_names_folds_ascii_case_only() {
        let names = vec![
            "Éclair".to_owned(),
            "éclair".to_owned(),
            "ÉCLAIR".to_owned(),
        ];
        // SQLite's lower() and NOCASE leave non-ASCII letters alone.
        assert_eq!(normalize_tag_names(&names), vec!["Éclair", "éclair"]);
    }

    #[tokio::test]
    async fn test_non_ascii_tag_names_filter_like_the_store() {
        let db = test_db().await;
        let upper = tagged_design(&db, "upper", &["Éclair"]).await;
        let lower = tagged_design(&db, "lower", &["éclair"]).await;

        let filter = DesignFilter {
            tag_names: vec!["Éclair".to_owned(), "éclair".to_owned()],
            ..Default::default()
        };
        let mut ids: Vec<String> = list_designs(&db, &filter)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.design.id)
            .collect();
        ids.sort();
        let mut expected = vec![upper.id, lower.id];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_list_designs_past_bound_variable_limit() {
        let db = test_db().await;
        let now = now_timestamp();
        let rows: Vec<design::ActiveModel> = (0..33_000)
            .map(|i| design::ActiveModel {
                id: Set(format!("bulk-{i:05}")),
                name: Set(format!("Bulk {i}")),
                folder_id: Set(None),
                document: Set(EMPTY_DOCUMENT.to_owned()),
                rendered_cache: Set(None),
                created_at: Set(now.clone()),
                updated_at: Set(now.clone()),
            })
            .collect();
        for batch in rows.chunks(1_000) {
            design::Entity::insert_many(batch.to_vec())
                .exec_without_returning(&db)
                .await
                .unwrap();
        }
        let (tag, _) = tag_service::create_tag(&db, "bulk", None).await.unwrap();
        add_tag_to_design(&db, "bulk-32999", &tag.id).await.unwrap();

        let listed = list_designs(&db, &DesignFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 33_000);
        let tagged: Vec<&DesignWithTags> = listed.iter().filter(|d| !d.tags.is_empty()).collect();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].design.id, "bulk-32999");
        assert_eq!(tagged[0].tags, vec![tag]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_updates_on_file_database_all_commit() {
        let (_tmp, db) = file_test_db().await;
        let mut ids = Vec::new();
        for i in 0..16 {
            let design = create_design(
                &db,
                NewDesign {
                    name: Some(format!("Design {i}")),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
            ids.push(design.id);
        }

        let handles: Vec<_> = (0..80)
            .map(|round| {
                let db = db.clone();
                let id = ids[round % ids.len()].clone();
                tokio::spawn(async move {
                    let patch = DesignPatch {
                        document: Some(format!(r#"{{"round":{round}}}"#)),
                        ..Default::default()
                    };
                    update_design(&db, &id, patch).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for id in &ids {
            let design = get_design(&db, id).await.unwrap().design;
            assert!(design.document.starts_with(r#"{"round":"#));
            assert!(design.updated_at > design.created_at);
        }
    }
}
