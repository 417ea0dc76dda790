//! Idempotent DDL for the library tables.

use sea_orm::{ConnectionTrait, DbErr};
use tracing::debug;

const SCHEMA: &[&str] = &[
    "PRAGMA foreign_keys = ON",
    r#"
    CREATE TABLE IF NOT EXISTS folders (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        parent_id TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY (parent_id) REFERENCES folders(id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS designs (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        folder_id TEXT,
        document TEXT NOT NULL DEFAULT '{}',
        rendered_cache TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY (folder_id) REFERENCES folders(id) ON DELETE SET NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE COLLATE NOCASE,
        color TEXT NOT NULL DEFAULT '#6B7280',
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS design_tags (
        design_id TEXT NOT NULL,
        tag_id TEXT NOT NULL,
        PRIMARY KEY (design_id, tag_id),
        FOREIGN KEY (design_id) REFERENCES designs(id) ON DELETE CASCADE,
        FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_designs_folder ON designs(folder_id)",
    "CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_id)",
    "CREATE INDEX IF NOT EXISTS idx_design_tags_design ON design_tags(design_id)",
    "CREATE INDEX IF NOT EXISTS idx_design_tags_tag ON design_tags(tag_id)",
];

/// Creates every table and index that does not exist yet.
pub async fn ensure_schema<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    for statement in SCHEMA {
        db.execute_unprepared(statement).await?;
    }
    debug!(statements = SCHEMA.len(), "Schema ensured.");
    Ok(())
}
