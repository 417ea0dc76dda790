use chrono::{SecondsFormat, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use tracing::info;
use uuid::Uuid;

pub mod entities;
pub mod error;
pub mod schema;
pub mod services;

pub use error::StoreError;

/// Opens the database at `database_url` and makes sure the schema exists.
///
/// The pool holds one connection and transactions queue on it. With several
/// connections, a deferred transaction upgrading to a write lock fails with
/// `SQLITE_BUSY` instead of waiting. File-backed databases use WAL.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let in_memory = database_url.contains(":memory:");
    let mut opt = ConnectOptions::new(database_url.to_owned());
    opt.max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;
    if !in_memory {
        db.execute_unprepared("PRAGMA journal_mode = WAL").await?;
    }
    schema::ensure_schema(&db).await?;
    info!(in_memory, "Database connected and schema ensured.");
    Ok(db)
}

/// Fresh opaque identifier for a new row.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC time as a fixed-width RFC 3339 string, so that lexical order is
/// chronological order.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
pub(crate) async fn test_db() -> DatabaseConnection {
    connect("sqlite::memory:").await.unwrap()
}

/// File-backed database in a temporary directory. Keep the `TempDir` alive for
/// as long as the connection is used.
#[cfg(test)]
pub(crate) async fn file_test_db() -> (tempfile::TempDir, DatabaseConnection) {
    let tmp = tempfile::TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", tmp.path().join("library.db").display());
    let db = connect(&url).await.unwrap();
    (tmp, db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, Statement};

    #[test]
    fn test_timestamps_sort_chronologically() {
        let earlier = now_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let later = now_timestamp();
        assert_eq!(earlier.len(), later.len());
        assert!(earlier < later);
        assert!(earlier.ends_with('Z'));
    }

    #[test]
    fn test_new_ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }

    #[tokio::test]
    async fn test_connect_is_idempotent_on_existing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", tmp.path().join("lib.db").display());

        let first = connect(&url).await.unwrap();
        first.close().await.unwrap();
        let second = connect(&url).await.unwrap();
        second.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_database_uses_wal() {
        let (_tmp, db) = file_test_db().await;
        let row = db
            .query_one(Statement::from_string(DbBackend::Sqlite, "PRAGMA journal_mode"))
            .await
            .unwrap()
            .unwrap();
        let mode: String = row.try_get("", "journal_mode").unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
