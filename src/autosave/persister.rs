use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use tracing::debug;

use super::coordinator::{DocumentPersister, SaveError};
use crate::db::services::design_service::{self, DesignPatch};

/// Writes autosaved documents into one design row of the store.
#[derive(Debug, Clone)]
pub struct StorePersister {
    db: DatabaseConnection,
    design_id: String,
}

impl StorePersister {
    pub fn new(db: DatabaseConnection, design_id: impl Into<String>) -> Self {
        Self {
            db,
            design_id: design_id.into(),
        }
    }

    pub fn design_id(&self) -> &str {
        &self.design_id
    }
}

#[async_trait]
impl DocumentPersister for StorePersister {
    async fn persist(&self, document: String) -> Result<(), SaveError> {
        let patch = DesignPatch {
            document: Some(document),
            ..Default::default()
        };
        let updated = design_service::update_design(&self.db, &self.design_id, patch)
            .await
            .map_err(|e| SaveError::SaveFailed(e.to_string()))?;
        debug!(design_id = %updated.id, updated_at = %updated.updated_at, "Autosaved design.");
        Ok(())
    }
}
