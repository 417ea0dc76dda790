//! Request and response shapes shared by the route modules.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::db::entities::tag;
use crate::db::services::{DesignWithTags, SearchHit};

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`). Use with `#[serde(default)]`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Treats an empty or blank id as "no id".
pub fn non_blank(id: Option<String>) -> Option<String> {
    id.filter(|id| !id.trim().is_empty())
}

/// Splits a comma-separated query parameter into its non-empty parts.
pub fn split_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_owned)
            .collect()
    })
    .unwrap_or_default()
}

/// A design as it travels over HTTP: the stored document text is sent back as
/// JSON.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DesignResponse {
    pub id: String,
    pub name: String,
    pub folder_id: Option<String>,
    pub document: Value,
    pub rendered_cache: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub tags: Vec<tag::Model>,
}

impl From<DesignWithTags> for DesignResponse {
    fn from(value: DesignWithTags) -> Self {
        let design = value.design;
        // Documents written by other clients may not be JSON; pass them through as text.
        let document = serde_json::from_str(&design.document)
            .unwrap_or_else(|_| Value::String(design.document.clone()));
        Self {
            id: design.id,
            name: design.name,
            folder_id: design.folder_id,
            document,
            rendered_cache: design.rendered_cache,
            created_at: design.created_at,
            updated_at: design.updated_at,
            tags: value.tags,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SearchHitResponse {
    #[serde(flatten)]
    pub design: DesignResponse,
    pub folder_name: Option<String>,
}

impl From<SearchHit> for SearchHitResponse {
    fn from(hit: SearchHit) -> Self {
        Self {
            design: hit.design.into(),
            folder_name: hit.folder_name,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub const OK: Self = Self { success: true };
}
