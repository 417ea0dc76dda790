//! High-level data access for the design library.
//!
//! Each sub-module owns one entity (folders, designs, tags) or one cross-cutting
//! query (search). Handlers and the autosave persister call these functions and
//! never build queries themselves. Public items are re-exported here so callers
//! can use `crate::db::services::*`.

pub mod design_service;
pub mod folder_service;
pub mod search_service;
pub mod tag_service;

/// Most ids bound into a single `IN (...)` list. SQLite rejects statements with
/// more than 32766 bound variables, so longer id lists are queried in chunks.
pub(crate) const ID_CHUNK: usize = 500;

pub use design_service::*;
pub use folder_service::*;
pub use search_service::*;
pub use tag_service::*;
