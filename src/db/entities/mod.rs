//! SeaORM entities for the four library tables.
//!
//! Each entity lives in its own module; the schema they map to is created by
//! [`crate::db::schema::ensure_schema`].

pub mod design;
pub mod design_tag;
pub mod folder;
pub mod tag;
