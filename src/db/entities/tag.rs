use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tags")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    // Unique under case-insensitive comparison (COLLATE NOCASE in the schema).
    #[sea_orm(unique)]
    pub name: String,
    pub color: String,
    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::design_tag::Entity")]
    DesignTag,
}

impl Related<super::design::Entity> for Entity {
    fn to() -> RelationDef {
        super::design_tag::Relation::Design.def()
    }
    fn via() -> Option<RelationDef> {
        Some(super::design_tag::Relation::Tag.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
