use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "designs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub folder_id: Option<String>,
    /// Serialized editor document. Stored and returned verbatim.
    pub document: String,
    pub rendered_cache: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::folder::Entity",
        from = "Column::FolderId",
        to = "super::folder::Column::Id",
        on_delete = "SetNull", // Deleting a folder unfiles its designs, never deletes them
        on_update = "Cascade"
    )]
    Folder,
    #[sea_orm(has_many = "super::design_tag::Entity")]
    DesignTag,
}

impl Related<super::folder::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Folder.def()
    }
}

impl Related<super::tag::Entity> for Entity {
    fn to() -> RelationDef {
        super::design_tag::Relation::Tag.def()
    }
    fn via() -> Option<RelationDef> {
        Some(super::design_tag::Relation::Design.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
