use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "folders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentId",
        to = "Column::Id",
        on_delete = "Cascade", // Subfolder rows go with their parent; designs are unfiled first.
        on_update = "Cascade"
    )]
    Parent,
    #[sea_orm(has_many = "super::design::Entity")]
    Design,
}

impl Related<super::design::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Design.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
