use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "cascade_audits")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub root_kind: String,
    pub root_id: i64,
    pub reason: String,
    pub mode: String,
    pub success: bool,
    pub details: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match *self {}
    }
}

impl ActiveModelBehavior for ActiveModel {}
