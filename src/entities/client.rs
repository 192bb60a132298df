use sea_orm::entity::prelude::*;

use super::{client_plan, contract, progress_entry};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "clients")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub level: String,
    pub active: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    ClientPlan,
    Contract,
    ProgressEntry,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::ClientPlan => Entity::has_many(client_plan::Entity).into(),
            Self::Contract => Entity::has_many(contract::Entity).into(),
            Self::ProgressEntry => Entity::has_many(progress_entry::Entity).into(),
        }
    }
}

impl Related<client_plan::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ClientPlan.def()
    }
}

impl Related<contract::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Contract.def()
    }
}

impl Related<progress_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProgressEntry.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
