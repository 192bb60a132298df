use sea_orm::entity::prelude::*;

use super::{client_plan, contract};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "plans")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub level: String,
    pub state: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    ClientPlan,
    Contract,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::ClientPlan => Entity::has_many(client_plan::Entity).into(),
            Self::Contract => Entity::has_many(contract::Entity).into(),
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

impl ActiveModelBehavior for ActiveModel {}
