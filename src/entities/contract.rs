use sea_orm::entity::prelude::*;

use super::{client, plan, progress_entry};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "contracts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub client_id: i64,
    pub plan_id: i64,
    pub price_cents: i64,
    pub start_date: Date,
    pub end_date: Date,
    pub state: String,
    pub cancel_reason: Option<String>,
    pub renewed_from: Option<i64>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Client,
    Plan,
    ProgressEntry,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::Client => Entity::belongs_to(client::Entity)
                .from(Column::ClientId)
                .to(client::Column::Id)
                .into(),
            Self::Plan => Entity::belongs_to(plan::Entity)
                .from(Column::PlanId)
                .to(plan::Column::Id)
                .into(),
            Self::ProgressEntry => Entity::has_many(progress_entry::Entity).into(),
        }
    }
}

impl Related<client::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Client.def()
    }
}

impl Related<plan::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Plan.def()
    }
}

impl Related<progress_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProgressEntry.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
