use chrono::Utc;
use sea_orm::{ConnectionTrait, EntityTrait, QueryOrder, Set};

use crate::entities::cascade_audit;
use crate::error::AppError;

#[derive(Clone, Debug)]
pub struct NewAudit {
    pub root_kind: String,
    pub root_id: i64,
    pub reason: String,
    pub mode: String,
    pub success: bool,
    pub details: String,
}

pub async fn insert<C: ConnectionTrait>(
    db: &C,
    input: NewAudit,
) -> Result<cascade_audit::Model, AppError> {
    let active = cascade_audit::ActiveModel {
        root_kind: Set(input.root_kind),
        root_id: Set(input.root_id),
        reason: Set(input.reason),
        mode: Set(input.mode),
        success: Set(input.success),
        details: Set(input.details),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    let insert = cascade_audit::Entity::insert(active).exec(db).await?;
    cascade_audit::Entity::find_by_id(insert.last_insert_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("cascade audit not found after insert".to_string()))
}

pub async fn list<C: ConnectionTrait>(db: &C) -> Result<Vec<cascade_audit::Model>, AppError> {
    Ok(cascade_audit::Entity::find()
        .order_by_asc(cascade_audit::Column::Id)
        .all(db)
        .await?)
}
