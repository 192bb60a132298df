use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, QueryOrder, Set};

use crate::entities::plan;
use crate::error::AppError;
use crate::model::{PlanInput, PlanState};

pub async fn insert<C: ConnectionTrait>(db: &C, input: PlanInput) -> Result<plan::Model, AppError> {
    let now = Utc::now();
    let active = plan::ActiveModel {
        name: Set(input.name),
        level: Set(input.level.as_str().to_string()),
        state: Set(PlanState::Active.as_str().to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let insert = plan::Entity::insert(active).exec(db).await?;
    get(db, insert.last_insert_id)
        .await?
        .ok_or_else(|| AppError::NotFound("plan not found after insert".to_string()))
}

pub async fn get<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<plan::Model>, AppError> {
    Ok(plan::Entity::find_by_id(id).one(db).await?)
}

pub async fn require<C: ConnectionTrait>(db: &C, id: i64) -> Result<plan::Model, AppError> {
    get(db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("plan id {id}")))
}

pub async fn list<C: ConnectionTrait>(db: &C) -> Result<Vec<plan::Model>, AppError> {
    Ok(plan::Entity::find()
        .order_by_asc(plan::Column::Id)
        .all(db)
        .await?)
}

pub async fn set_state<C: ConnectionTrait>(
    db: &C,
    id: i64,
    state: PlanState,
) -> Result<plan::Model, AppError> {
    let active = plan::ActiveModel {
        id: Set(id),
        state: Set(state.as_str().to_string()),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    match active.update(db).await {
        Ok(model) => Ok(model),
        Err(sea_orm::DbErr::RecordNotFound(_)) | Err(sea_orm::DbErr::RecordNotUpdated) => {
            Err(AppError::NotFound(format!("plan id {id}")))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn delete<C: ConnectionTrait>(db: &C, id: i64) -> Result<bool, AppError> {
    let result = plan::Entity::delete_by_id(id).exec(db).await?;
    Ok(result.rows_affected > 0)
}
