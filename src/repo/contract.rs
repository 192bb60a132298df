use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::contract;
use crate::error::AppError;
use crate::model::{ContractQuery, ContractState};

#[derive(Clone, Debug)]
pub struct NewContract {
    pub client_id: i64,
    pub plan_id: i64,
    pub price_cents: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub renewed_from: Option<i64>,
}

pub async fn insert<C: ConnectionTrait>(db: &C, input: NewContract) -> Result<contract::Model, AppError> {
    let now = Utc::now();
    let active = contract::ActiveModel {
        client_id: Set(input.client_id),
        plan_id: Set(input.plan_id),
        price_cents: Set(input.price_cents),
        start_date: Set(input.start_date),
        end_date: Set(input.end_date),
        state: Set(ContractState::Active.as_str().to_string()),
        cancel_reason: Set(None),
        renewed_from: Set(input.renewed_from),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let insert = contract::Entity::insert(active).exec(db).await?;
    get(db, insert.last_insert_id)
        .await?
        .ok_or_else(|| AppError::NotFound("contract not found after insert".to_string()))
}

pub async fn get<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<contract::Model>, AppError> {
    Ok(contract::Entity::find_by_id(id).one(db).await?)
}

pub async fn require<C: ConnectionTrait>(db: &C, id: i64) -> Result<contract::Model, AppError> {
    get(db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("contract id {id}")))
}

pub async fn find_active_by_client_and_plan<C: ConnectionTrait>(
    db: &C,
    client_id: i64,
    plan_id: i64,
) -> Result<Option<contract::Model>, AppError> {
    Ok(contract::Entity::find()
        .filter(contract::Column::ClientId.eq(client_id))
        .filter(contract::Column::PlanId.eq(plan_id))
        .filter(contract::Column::State.eq(ContractState::Active.as_str()))
        .one(db)
        .await?)
}

pub async fn find_by_client<C: ConnectionTrait>(
    db: &C,
    client_id: i64,
) -> Result<Vec<contract::Model>, AppError> {
    list(
        db,
        &ContractQuery {
            client_id: Some(client_id),
            ..Default::default()
        },
    )
    .await
}

pub async fn find_by_plan<C: ConnectionTrait>(
    db: &C,
    plan_id: i64,
) -> Result<Vec<contract::Model>, AppError> {
    list(
        db,
        &ContractQuery {
            plan_id: Some(plan_id),
            ..Default::default()
        },
    )
    .await
}

pub async fn list<C: ConnectionTrait>(
    db: &C,
    query: &ContractQuery,
) -> Result<Vec<contract::Model>, AppError> {
    let mut select = contract::Entity::find();
    if let Some(client_id) = query.client_id {
        select = select.filter(contract::Column::ClientId.eq(client_id));
    }
    if let Some(plan_id) = query.plan_id {
        select = select.filter(contract::Column::PlanId.eq(plan_id));
    }
    if let Some(state) = query.state {
        select = select.filter(contract::Column::State.eq(state.as_str()));
    }
    Ok(select.order_by_asc(contract::Column::Id).all(db).await?)
}

/// Active contracts whose end date is before `today`.
pub async fn find_expired<C: ConnectionTrait>(
    db: &C,
    today: NaiveDate,
) -> Result<Vec<contract::Model>, AppError> {
    Ok(contract::Entity::find()
        .filter(contract::Column::State.eq(ContractState::Active.as_str()))
        .filter(contract::Column::EndDate.lt(today))
        .order_by_asc(contract::Column::Id)
        .all(db)
        .await?)
}

pub async fn set_state<C: ConnectionTrait>(
    db: &C,
    id: i64,
    state: ContractState,
    reason: Option<String>,
) -> Result<contract::Model, AppError> {
    let mut active = contract::ActiveModel {
        id: Set(id),
        state: Set(state.as_str().to_string()),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    if let Some(reason) = reason {
        active.cancel_reason = Set(Some(reason));
    }
    match active.update(db).await {
        Ok(model) => Ok(model),
        Err(sea_orm::DbErr::RecordNotFound(_)) | Err(sea_orm::DbErr::RecordNotUpdated) => {
            Err(AppError::NotFound(format!("contract id {id}")))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn delete<C: ConnectionTrait>(db: &C, id: i64) -> Result<bool, AppError> {
    let result = contract::Entity::delete_by_id(id).exec(db).await?;
    Ok(result.rows_affected > 0)
}
