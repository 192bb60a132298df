use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set};

use crate::entities::{client, client_plan, plan};
use crate::error::AppError;

pub async fn exists<C: ConnectionTrait>(db: &C, client_id: i64, plan_id: i64) -> Result<bool, AppError> {
    let count = client_plan::Entity::find()
        .filter(client_plan::Column::ClientId.eq(client_id))
        .filter(client_plan::Column::PlanId.eq(plan_id))
        .count(db)
        .await?;
    Ok(count > 0)
}

pub async fn link<C: ConnectionTrait>(
    db: &C,
    client_id: i64,
    plan_id: i64,
) -> Result<client_plan::Model, AppError> {
    let active = client_plan::ActiveModel {
        client_id: Set(client_id),
        plan_id: Set(plan_id),
        linked_at: Set(Utc::now()),
        ..Default::default()
    };
    let insert = client_plan::Entity::insert(active).exec(db).await?;
    client_plan::Entity::find_by_id(insert.last_insert_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("association not found after insert".to_string()))
}

/// Removes the link; `false` when there was none.
pub async fn unlink<C: ConnectionTrait>(db: &C, client_id: i64, plan_id: i64) -> Result<bool, AppError> {
    let result = client_plan::Entity::delete_many()
        .filter(client_plan::Column::ClientId.eq(client_id))
        .filter(client_plan::Column::PlanId.eq(plan_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

pub async fn links_for_client<C: ConnectionTrait>(
    db: &C,
    client_id: i64,
) -> Result<Vec<client_plan::Model>, AppError> {
    Ok(client_plan::Entity::find()
        .filter(client_plan::Column::ClientId.eq(client_id))
        .order_by_asc(client_plan::Column::Id)
        .all(db)
        .await?)
}

pub async fn links_for_plan<C: ConnectionTrait>(
    db: &C,
    plan_id: i64,
) -> Result<Vec<client_plan::Model>, AppError> {
    Ok(client_plan::Entity::find()
        .filter(client_plan::Column::PlanId.eq(plan_id))
        .order_by_asc(client_plan::Column::Id)
        .all(db)
        .await?)
}

/// Plans linked to the client, in link order.
pub async fn plans_for_client<C: ConnectionTrait>(
    db: &C,
    client_id: i64,
) -> Result<Vec<plan::Model>, AppError> {
    let links = links_for_client(db, client_id).await?;
    if links.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = links.iter().map(|link| link.plan_id).collect();
    let mut by_id: HashMap<i64, plan::Model> = plan::Entity::find()
        .filter(plan::Column::Id.is_in(ids.clone()))
        .all(db)
        .await?
        .into_iter()
        .map(|plan| (plan.id, plan))
        .collect();
    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
}

/// Clients linked to the plan, in link order.
pub async fn clients_for_plan<C: ConnectionTrait>(
    db: &C,
    plan_id: i64,
) -> Result<Vec<client::Model>, AppError> {
    let links = links_for_plan(db, plan_id).await?;
    if links.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = links.iter().map(|link| link.client_id).collect();
    let mut by_id: HashMap<i64, client::Model> = client::Entity::find()
        .filter(client::Column::Id.is_in(ids.clone()))
        .all(db)
        .await?
        .into_iter()
        .map(|client| (client.id, client))
        .collect();
    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
}
