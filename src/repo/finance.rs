use chrono::Utc;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::entities::financial_record;
use crate::error::AppError;
use crate::model::MovementInput;

pub async fn insert<C: ConnectionTrait>(
    db: &C,
    input: MovementInput,
) -> Result<financial_record::Model, AppError> {
    let active = financial_record::ActiveModel {
        kind: Set(input.kind.as_str().to_string()),
        amount_cents: Set(input.amount_cents),
        client_id: Set(input.client_id),
        contract_id: Set(input.contract_id),
        description: Set(input.description),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    let insert = financial_record::Entity::insert(active).exec(db).await?;
    financial_record::Entity::find_by_id(insert.last_insert_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("financial record not found after insert".to_string()))
}

pub async fn list<C: ConnectionTrait>(
    db: &C,
    client_id: Option<i64>,
) -> Result<Vec<financial_record::Model>, AppError> {
    let mut select = financial_record::Entity::find();
    if let Some(client_id) = client_id {
        select = select.filter(financial_record::Column::ClientId.eq(client_id));
    }
    Ok(select
        .order_by_asc(financial_record::Column::Id)
        .all(db)
        .await?)
}
