use chrono::{NaiveDate, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::entities::progress_entry;
use crate::error::AppError;
use crate::model::ProgressInput;

pub async fn insert<C: ConnectionTrait>(
    db: &C,
    input: ProgressInput,
    date: NaiveDate,
) -> Result<progress_entry::Model, AppError> {
    let active = progress_entry::ActiveModel {
        client_id: Set(input.client_id),
        contract_id: Set(input.contract_id),
        date: Set(date),
        weight_kg: Set(input.weight_kg),
        body_fat_pct: Set(input.body_fat_pct),
        notes: Set(input.notes),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    let insert = progress_entry::Entity::insert(active).exec(db).await?;
    progress_entry::Entity::find_by_id(insert.last_insert_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("progress entry not found after insert".to_string()))
}

pub async fn find_by_contract<C: ConnectionTrait>(
    db: &C,
    contract_id: i64,
) -> Result<Vec<progress_entry::Model>, AppError> {
    Ok(progress_entry::Entity::find()
        .filter(progress_entry::Column::ContractId.eq(contract_id))
        .order_by_asc(progress_entry::Column::Date)
        .order_by_asc(progress_entry::Column::Id)
        .all(db)
        .await?)
}

pub async fn find_by_client<C: ConnectionTrait>(
    db: &C,
    client_id: i64,
) -> Result<Vec<progress_entry::Model>, AppError> {
    Ok(progress_entry::Entity::find()
        .filter(progress_entry::Column::ClientId.eq(client_id))
        .order_by_asc(progress_entry::Column::Date)
        .order_by_asc(progress_entry::Column::Id)
        .all(db)
        .await?)
}

pub async fn delete_by_contract<C: ConnectionTrait>(db: &C, contract_id: i64) -> Result<u64, AppError> {
    let result = progress_entry::Entity::delete_many()
        .filter(progress_entry::Column::ContractId.eq(contract_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

pub async fn delete<C: ConnectionTrait>(db: &C, id: i64) -> Result<bool, AppError> {
    let result = progress_entry::Entity::delete_by_id(id).exec(db).await?;
    Ok(result.rows_affected > 0)
}
