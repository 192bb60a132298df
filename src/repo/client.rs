use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, QueryOrder, Set};

use crate::entities::client;
use crate::error::AppError;
use crate::model::{ClientChanges, ClientInput};

pub async fn insert<C: ConnectionTrait>(db: &C, input: ClientInput) -> Result<client::Model, AppError> {
    let now = Utc::now();
    let active = client::ActiveModel {
        name: Set(input.name),
        email: Set(input.email),
        phone: Set(input.phone),
        level: Set(input.level.as_str().to_string()),
        active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let insert = client::Entity::insert(active).exec(db).await?;
    get(db, insert.last_insert_id)
        .await?
        .ok_or_else(|| AppError::NotFound("client not found after insert".to_string()))
}

pub async fn get<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<client::Model>, AppError> {
    Ok(client::Entity::find_by_id(id).one(db).await?)
}

pub async fn require<C: ConnectionTrait>(db: &C, id: i64) -> Result<client::Model, AppError> {
    get(db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("client id {id}")))
}

pub async fn list<C: ConnectionTrait>(db: &C) -> Result<Vec<client::Model>, AppError> {
    Ok(client::Entity::find()
        .order_by_asc(client::Column::Id)
        .all(db)
        .await?)
}

pub async fn update<C: ConnectionTrait>(
    db: &C,
    id: i64,
    changes: ClientChanges,
) -> Result<client::Model, AppError> {
    let mut active = client::ActiveModel {
        id: Set(id),
        ..Default::default()
    };
    if let Some(name) = changes.name {
        active.name = Set(name);
    }
    if let Some(email) = changes.email {
        active.email = Set(Some(email));
    }
    if let Some(phone) = changes.phone {
        active.phone = Set(Some(phone));
    }
    if let Some(level) = changes.level {
        active.level = Set(level.as_str().to_string());
    }
    if let Some(flag) = changes.active {
        active.active = Set(flag);
    }
    active.updated_at = Set(Utc::now());

    match active.update(db).await {
        Ok(model) => Ok(model),
        Err(sea_orm::DbErr::RecordNotFound(_)) | Err(sea_orm::DbErr::RecordNotUpdated) => {
            Err(AppError::NotFound(format!("client id {id}")))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn delete<C: ConnectionTrait>(db: &C, id: i64) -> Result<bool, AppError> {
    let result = client::Entity::delete_by_id(id).exec(db).await?;
    Ok(result.rows_affected > 0)
}
