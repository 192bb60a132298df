use sea_orm::DatabaseConnection;
use tempfile::TempDir;

use crate::db;
use crate::entities::{client, plan};
use crate::model::{ClientInput, Level, PlanInput};
use crate::repo;

pub async fn setup_db() -> (TempDir, DatabaseConnection) {
    let dir = TempDir::new().expect("temp dir");
    let db_path = db::resolve_db_path(dir.path());
    db::ensure_parent_dir(&db_path).expect("ensure parent");
    let db = db::connect(&db_path).await.expect("connect db");
    db::ensure_schema(&db).await.expect("ensure schema");
    (dir, db)
}

pub async fn client(db: &DatabaseConnection, level: Level) -> client::Model {
    repo::client::insert(
        db,
        ClientInput {
            name: "Client".to_string(),
            email: None,
            phone: None,
            level,
        },
    )
    .await
    .expect("insert client")
}

pub async fn plan(db: &DatabaseConnection, level: Level) -> plan::Model {
    repo::plan::insert(
        db,
        PlanInput {
            name: "Plan".to_string(),
            level,
        },
    )
    .await
    .expect("insert plan")
}
