use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use sea_orm::sea_query::Index;
use sea_orm::{
    ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Schema, Statement,
    TransactionTrait,
};
use url::Url;

use crate::entities::{
    cascade_audit, client, client_plan, contract, financial_record, plan, progress_entry,
};
use crate::error::AppError;

pub fn resolve_db_path(home: &Path) -> PathBuf {
    home.join("gymledger.db")
}

pub fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn open_lock(path: &Path) -> Result<fd_lock::RwLock<File>, AppError> {
    let lock_path = path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path)?;
    Ok(fd_lock::RwLock::new(file))
}

pub async fn connect(path: &Path) -> Result<DatabaseConnection, AppError> {
    let mut url = Url::from_file_path(path)
        .map_err(|_| AppError::Validation(format!("invalid sqlite path: {}", path.display())))?;
    url.set_query(Some("mode=rwc"));
    let sqlite_url = url.as_str().replacen("file://", "sqlite://", 1);
    Ok(Database::connect(&sqlite_url).await?)
}

/// Opens and immediately discards a transaction; `false` means the deployment cannot give atomic scopes.
pub async fn probe_atomic_support(db: &DatabaseConnection) -> bool {
    match db.begin().await {
        Ok(txn) => txn.rollback().await.is_ok(),
        Err(err) => {
            tracing::debug!(error = %err, "transaction probe failed");
            false
        }
    }
}

pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), AppError> {
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "PRAGMA foreign_keys = ON;",
    ))
    .await?;

    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut client_stmt = schema.create_table_from_entity(client::Entity);
    client_stmt.if_not_exists();
    db.execute(builder.build(&client_stmt)).await?;

    let mut plan_stmt = schema.create_table_from_entity(plan::Entity);
    plan_stmt.if_not_exists();
    db.execute(builder.build(&plan_stmt)).await?;

    let mut link_stmt = schema.create_table_from_entity(client_plan::Entity);
    link_stmt.if_not_exists();
    db.execute(builder.build(&link_stmt)).await?;

    let mut contract_stmt = schema.create_table_from_entity(contract::Entity);
    contract_stmt.if_not_exists();
    db.execute(builder.build(&contract_stmt)).await?;

    let mut progress_stmt = schema.create_table_from_entity(progress_entry::Entity);
    progress_stmt.if_not_exists();
    db.execute(builder.build(&progress_stmt)).await?;

    let mut finance_stmt = schema.create_table_from_entity(financial_record::Entity);
    finance_stmt.if_not_exists();
    db.execute(builder.build(&finance_stmt)).await?;

    let mut audit_stmt = schema.create_table_from_entity(cascade_audit::Entity);
    audit_stmt.if_not_exists();
    db.execute(builder.build(&audit_stmt)).await?;

    let mut link_unique = Index::create()
        .name("idx_client_plans_pair")
        .table(client_plan::Entity)
        .col(client_plan::Column::ClientId)
        .col(client_plan::Column::PlanId)
        .unique()
        .to_owned();
    link_unique.if_not_exists();
    db.execute(builder.build(&link_unique)).await?;

    let mut link_plan_index = Index::create()
        .name("idx_client_plans_plan")
        .table(client_plan::Entity)
        .col(client_plan::Column::PlanId)
        .to_owned();
    link_plan_index.if_not_exists();
    db.execute(builder.build(&link_plan_index)).await?;

    let mut contract_pair_index = Index::create()
        .name("idx_contracts_pair")
        .table(contract::Entity)
        .col(contract::Column::ClientId)
        .col(contract::Column::PlanId)
        .to_owned();
    contract_pair_index.if_not_exists();
    db.execute(builder.build(&contract_pair_index)).await?;

    let mut progress_contract_index = Index::create()
        .name("idx_progress_entries_contract")
        .table(progress_entry::Entity)
        .col(progress_entry::Column::ContractId)
        .to_owned();
    progress_contract_index.if_not_exists();
    db.execute(builder.build(&progress_contract_index)).await?;

    // sea-query cannot express partial indexes.
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_contracts_active_pair \
         ON contracts (client_id, plan_id) WHERE state = 'active';",
    ))
    .await?;

    Ok(())
}
