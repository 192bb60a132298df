use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DatabaseTransaction, DbErr, ExecResult,
    QueryResult, Statement, TransactionTrait,
};
use serde::Serialize;

use crate::error::AppError;

/// Fixed per coordinator: one transaction per scope, or steps applied as they run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum ExecutionMode {
    Atomic,
    Sequential,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Atomic => "atomic",
            Self::Sequential => "sequential",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Coordinator {
    db: DatabaseConnection,
    mode: ExecutionMode,
}

impl Coordinator {
    pub fn new(db: DatabaseConnection, mode: ExecutionMode) -> Self {
        Self { db, mode }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Opens a scope for `operation`. Every scope must be passed to [`Scope::finish`].
    pub async fn begin(&self, operation: &str) -> Result<Scope<'_>, AppError> {
        let conn = match self.mode {
            ExecutionMode::Atomic => match self.db.begin().await {
                Ok(txn) => ScopeConn::Atomic(txn),
                Err(source) => {
                    return Err(AppError::AtomicFailure {
                        operation: operation.to_string(),
                        step: None,
                        source,
                    })
                }
            },
            ExecutionMode::Sequential => ScopeConn::Direct(&self.db),
        };
        tracing::debug!(operation, mode = self.mode.as_str(), "scope opened");
        Ok(Scope {
            conn,
            mode: self.mode,
            operation: operation.to_string(),
            log: Mutex::new(StepLog::default()),
        })
    }
}

#[derive(Debug, Default)]
struct StepLog {
    completed: Vec<String>,
    failed: Option<String>,
}

pub struct Scope<'a> {
    conn: ScopeConn<'a>,
    mode: ExecutionMode,
    operation: String,
    log: Mutex<StepLog>,
}

impl<'a> Scope<'a> {
    pub fn conn(&self) -> &ScopeConn<'a> {
        &self.conn
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn is_atomic(&self) -> bool {
        self.mode == ExecutionMode::Atomic
    }

    pub async fn step<T, F>(&self, label: impl Into<String>, work: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        let label = label.into();
        match work.await {
            Ok(value) => {
                self.log().completed.push(label);
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(operation = %self.operation, step = %label, error = %err, "step failed");
                let mut log = self.log();
                if log.failed.is_none() {
                    log.failed = Some(label);
                }
                Err(err)
            }
        }
    }

    fn log(&self) -> MutexGuard<'_, StepLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Closes the scope: commit or rollback in atomic mode, failure classification in sequential mode.
    pub async fn finish<T>(self, result: Result<T, AppError>) -> Result<T, AppError> {
        let Scope {
            conn,
            mode: _,
            operation,
            log,
        } = self;
        let log = log.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());

        match conn {
            ScopeConn::Atomic(txn) => match result {
                Ok(value) => {
                    if let Err(source) = txn.commit().await {
                        return Err(AppError::AtomicFailure {
                            operation,
                            step: Some("commit".to_string()),
                            source,
                        });
                    }
                    tracing::debug!(%operation, steps = log.completed.len(), "scope committed");
                    Ok(value)
                }
                Err(err) => {
                    let rollback = txn.rollback().await;
                    Err(rolled_back(operation, log.failed, err, rollback))
                }
            },
            ScopeConn::Direct(_) => match result {
                Ok(value) => Ok(value),
                Err(err) if log.completed.is_empty() => Err(err),
                Err(err) => {
                    let failed = log
                        .failed
                        .unwrap_or_else(|| "after last completed step".to_string());
                    tracing::error!(
                        %operation,
                        completed = ?log.completed,
                        %failed,
                        error = %err,
                        "sequential execution left partial state"
                    );
                    Err(AppError::PartialFailure {
                        operation,
                        completed: log.completed,
                        failed,
                        source: Box::new(err),
                    })
                }
            },
        }
    }
}

/// A failed rollback is logged; the error that triggered it is what surfaces.
fn rolled_back(
    operation: String,
    failed_step: Option<String>,
    err: AppError,
    rollback: Result<(), DbErr>,
) -> AppError {
    match rollback {
        Ok(()) => tracing::debug!(%operation, error = %err, "scope rolled back"),
        Err(rollback_err) => tracing::error!(
            %operation,
            error = %err,
            %rollback_err,
            "rollback failed"
        ),
    }
    match err {
        AppError::Db(source) => AppError::AtomicFailure {
            operation,
            step: failed_step,
            source,
        },
        other => other,
    }
}

/// The connection a scope hands to repositories: a live transaction or the bare pool.
pub enum ScopeConn<'a> {
    Atomic(DatabaseTransaction),
    Direct(&'a DatabaseConnection),
}

#[async_trait::async_trait]
impl<'a> ConnectionTrait for ScopeConn<'a> {
    fn get_database_backend(&self) -> DatabaseBackend {
        match self {
            Self::Atomic(txn) => txn.get_database_backend(),
            Self::Direct(db) => db.get_database_backend(),
        }
    }

    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        match self {
            Self::Atomic(txn) => txn.execute(stmt).await,
            Self::Direct(db) => db.execute(stmt).await,
        }
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<ExecResult, DbErr> {
        match self {
            Self::Atomic(txn) => txn.execute_unprepared(sql).await,
            Self::Direct(db) => db.execute_unprepared(sql).await,
        }
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, DbErr> {
        match self {
            Self::Atomic(txn) => txn.query_one(stmt).await,
            Self::Direct(db) => db.query_one(stmt).await,
        }
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        match self {
            Self::Atomic(txn) => txn.query_all(stmt).await,
            Self::Direct(db) => db.query_all(stmt).await,
        }
    }

    fn support_returning(&self) -> bool {
        match self {
            Self::Atomic(txn) => txn.support_returning(),
            Self::Direct(db) => db.support_returning(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::client;
    use crate::model::{ClientInput, Level};
    use crate::repo;
    use crate::test_support::setup_db;
    use sea_orm::{EntityTrait, PaginatorTrait};

    fn input(name: &str) -> ClientInput {
        ClientInput {
            name: name.to_string(),
            email: None,
            phone: None,
            level: Level::Beginner,
        }
    }

    async fn client_count(db: &DatabaseConnection) -> u64 {
        client::Entity::find().count(db).await.expect("count clients")
    }

    #[tokio::test]
    async fn atomic_scope_commits_all_steps() {
        let (_dir, db) = setup_db().await;
        let coordinator = Coordinator::new(db.clone(), ExecutionMode::Atomic);

        let scope = coordinator.begin("two clients").await.expect("begin");
        let result: Result<(), AppError> = async {
            scope
                .step("first", repo::client::insert(scope.conn(), input("A")))
                .await?;
            scope
                .step("second", repo::client::insert(scope.conn(), input("B")))
                .await?;
            Ok(())
        }
        .await;
        scope.finish(result).await.expect("finish");

        assert_eq!(client_count(&db).await, 2);
    }

    #[tokio::test]
    async fn atomic_scope_discards_writes_on_store_error() {
        let (_dir, db) = setup_db().await;
        let plan = crate::test_support::plan(&db, Level::Beginner).await;
        let existing = repo::client::insert(&db, input("Existing"))
            .await
            .expect("insert");
        repo::association::link(&db, existing.id, plan.id)
            .await
            .expect("link");
        let coordinator = Coordinator::new(db.clone(), ExecutionMode::Atomic);

        let scope = coordinator.begin("doomed").await.expect("begin");
        let result: Result<(), AppError> = async {
            scope
                .step("insert client", repo::client::insert(scope.conn(), input("New")))
                .await?;
            scope
                .step(
                    "duplicate link",
                    repo::association::link(scope.conn(), existing.id, plan.id),
                )
                .await?;
            Ok(())
        }
        .await;
        let err = scope.finish(result).await.unwrap_err();

        assert!(err.is_retryable());
        match err {
            AppError::AtomicFailure { step, .. } => {
                assert_eq!(step.as_deref(), Some("duplicate link"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client_count(&db).await, 1);
    }

    #[tokio::test]
    async fn atomic_scope_surfaces_business_errors_unchanged() {
        let (_dir, db) = setup_db().await;
        let coordinator = Coordinator::new(db.clone(), ExecutionMode::Atomic);

        let scope = coordinator.begin("rule check").await.expect("begin");
        let result: Result<(), AppError> = async {
            scope
                .step("insert client", repo::client::insert(scope.conn(), input("A")))
                .await?;
            Err(AppError::NotFound("plan id 9".to_string()))
        }
        .await;
        let err = scope.finish(result).await.unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(client_count(&db).await, 0);
    }

    #[test]
    fn failed_rollback_keeps_triggering_error() {
        let err = rolled_back(
            "renew contract".to_string(),
            Some("insert successor".to_string()),
            AppError::Db(DbErr::Custom("unique violation".to_string())),
            Err(DbErr::Custom("connection reset".to_string())),
        );
        match err {
            AppError::AtomicFailure { step, source, .. } => {
                assert_eq!(step.as_deref(), Some("insert successor"));
                assert!(source.to_string().contains("unique violation"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = rolled_back(
            "renew contract".to_string(),
            None,
            AppError::NotFound("contract id 3".to_string()),
            Err(DbErr::Custom("connection reset".to_string())),
        );
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn sequential_scope_reports_partial_failure() {
        let (_dir, db) = setup_db().await;
        let plan = crate::test_support::plan(&db, Level::Beginner).await;
        let existing = repo::client::insert(&db, input("Existing"))
            .await
            .expect("insert");
        repo::association::link(&db, existing.id, plan.id)
            .await
            .expect("link");
        let coordinator = Coordinator::new(db.clone(), ExecutionMode::Sequential);

        let scope = coordinator.begin("half done").await.expect("begin");
        let result: Result<(), AppError> = async {
            scope
                .step("insert client", repo::client::insert(scope.conn(), input("New")))
                .await?;
            scope
                .step(
                    "duplicate link",
                    repo::association::link(scope.conn(), existing.id, plan.id),
                )
                .await?;
            Ok(())
        }
        .await;
        let err = scope.finish(result).await.unwrap_err();

        match err {
            AppError::PartialFailure {
                completed, failed, ..
            } => {
                assert_eq!(completed, vec!["insert client".to_string()]);
                assert_eq!(failed, "duplicate link");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client_count(&db).await, 2);
    }

    #[tokio::test]
    async fn sequential_scope_failing_first_step_returns_original_error() {
        let (_dir, db) = setup_db().await;
        let plan = crate::test_support::plan(&db, Level::Beginner).await;
        let existing = repo::client::insert(&db, input("Existing"))
            .await
            .expect("insert");
        repo::association::link(&db, existing.id, plan.id)
            .await
            .expect("link");
        let coordinator = Coordinator::new(db.clone(), ExecutionMode::Sequential);

        let scope = coordinator.begin("nothing applied").await.expect("begin");
        let result = scope
            .step(
                "duplicate link",
                repo::association::link(scope.conn(), existing.id, plan.id),
            )
            .await
            .map(|_| ());
        let err = scope.finish(result).await.unwrap_err();

        assert!(matches!(err, AppError::Db(_)));
    }
}
