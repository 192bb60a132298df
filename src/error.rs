use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{}", multiline("Invalid input", .0))]
    Validation(String),
    #[error("{}", multiline("Not found", .0))]
    NotFound(String),
    #[error("Consistency violation: {0}")]
    Consistency(ConsistencyViolation),
    #[error("{operation} aborted, no changes were applied: {source}")]
    AtomicFailure {
        operation: String,
        step: Option<String>,
        #[source]
        source: sea_orm::DbErr,
    },
    #[error(
        "{operation} stopped partway; completed: [{}]; failed: {failed}. \
         Completed steps were kept, do not retry blindly: {source}",
        .completed.join(", ")
    )]
    PartialFailure {
        operation: String,
        completed: Vec<String>,
        failed: String,
        #[source]
        source: Box<AppError>,
    },
    #[error("Cascade blocked: {0} (pass --force to proceed)")]
    CascadeBlocked(String),
}

impl AppError {
    /// True when the failed operation left no writes behind and can be resubmitted as a whole.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::AtomicFailure { .. })
    }
}

impl From<ConsistencyViolation> for AppError {
    fn from(value: ConsistencyViolation) -> Self {
        Self::Consistency(value)
    }
}

/// Business invariants a write would break.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsistencyViolation {
    DuplicateActiveContract {
        client_id: i64,
        plan_id: i64,
        contract_id: i64,
    },
    IncompatibleLevel {
        client_id: i64,
        plan_id: i64,
        client_level: String,
        plan_level: String,
    },
    AlreadyAssociated {
        client_id: i64,
        plan_id: i64,
    },
    NotAssociated {
        client_id: i64,
        plan_id: i64,
    },
    ActiveContractExists {
        client_id: i64,
        plan_id: i64,
        contract_id: i64,
    },
    PlanNotActive {
        plan_id: i64,
        state: String,
    },
    ClientInactive {
        client_id: i64,
    },
    ContractNotActive {
        contract_id: i64,
        state: String,
    },
    ContractClientMismatch {
        contract_id: i64,
        client_id: i64,
    },
}

impl fmt::Display for ConsistencyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateActiveContract {
                client_id,
                plan_id,
                contract_id,
            } => write!(
                f,
                "client id {client_id} already has active contract id {contract_id} for plan id {plan_id}"
            ),
            Self::IncompatibleLevel {
                client_id,
                plan_id,
                client_level,
                plan_level,
            } => write!(
                f,
                "plan id {plan_id} ({plan_level}) is not compatible with client id {client_id} ({client_level})"
            ),
            Self::AlreadyAssociated { client_id, plan_id } => write!(
                f,
                "client id {client_id} is already associated with plan id {plan_id}"
            ),
            Self::NotAssociated { client_id, plan_id } => write!(
                f,
                "client id {client_id} is not associated with plan id {plan_id}"
            ),
            Self::ActiveContractExists {
                client_id,
                plan_id,
                contract_id,
            } => write!(
                f,
                "active contract id {contract_id} still binds client id {client_id} to plan id {plan_id} (use --cascade to cancel it)"
            ),
            Self::PlanNotActive { plan_id, state } => {
                write!(f, "plan id {plan_id} is {state}, not active")
            }
            Self::ClientInactive { client_id } => {
                write!(f, "client id {client_id} is inactive")
            }
            Self::ContractNotActive { contract_id, state } => {
                write!(f, "contract id {contract_id} is {state}, not active")
            }
            Self::ContractClientMismatch {
                contract_id,
                client_id,
            } => write!(
                f,
                "contract id {contract_id} does not belong to client id {client_id}"
            ),
        }
    }
}

fn multiline(label: &str, message: &str) -> String {
    if message.contains('\n') {
        format!("{label}:\n{message}")
    } else {
        format!("{label}: {message}")
    }
}
