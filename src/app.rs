use chrono::{Months, NaiveDate, Utc};
use sea_orm::DatabaseConnection;
use serde::Serialize;

use crate::association::{self, level_compatible, Disassociation};
use crate::cascade::{self, RollbackReport};
use crate::entities::{
    cascade_audit, client, client_plan, contract, financial_record, plan, progress_entry,
};
use crate::error::{AppError, ConsistencyViolation};
use crate::model::{
    ClientChanges, ClientInput, ContractInput, ContractQuery, ContractState, MovementInput,
    MovementKind, PlanInput, PlanState, ProgressInput, RenewInput,
};
use crate::repo;
use crate::repo::contract::NewContract;
use crate::uow::{Coordinator, ExecutionMode, Scope};

pub struct App {
    uow: Coordinator,
}

/// Result of a mutating operation: a one-line summary plus the rows it produced.
#[derive(Clone, Debug)]
pub struct Outcome<T> {
    pub message: String,
    pub data: T,
}

impl<T> Outcome<T> {
    fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

pub struct ClientDetail {
    pub client: client::Model,
    pub plans: Vec<plan::Model>,
    pub contracts: Vec<contract::Model>,
}

pub struct PlanDetail {
    pub plan: plan::Model,
    pub clients: Vec<client::Model>,
    pub contracts: Vec<contract::Model>,
}

pub struct ContractDetail {
    pub contract: contract::Model,
    pub progress: Vec<progress_entry::Model>,
}

#[derive(Clone, Debug)]
pub struct ContractCreated {
    pub contract: contract::Model,
    pub linked: Option<client_plan::Model>,
    pub payment: Option<financial_record::Model>,
}

#[derive(Clone, Debug)]
pub struct ContractRenewed {
    pub previous: contract::Model,
    pub contract: contract::Model,
    pub payment: Option<financial_record::Model>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ReconcileReport {
    pub progress_entries_deleted: u64,
    pub associations_restored: Vec<(i64, i64)>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.progress_entries_deleted == 0 && self.associations_restored.is_empty()
    }
}

impl App {
    pub fn new(db: DatabaseConnection, mode: ExecutionMode) -> Self {
        Self {
            uow: Coordinator::new(db, mode),
        }
    }

    fn db(&self) -> &DatabaseConnection {
        self.uow.connection()
    }

    pub async fn add_client(&self, input: ClientInput) -> Result<Outcome<client::Model>, AppError> {
        ensure_non_empty("client name", &input.name)?;
        let created = repo::client::insert(self.db(), input).await?;
        tracing::info!(client_id = created.id, "client created");
        Ok(Outcome::new(format!("Created client ID: {}", created.id), created))
    }

    pub async fn update_client(
        &self,
        id: i64,
        changes: ClientChanges,
    ) -> Result<Outcome<client::Model>, AppError> {
        ensure_id("client id", id)?;
        if let Some(name) = changes.name.as_deref() {
            ensure_non_empty("client name", name)?;
        }
        let scope = self.uow.begin("update client").await?;
        let result: Result<client::Model, AppError> = async {
            let mut candidate = repo::client::require(scope.conn(), id).await?;
            if let Some(level) = changes.level {
                candidate.level = level.as_str().to_string();
                for plan in repo::association::plans_for_client(scope.conn(), id).await? {
                    if !level_compatible(&candidate, &plan) {
                        return Err(ConsistencyViolation::IncompatibleLevel {
                            client_id: id,
                            plan_id: plan.id,
                            client_level: candidate.level.clone(),
                            plan_level: plan.level.clone(),
                        }
                        .into());
                    }
                }
            }
            scope
                .step(
                    format!("update client {id}"),
                    repo::client::update(scope.conn(), id, changes),
                )
                .await
        }
        .await;
        let updated = scope.finish(result).await?;
        Ok(Outcome::new(format!("Updated client ID: {}", updated.id), updated))
    }

    pub async fn get_client_detail(&self, id: i64) -> Result<ClientDetail, AppError> {
        ensure_id("client id", id)?;
        let client = repo::client::require(self.db(), id).await?;
        let plans = repo::association::plans_for_client(self.db(), id).await?;
        let contracts = repo::contract::find_by_client(self.db(), id).await?;
        Ok(ClientDetail {
            client,
            plans,
            contracts,
        })
    }

    pub async fn list_clients(&self) -> Result<Vec<client::Model>, AppError> {
        repo::client::list(self.db()).await
    }

    pub async fn delete_client(
        &self,
        id: i64,
        reason: &str,
        force: bool,
    ) -> Result<Outcome<RollbackReport>, AppError> {
        ensure_id("client id", id)?;
        let report = cascade::cascade_from_client(&self.uow, id, reason, force).await?;
        let message = removal_message("client", id, &report);
        Ok(Outcome::new(message, report))
    }

    pub async fn add_plan(&self, input: PlanInput) -> Result<Outcome<plan::Model>, AppError> {
        ensure_non_empty("plan name", &input.name)?;
        let created = repo::plan::insert(self.db(), input).await?;
        tracing::info!(plan_id = created.id, "plan created");
        Ok(Outcome::new(format!("Created plan ID: {}", created.id), created))
    }

    /// Moves a plan between states. Leaving `active` is refused while a contract still runs on it.
    pub async fn set_plan_state(
        &self,
        id: i64,
        state: PlanState,
    ) -> Result<Outcome<plan::Model>, AppError> {
        ensure_id("plan id", id)?;
        let scope = self.uow.begin("set plan state").await?;
        let result: Result<plan::Model, AppError> = async {
            repo::plan::require(scope.conn(), id).await?;
            if state != PlanState::Active {
                let running = repo::contract::list(
                    scope.conn(),
                    &ContractQuery {
                        plan_id: Some(id),
                        state: Some(ContractState::Active),
                        ..Default::default()
                    },
                )
                .await?;
                if let Some(contract) = running.first() {
                    return Err(ConsistencyViolation::ActiveContractExists {
                        client_id: contract.client_id,
                        plan_id: id,
                        contract_id: contract.id,
                    }
                    .into());
                }
            }
            scope
                .step(
                    format!("set plan {id} {}", state.as_str()),
                    repo::plan::set_state(scope.conn(), id, state),
                )
                .await
        }
        .await;
        let updated = scope.finish(result).await?;
        Ok(Outcome::new(
            format!("Plan ID: {} is now {}", updated.id, updated.state),
            updated,
        ))
    }

    pub async fn get_plan_detail(&self, id: i64) -> Result<PlanDetail, AppError> {
        ensure_id("plan id", id)?;
        let plan = repo::plan::require(self.db(), id).await?;
        let clients = repo::association::clients_for_plan(self.db(), id).await?;
        let contracts = repo::contract::find_by_plan(self.db(), id).await?;
        Ok(PlanDetail {
            plan,
            clients,
            contracts,
        })
    }

    pub async fn list_plans(&self) -> Result<Vec<plan::Model>, AppError> {
        repo::plan::list(self.db()).await
    }

    pub async fn delete_plan(
        &self,
        id: i64,
        reason: &str,
        force: bool,
    ) -> Result<Outcome<RollbackReport>, AppError> {
        ensure_id("plan id", id)?;
        let report = cascade::cascade_from_plan(&self.uow, id, reason, force).await?;
        let message = removal_message("plan", id, &report);
        Ok(Outcome::new(message, report))
    }

    pub async fn associate_plan(
        &self,
        client_id: i64,
        plan_id: i64,
    ) -> Result<Outcome<client_plan::Model>, AppError> {
        ensure_id("client id", client_id)?;
        ensure_id("plan id", plan_id)?;
        let link = association::associate(&self.uow, client_id, plan_id, level_compatible).await?;
        Ok(Outcome::new(
            format!("Associated client ID: {client_id} with plan ID: {plan_id}"),
            link,
        ))
    }

    pub async fn disassociate_plan(
        &self,
        client_id: i64,
        plan_id: i64,
        cascade_contracts: bool,
        reason: &str,
    ) -> Result<Outcome<Disassociation>, AppError> {
        ensure_id("client id", client_id)?;
        ensure_id("plan id", plan_id)?;
        let outcome =
            association::disassociate(&self.uow, client_id, plan_id, cascade_contracts, reason)
                .await?;
        let message = if outcome.unlinked {
            format!("Disassociated client ID: {client_id} from plan ID: {plan_id}")
        } else {
            format!(
                "Client ID: {client_id} is still associated with plan ID: {plan_id}; contract cascade reported errors"
            )
        };
        Ok(Outcome::new(message, outcome))
    }

    /// Creates a contract, linking the pair first when needed and optionally booking the payment.
    /// All writes share one scope.
    pub async fn create_contract(
        &self,
        input: ContractInput,
    ) -> Result<Outcome<ContractCreated>, AppError> {
        ensure_id("client id", input.client_id)?;
        ensure_id("plan id", input.plan_id)?;
        ensure_price(input.price_cents)?;
        let start = input.start.unwrap_or_else(|| Utc::now().date_naive());
        let end = end_date(start, input.months)?;

        let scope = self.uow.begin("create contract").await?;
        let result = create_contract_in(&scope, &input, start, end).await;
        let created = scope.finish(result).await?;
        tracing::info!(
            contract_id = created.contract.id,
            client_id = input.client_id,
            plan_id = input.plan_id,
            "contract created"
        );
        Ok(Outcome::new(
            format!("Created contract ID: {}", created.contract.id),
            created,
        ))
    }

    pub async fn get_contract(&self, id: i64) -> Result<ContractDetail, AppError> {
        ensure_id("contract id", id)?;
        let contract = repo::contract::require(self.db(), id).await?;
        let progress = repo::progress::find_by_contract(self.db(), id).await?;
        Ok(ContractDetail { contract, progress })
    }

    pub async fn list_contracts(
        &self,
        query: ContractQuery,
    ) -> Result<Vec<contract::Model>, AppError> {
        repo::contract::list(self.db(), &query).await
    }

    /// Cancels an active contract through the contract cascade. Canceling twice is a no-op.
    pub async fn cancel_contract(
        &self,
        id: i64,
        reason: &str,
    ) -> Result<Outcome<RollbackReport>, AppError> {
        ensure_id("contract id", id)?;
        let contract = repo::contract::require(self.db(), id).await?;
        let already_canceled = contract.state == ContractState::Canceled.as_str();
        if !already_canceled && contract.state != ContractState::Active.as_str() {
            return Err(ConsistencyViolation::ContractNotActive {
                contract_id: id,
                state: contract.state,
            }
            .into());
        }
        let report = cascade::cascade_from_contract(&self.uow, id, reason).await?;
        let message = if already_canceled {
            format!("Contract ID: {id} was already canceled")
        } else if report.contracts_canceled == 0 {
            format!(
                "Contract ID: {id} was not canceled; {} error(s)",
                report.errors.len()
            )
        } else if report.success {
            format!("Canceled contract ID: {id}")
        } else {
            format!(
                "Canceled contract ID: {id} with {} error(s)",
                report.errors.len()
            )
        };
        Ok(Outcome::new(message, report))
    }

    /// Marks an active contract `renewed` and starts its successor where it ends.
    pub async fn renew_contract(
        &self,
        id: i64,
        input: RenewInput,
    ) -> Result<Outcome<ContractRenewed>, AppError> {
        ensure_id("contract id", id)?;
        if let Some(price) = input.price_cents {
            ensure_price(price)?;
        }
        if input.months == 0 {
            return Err(AppError::Validation(
                "months must be at least 1".to_string(),
            ));
        }

        let scope = self.uow.begin("renew contract").await?;
        let result = renew_contract_in(&scope, id, &input).await;
        let renewed = scope.finish(result).await?;
        Ok(Outcome::new(
            format!(
                "Renewed contract ID: {} as contract ID: {}",
                renewed.previous.id, renewed.contract.id
            ),
            renewed,
        ))
    }

    /// Finishes every active contract whose end date is before `today`.
    pub async fn expire_contracts(
        &self,
        today: NaiveDate,
    ) -> Result<Outcome<Vec<contract::Model>>, AppError> {
        let scope = self.uow.begin("expire contracts").await?;
        let result: Result<Vec<contract::Model>, AppError> = async {
            let due = repo::contract::find_expired(scope.conn(), today).await?;
            let mut finished = Vec::with_capacity(due.len());
            for contract in due {
                let updated = scope
                    .step(
                        format!("finish contract {}", contract.id),
                        repo::contract::set_state(
                            scope.conn(),
                            contract.id,
                            ContractState::Finished,
                            None,
                        ),
                    )
                    .await?;
                finished.push(updated);
            }
            Ok(finished)
        }
        .await;
        let finished = scope.finish(result).await?;
        Ok(Outcome::new(
            format!("Finished {} expired contract(s)", finished.len()),
            finished,
        ))
    }

    pub async fn add_progress_entry(
        &self,
        input: ProgressInput,
    ) -> Result<Outcome<progress_entry::Model>, AppError> {
        ensure_id("client id", input.client_id)?;
        ensure_id("contract id", input.contract_id)?;
        let date = input.date.unwrap_or_else(|| Utc::now().date_naive());

        let scope = self.uow.begin("add progress entry").await?;
        let result: Result<progress_entry::Model, AppError> = async {
            repo::client::require(scope.conn(), input.client_id).await?;
            let contract = repo::contract::require(scope.conn(), input.contract_id).await?;
            if contract.client_id != input.client_id {
                return Err(ConsistencyViolation::ContractClientMismatch {
                    contract_id: contract.id,
                    client_id: input.client_id,
                }
                .into());
            }
            if contract.state != ContractState::Active.as_str() {
                return Err(ConsistencyViolation::ContractNotActive {
                    contract_id: contract.id,
                    state: contract.state,
                }
                .into());
            }
            scope
                .step(
                    format!("add progress entry to contract {}", contract.id),
                    repo::progress::insert(scope.conn(), input, date),
                )
                .await
        }
        .await;
        let entry = scope.finish(result).await?;
        Ok(Outcome::new(
            format!("Created progress entry ID: {}", entry.id),
            entry,
        ))
    }

    pub async fn list_progress(
        &self,
        client_id: Option<i64>,
        contract_id: Option<i64>,
    ) -> Result<Vec<progress_entry::Model>, AppError> {
        match (contract_id, client_id) {
            (Some(contract_id), _) => {
                ensure_id("contract id", contract_id)?;
                repo::progress::find_by_contract(self.db(), contract_id).await
            }
            (None, Some(client_id)) => {
                ensure_id("client id", client_id)?;
                repo::progress::find_by_client(self.db(), client_id).await
            }
            (None, None) => Err(AppError::Validation(
                "progress listing needs a client or a contract".to_string(),
            )),
        }
    }

    pub async fn record_movement(
        &self,
        input: MovementInput,
    ) -> Result<Outcome<financial_record::Model>, AppError> {
        if input.amount_cents <= 0 {
            return Err(AppError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }
        ensure_non_empty("description", &input.description)?;
        if let Some(client_id) = input.client_id {
            ensure_id("client id", client_id)?;
            repo::client::require(self.db(), client_id).await?;
        }
        if let Some(contract_id) = input.contract_id {
            ensure_id("contract id", contract_id)?;
            repo::contract::require(self.db(), contract_id).await?;
        }
        let record = repo::finance::insert(self.db(), input).await?;
        Ok(Outcome::new(
            format!("Created financial record ID: {}", record.id),
            record,
        ))
    }

    pub async fn list_financial_records(
        &self,
        client_id: Option<i64>,
    ) -> Result<Vec<financial_record::Model>, AppError> {
        repo::finance::list(self.db(), client_id).await
    }

    pub async fn list_cascade_audits(&self) -> Result<Vec<cascade_audit::Model>, AppError> {
        repo::audit::list(self.db()).await
    }

    /// Repairs drift sequential mode can leave behind: progress under canceled
    /// contracts and active contracts without their association.
    pub async fn reconcile(&self) -> Result<Outcome<ReconcileReport>, AppError> {
        let scope = self.uow.begin("reconcile").await?;
        let result: Result<ReconcileReport, AppError> = async {
            let mut report = ReconcileReport::default();
            let canceled = repo::contract::list(
                scope.conn(),
                &ContractQuery {
                    state: Some(ContractState::Canceled),
                    ..Default::default()
                },
            )
            .await?;
            for contract in canceled {
                report.progress_entries_deleted += scope
                    .step(
                        format!("purge progress of contract {}", contract.id),
                        repo::progress::delete_by_contract(scope.conn(), contract.id),
                    )
                    .await?;
            }

            let active = repo::contract::list(
                scope.conn(),
                &ContractQuery {
                    state: Some(ContractState::Active),
                    ..Default::default()
                },
            )
            .await?;
            for contract in active {
                let (client_id, plan_id) = (contract.client_id, contract.plan_id);
                if repo::association::exists(scope.conn(), client_id, plan_id).await? {
                    continue;
                }
                scope
                    .step(
                        association::link_label(client_id, plan_id),
                        repo::association::link(scope.conn(), client_id, plan_id),
                    )
                    .await?;
                report.associations_restored.push((client_id, plan_id));
            }
            Ok(report)
        }
        .await;
        let report = scope.finish(result).await?;
        if !report.is_clean() {
            tracing::warn!(
                progress_entries_deleted = report.progress_entries_deleted,
                associations_restored = report.associations_restored.len(),
                "reconcile repaired drift"
            );
        }
        let message = if report.is_clean() {
            "Nothing to reconcile".to_string()
        } else {
            format!(
                "Reconciled: {} progress entr(ies) deleted, {} association(s) restored",
                report.progress_entries_deleted,
                report.associations_restored.len()
            )
        };
        Ok(Outcome::new(message, report))
    }
}

async fn create_contract_in(
    scope: &Scope<'_>,
    input: &ContractInput,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<ContractCreated, AppError> {
    let (client_id, plan_id) = (input.client_id, input.plan_id);
    let client = repo::client::require(scope.conn(), client_id).await?;
    let plan = repo::plan::require(scope.conn(), plan_id).await?;
    association::ensure_linkable(&client, &plan, &level_compatible)?;
    if let Some(existing) =
        repo::contract::find_active_by_client_and_plan(scope.conn(), client_id, plan_id).await?
    {
        return Err(ConsistencyViolation::DuplicateActiveContract {
            client_id,
            plan_id,
            contract_id: existing.id,
        }
        .into());
    }

    let linked = if repo::association::exists(scope.conn(), client_id, plan_id).await? {
        None
    } else {
        Some(
            scope
                .step(
                    association::link_label(client_id, plan_id),
                    repo::association::link(scope.conn(), client_id, plan_id),
                )
                .await?,
        )
    };

    let contract = scope
        .step(
            format!("insert contract for client {client_id} and plan {plan_id}"),
            repo::contract::insert(
                scope.conn(),
                NewContract {
                    client_id,
                    plan_id,
                    price_cents: input.price_cents,
                    start_date: start,
                    end_date: end,
                    renewed_from: None,
                },
            ),
        )
        .await?;

    let payment = if input.record_payment && input.price_cents > 0 {
        Some(record_payment(scope, &contract, "contract payment").await?)
    } else {
        None
    };

    Ok(ContractCreated {
        contract,
        linked,
        payment,
    })
}

async fn renew_contract_in(
    scope: &Scope<'_>,
    id: i64,
    input: &RenewInput,
) -> Result<ContractRenewed, AppError> {
    let prior = repo::contract::require(scope.conn(), id).await?;
    if prior.state != ContractState::Active.as_str() {
        return Err(ConsistencyViolation::ContractNotActive {
            contract_id: id,
            state: prior.state,
        }
        .into());
    }
    let client = repo::client::require(scope.conn(), prior.client_id).await?;
    let plan = repo::plan::require(scope.conn(), prior.plan_id).await?;
    association::ensure_linkable(&client, &plan, &level_compatible)?;

    let start = prior.end_date;
    let end = end_date(start, input.months)?;
    let price_cents = input.price_cents.unwrap_or(prior.price_cents);

    let previous = scope
        .step(
            format!("mark contract {id} renewed"),
            repo::contract::set_state(scope.conn(), id, ContractState::Renewed, None),
        )
        .await?;
    let contract = scope
        .step(
            format!("insert renewal of contract {id}"),
            repo::contract::insert(
                scope.conn(),
                NewContract {
                    client_id: prior.client_id,
                    plan_id: prior.plan_id,
                    price_cents,
                    start_date: start,
                    end_date: end,
                    renewed_from: Some(id),
                },
            ),
        )
        .await?;
    let payment = if input.record_payment && price_cents > 0 {
        Some(record_payment(scope, &contract, "renewal payment").await?)
    } else {
        None
    };

    Ok(ContractRenewed {
        previous,
        contract,
        payment,
    })
}

async fn record_payment(
    scope: &Scope<'_>,
    contract: &contract::Model,
    description: &str,
) -> Result<financial_record::Model, AppError> {
    scope
        .step(
            format!("record payment for contract {}", contract.id),
            repo::finance::insert(
                scope.conn(),
                MovementInput {
                    kind: MovementKind::Inflow,
                    amount_cents: contract.price_cents,
                    client_id: Some(contract.client_id),
                    contract_id: Some(contract.id),
                    description: format!("{description} (contract {})", contract.id),
                },
            ),
        )
        .await
}

fn removal_message(kind: &str, id: i64, report: &RollbackReport) -> String {
    if report.roots_deleted == 0 {
        if report.errors.is_empty() {
            return format!("No {kind} with ID: {id}; nothing removed");
        }
        return format!(
            "{} ID: {id} was not deleted; {} error(s)",
            capitalized(kind),
            report.errors.len()
        );
    }
    if report.success {
        let dependents = report.affected() - report.roots_deleted;
        format!("Deleted {kind} ID: {id} ({dependents} dependent row(s) affected)")
    } else {
        format!(
            "Deleted {kind} ID: {id} with {} error(s)",
            report.errors.len()
        )
    }
}

fn capitalized(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn end_date(start: NaiveDate, months: u32) -> Result<NaiveDate, AppError> {
    if months == 0 {
        return Err(AppError::Validation(
            "months must be at least 1".to_string(),
        ));
    }
    start.checked_add_months(Months::new(months)).ok_or_else(|| {
        AppError::Validation(format!(
            "contract end date out of range: {start} + {months} months"
        ))
    })
}

fn ensure_id(label: &str, id: i64) -> Result<(), AppError> {
    if id <= 0 {
        return Err(AppError::Validation(format!(
            "{label} must be a positive integer, got {id}"
        )));
    }
    Ok(())
}

fn ensure_price(price_cents: i64) -> Result<(), AppError> {
    if price_cents < 0 {
        return Err(AppError::Validation(
            "price cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn ensure_non_empty(label: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{label} cannot be empty")));
    }
    Ok(())
}
