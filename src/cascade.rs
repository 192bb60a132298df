use std::collections::HashSet;
use std::future::Future;

use serde::Serialize;

use crate::error::AppError;
use crate::model::{ContractState, PlanState};
use crate::repo;
use crate::repo::audit::NewAudit;
use crate::uow::{Coordinator, ExecutionMode, Scope, ScopeConn};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum EntityKind {
    Client,
    Plan,
    Contract,
    ProgressEntry,
    Association,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Plan => "plan",
            Self::Contract => "contract",
            Self::ProgressEntry => "progress_entry",
            Self::Association => "association",
        }
    }

    /// Lower ranks are removed first among siblings.
    pub fn rank(&self) -> u8 {
        match self {
            Self::ProgressEntry => 0,
            Self::Contract => 1,
            Self::Association => 2,
            Self::Client | Self::Plan => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Effect {
    Delete,
    Cancel,
    Unlink,
}

#[derive(Clone, Copy, Debug)]
pub struct Dependency {
    pub parent: EntityKind,
    pub child: EntityKind,
    pub effect: Effect,
}

/// Parent to child edges walked by every cascade.
pub const DEPENDENCIES: &[Dependency] = &[
    Dependency {
        parent: EntityKind::Contract,
        child: EntityKind::ProgressEntry,
        effect: Effect::Delete,
    },
    Dependency {
        parent: EntityKind::Client,
        child: EntityKind::ProgressEntry,
        effect: Effect::Delete,
    },
    Dependency {
        parent: EntityKind::Client,
        child: EntityKind::Contract,
        effect: Effect::Delete,
    },
    Dependency {
        parent: EntityKind::Client,
        child: EntityKind::Association,
        effect: Effect::Unlink,
    },
    Dependency {
        parent: EntityKind::Plan,
        child: EntityKind::Contract,
        effect: Effect::Delete,
    },
    Dependency {
        parent: EntityKind::Plan,
        child: EntityKind::Association,
        effect: Effect::Unlink,
    },
];

fn dependencies_of(kind: EntityKind) -> Vec<&'static Dependency> {
    let mut deps: Vec<&'static Dependency> = DEPENDENCIES
        .iter()
        .filter(|dep| dep.parent == kind)
        .collect();
    deps.sort_by_key(|dep| dep.child.rank());
    deps
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
enum Node {
    Client(i64),
    Plan(i64),
    Contract(i64),
    ProgressEntry(i64),
    Association { client_id: i64, plan_id: i64 },
}

impl Node {
    fn kind(&self) -> EntityKind {
        match self {
            Self::Client(_) => EntityKind::Client,
            Self::Plan(_) => EntityKind::Plan,
            Self::Contract(_) => EntityKind::Contract,
            Self::ProgressEntry(_) => EntityKind::ProgressEntry,
            Self::Association { .. } => EntityKind::Association,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CascadeItemError {
    pub item: String,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub root_kind: EntityKind,
    pub root_id: i64,
    pub reason: String,
    pub mode: ExecutionMode,
    pub progress_entries_deleted: u64,
    pub contracts_canceled: u64,
    pub contracts_deleted: u64,
    pub associations_removed: u64,
    pub roots_deleted: u64,
    pub errors: Vec<CascadeItemError>,
    pub success: bool,
    pub audit_id: Option<i64>,
}

impl RollbackReport {
    fn new(root_kind: EntityKind, root_id: i64, reason: &str, mode: ExecutionMode) -> Self {
        Self {
            root_kind,
            root_id,
            reason: reason.to_string(),
            mode,
            progress_entries_deleted: 0,
            contracts_canceled: 0,
            contracts_deleted: 0,
            associations_removed: 0,
            roots_deleted: 0,
            errors: Vec::new(),
            success: true,
            audit_id: None,
        }
    }

    pub fn eliminated(&self) -> u64 {
        self.progress_entries_deleted
            + self.contracts_deleted
            + self.associations_removed
            + self.roots_deleted
    }

    pub fn affected(&self) -> u64 {
        self.eliminated() + self.contracts_canceled
    }
}

pub async fn cascade_from_contract(
    uow: &Coordinator,
    contract_id: i64,
    reason: &str,
) -> Result<RollbackReport, AppError> {
    let scope = uow.begin("cancel contract").await?;
    let result = contract_in(&scope, contract_id, reason).await;
    scope.finish(result).await
}

pub async fn cascade_from_client(
    uow: &Coordinator,
    client_id: i64,
    reason: &str,
    force: bool,
) -> Result<RollbackReport, AppError> {
    let scope = uow.begin("delete client").await?;
    let result = client_in(&scope, client_id, reason, force).await;
    scope.finish(result).await
}

pub async fn cascade_from_plan(
    uow: &Coordinator,
    plan_id: i64,
    reason: &str,
    force: bool,
) -> Result<RollbackReport, AppError> {
    let scope = uow.begin("delete plan").await?;
    let result = plan_in(&scope, plan_id, reason, force).await;
    scope.finish(result).await
}

/// Deletes the contract's progress entries, cancels it and drops the pair's link
/// once no active contract is left. Already canceled contracts yield an empty report.
pub async fn contract_in(
    scope: &Scope<'_>,
    contract_id: i64,
    reason: &str,
) -> Result<RollbackReport, AppError> {
    run(scope, Node::Contract(contract_id), reason).await
}

pub async fn client_in(
    scope: &Scope<'_>,
    client_id: i64,
    reason: &str,
    force: bool,
) -> Result<RollbackReport, AppError> {
    if !force {
        if let Some(client) = repo::client::get(scope.conn(), client_id).await? {
            let active_plans = repo::association::plans_for_client(scope.conn(), client.id)
                .await?
                .into_iter()
                .filter(|plan| plan.state == PlanState::Active.as_str())
                .count();
            let active_contracts = repo::contract::find_by_client(scope.conn(), client.id)
                .await?
                .into_iter()
                .filter(|contract| contract.state == ContractState::Active.as_str())
                .count();
            if active_plans > 0 || active_contracts > 0 {
                return Err(AppError::CascadeBlocked(format!(
                    "client id {client_id} has {active_plans} active plan association(s) and {active_contracts} active contract(s)"
                )));
            }
        }
    }
    run(scope, Node::Client(client_id), reason).await
}

pub async fn plan_in(
    scope: &Scope<'_>,
    plan_id: i64,
    reason: &str,
    force: bool,
) -> Result<RollbackReport, AppError> {
    if !force {
        let clients = repo::association::links_for_plan(scope.conn(), plan_id)
            .await?
            .len();
        let active_contracts = repo::contract::find_by_plan(scope.conn(), plan_id)
            .await?
            .into_iter()
            .filter(|contract| contract.state == ContractState::Active.as_str())
            .count();
        if clients > 0 || active_contracts > 0 {
            return Err(AppError::CascadeBlocked(format!(
                "plan id {plan_id} has {clients} associated client(s) and {active_contracts} active contract(s)"
            )));
        }
    }
    run(scope, Node::Plan(plan_id), reason).await
}

async fn run(scope: &Scope<'_>, root: Node, reason: &str) -> Result<RollbackReport, AppError> {
    let root_id = match root {
        Node::Client(id) | Node::Plan(id) | Node::Contract(id) | Node::ProgressEntry(id) => id,
        Node::Association { client_id, .. } => client_id,
    };
    let mut report = RollbackReport::new(root.kind(), root_id, reason, scope.mode());

    let order = discover(scope.conn(), root).await?;
    for (node, effect) in order {
        apply(scope, node, effect, reason, &mut report).await?;
    }

    report.success = report.errors.is_empty();
    let details = serde_json::to_string(&report)?;
    let audit = NewAudit {
        root_kind: report.root_kind.as_str().to_string(),
        root_id,
        reason: reason.to_string(),
        mode: scope.mode().as_str().to_string(),
        success: report.success,
        details,
    };
    if let Some(row) = attempt(
        scope,
        &mut report,
        format!("record cascade audit for {} {root_id}", root.kind().as_str()),
        repo::audit::insert(scope.conn(), audit),
    )
    .await?
    {
        report.audit_id = Some(row.id);
    }
    report.success = report.errors.is_empty();

    tracing::info!(
        root = root.kind().as_str(),
        root_id,
        reason,
        affected = report.affected(),
        errors = report.errors.len(),
        "cascade finished"
    );
    Ok(report)
}

/// Post-order list of (node, effect) pairs reachable from `root`, root last.
async fn discover(conn: &ScopeConn<'_>, root: Node) -> Result<Vec<(Node, Effect)>, AppError> {
    let root_effect = match root {
        Node::Contract(_) => Effect::Cancel,
        _ => Effect::Delete,
    };
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(root, root_effect, false)];

    while let Some((node, effect, expanded)) = stack.pop() {
        if expanded {
            order.push((node, effect));
            continue;
        }
        if !visited.insert(node) {
            continue;
        }
        stack.push((node, effect, true));
        for dep in dependencies_of(node.kind()).into_iter().rev() {
            let children = children_of(conn, node, dep.child).await?;
            for child in children.into_iter().rev() {
                if !visited.contains(&child) {
                    stack.push((child, dep.effect, false));
                }
            }
        }
    }

    Ok(order)
}

async fn children_of(
    conn: &ScopeConn<'_>,
    parent: Node,
    kind: EntityKind,
) -> Result<Vec<Node>, AppError> {
    let nodes = match (parent, kind) {
        (Node::Contract(id), EntityKind::ProgressEntry) => repo::progress::find_by_contract(conn, id)
            .await?
            .into_iter()
            .map(|entry| Node::ProgressEntry(entry.id))
            .collect(),
        (Node::Client(id), EntityKind::ProgressEntry) => repo::progress::find_by_client(conn, id)
            .await?
            .into_iter()
            .map(|entry| Node::ProgressEntry(entry.id))
            .collect(),
        (Node::Client(id), EntityKind::Contract) => repo::contract::find_by_client(conn, id)
            .await?
            .into_iter()
            .map(|contract| Node::Contract(contract.id))
            .collect(),
        (Node::Plan(id), EntityKind::Contract) => repo::contract::find_by_plan(conn, id)
            .await?
            .into_iter()
            .map(|contract| Node::Contract(contract.id))
            .collect(),
        (Node::Client(id), EntityKind::Association) => {
            repo::association::links_for_client(conn, id)
                .await?
                .into_iter()
                .map(|link| Node::Association {
                    client_id: link.client_id,
                    plan_id: link.plan_id,
                })
                .collect()
        }
        (Node::Plan(id), EntityKind::Association) => repo::association::links_for_plan(conn, id)
            .await?
            .into_iter()
            .map(|link| Node::Association {
                client_id: link.client_id,
                plan_id: link.plan_id,
            })
            .collect(),
        _ => Vec::new(),
    };
    Ok(nodes)
}

async fn apply(
    scope: &Scope<'_>,
    node: Node,
    effect: Effect,
    reason: &str,
    report: &mut RollbackReport,
) -> Result<(), AppError> {
    match node {
        Node::ProgressEntry(id) => {
            let deleted = attempt(
                scope,
                report,
                format!("delete progress entry {id}"),
                repo::progress::delete(scope.conn(), id),
            )
            .await?;
            if deleted == Some(true) {
                report.progress_entries_deleted += 1;
            }
        }
        Node::Contract(id) => match effect {
            Effect::Cancel => cancel_contract(scope, id, reason, report).await?,
            Effect::Delete | Effect::Unlink => retire_contract(scope, id, reason, report).await?,
        },
        Node::Association { client_id, plan_id } => {
            let removed = attempt(
                scope,
                report,
                crate::association::unlink_label(client_id, plan_id),
                repo::association::unlink(scope.conn(), client_id, plan_id),
            )
            .await?;
            if removed == Some(true) {
                report.associations_removed += 1;
            }
        }
        Node::Client(id) => {
            let deleted = attempt(
                scope,
                report,
                format!("delete client {id}"),
                repo::client::delete(scope.conn(), id),
            )
            .await?;
            if deleted == Some(true) {
                report.roots_deleted += 1;
            }
        }
        Node::Plan(id) => {
            let deleted = attempt(
                scope,
                report,
                format!("delete plan {id}"),
                repo::plan::delete(scope.conn(), id),
            )
            .await?;
            if deleted == Some(true) {
                report.roots_deleted += 1;
            }
        }
    }
    Ok(())
}

async fn cancel_contract(
    scope: &Scope<'_>,
    id: i64,
    reason: &str,
    report: &mut RollbackReport,
) -> Result<(), AppError> {
    let Some(contract) = repo::contract::get(scope.conn(), id).await? else {
        return Ok(());
    };
    if contract.state == ContractState::Canceled.as_str() {
        return Ok(());
    }
    let canceled = attempt(
        scope,
        report,
        format!("cancel contract {id}"),
        repo::contract::set_state(
            scope.conn(),
            id,
            ContractState::Canceled,
            Some(reason.to_string()),
        ),
    )
    .await?;
    if canceled.is_none() {
        return Ok(());
    }
    report.contracts_canceled += 1;

    let (client_id, plan_id) = (contract.client_id, contract.plan_id);
    let other_active =
        repo::contract::find_active_by_client_and_plan(scope.conn(), client_id, plan_id).await?;
    if other_active.is_none() && repo::association::exists(scope.conn(), client_id, plan_id).await? {
        let removed = attempt(
            scope,
            report,
            crate::association::unlink_label(client_id, plan_id),
            repo::association::unlink(scope.conn(), client_id, plan_id),
        )
        .await?;
        if removed == Some(true) {
            report.associations_removed += 1;
        }
    }
    Ok(())
}

/// Removes a contract owned by a root that is going away; active ones are canceled first.
async fn retire_contract(
    scope: &Scope<'_>,
    id: i64,
    reason: &str,
    report: &mut RollbackReport,
) -> Result<(), AppError> {
    let Some(contract) = repo::contract::get(scope.conn(), id).await? else {
        return Ok(());
    };
    if contract.state == ContractState::Active.as_str() {
        let canceled = attempt(
            scope,
            report,
            format!("cancel contract {id}"),
            repo::contract::set_state(
                scope.conn(),
                id,
                ContractState::Canceled,
                Some(reason.to_string()),
            ),
        )
        .await?;
        if canceled.is_some() {
            report.contracts_canceled += 1;
        }
    }
    let deleted = attempt(
        scope,
        report,
        format!("delete contract {id}"),
        repo::contract::delete(scope.conn(), id),
    )
    .await?;
    if deleted == Some(true) {
        report.contracts_deleted += 1;
    }
    Ok(())
}

/// Runs one removal step. Atomic scopes propagate the failure; sequential ones record it and go on.
async fn attempt<T, F>(
    scope: &Scope<'_>,
    report: &mut RollbackReport,
    label: String,
    work: F,
) -> Result<Option<T>, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match scope.step(label.clone(), work).await {
        Ok(value) => Ok(Some(value)),
        Err(err) if scope.is_atomic() => Err(err),
        Err(err) => {
            tracing::warn!(item = %label, error = %err, "cascade item failed; continuing");
            report.errors.push(CascadeItemError {
                item: label,
                error: err.to_string(),
            });
            Ok(None)
        }
    }
}
