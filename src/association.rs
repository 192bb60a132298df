//! Client and plan links, stored as one `client_plans` row per pair.

use serde::Serialize;

use crate::cascade::{self, RollbackReport};
use crate::entities::{client, client_plan, plan};
use crate::error::{AppError, ConsistencyViolation};
use crate::model::{Level, PlanState};
use crate::repo;
use crate::uow::{Coordinator, Scope};

/// Default pairing rule: a client may join plans up to their own level.
pub fn level_compatible(client: &client::Model, plan: &plan::Model) -> bool {
    match (Level::parse(&client.level), Level::parse(&plan.level)) {
        (Ok(client_level), Ok(plan_level)) => plan_level <= client_level,
        _ => false,
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Disassociation {
    pub client_id: i64,
    pub plan_id: i64,
    pub unlinked: bool,
    pub contract_cascade: Option<RollbackReport>,
}

pub async fn associate<F>(
    uow: &Coordinator,
    client_id: i64,
    plan_id: i64,
    compatible: F,
) -> Result<client_plan::Model, AppError>
where
    F: Fn(&client::Model, &plan::Model) -> bool,
{
    let scope = uow.begin("associate plan").await?;
    let result = associate_in(&scope, client_id, plan_id, compatible).await;
    scope.finish(result).await
}

pub async fn associate_in<F>(
    scope: &Scope<'_>,
    client_id: i64,
    plan_id: i64,
    compatible: F,
) -> Result<client_plan::Model, AppError>
where
    F: Fn(&client::Model, &plan::Model) -> bool,
{
    let client = repo::client::require(scope.conn(), client_id).await?;
    let plan = repo::plan::require(scope.conn(), plan_id).await?;
    ensure_linkable(&client, &plan, &compatible)?;
    if repo::association::exists(scope.conn(), client_id, plan_id).await? {
        return Err(ConsistencyViolation::AlreadyAssociated { client_id, plan_id }.into());
    }
    scope
        .step(
            link_label(client_id, plan_id),
            repo::association::link(scope.conn(), client_id, plan_id),
        )
        .await
}

/// Checks every rule for a new link except its prior existence.
pub fn ensure_linkable<F>(
    client: &client::Model,
    plan: &plan::Model,
    compatible: &F,
) -> Result<(), AppError>
where
    F: Fn(&client::Model, &plan::Model) -> bool,
{
    if !client.active {
        return Err(ConsistencyViolation::ClientInactive {
            client_id: client.id,
        }
        .into());
    }
    if plan.state != PlanState::Active.as_str() {
        return Err(ConsistencyViolation::PlanNotActive {
            plan_id: plan.id,
            state: plan.state.clone(),
        }
        .into());
    }
    if !compatible(client, plan) {
        return Err(ConsistencyViolation::IncompatibleLevel {
            client_id: client.id,
            plan_id: plan.id,
            client_level: client.level.clone(),
            plan_level: plan.level.clone(),
        }
        .into());
    }
    Ok(())
}

pub async fn disassociate(
    uow: &Coordinator,
    client_id: i64,
    plan_id: i64,
    cascade_contracts: bool,
    reason: &str,
) -> Result<Disassociation, AppError> {
    let scope = uow.begin("disassociate plan").await?;
    let result = disassociate_in(&scope, client_id, plan_id, cascade_contracts, reason).await;
    scope.finish(result).await
}

pub async fn disassociate_in(
    scope: &Scope<'_>,
    client_id: i64,
    plan_id: i64,
    cascade_contracts: bool,
    reason: &str,
) -> Result<Disassociation, AppError> {
    repo::client::require(scope.conn(), client_id).await?;
    repo::plan::require(scope.conn(), plan_id).await?;
    if !repo::association::exists(scope.conn(), client_id, plan_id).await? {
        return Err(ConsistencyViolation::NotAssociated { client_id, plan_id }.into());
    }

    let mut contract_cascade = None;
    if let Some(active) =
        repo::contract::find_active_by_client_and_plan(scope.conn(), client_id, plan_id).await?
    {
        if !cascade_contracts {
            return Err(ConsistencyViolation::ActiveContractExists {
                client_id,
                plan_id,
                contract_id: active.id,
            }
            .into());
        }
        let report = cascade::contract_in(scope, active.id, reason).await?;
        let clean = report.success;
        contract_cascade = Some(report);
        if !clean {
            // The contract may still be active; keep the link so the pair stays consistent.
            return Ok(Disassociation {
                client_id,
                plan_id,
                unlinked: false,
                contract_cascade,
            });
        }
    }

    // The contract cascade already drops the link when it cancels the last active contract.
    let unlinked = if repo::association::exists(scope.conn(), client_id, plan_id).await? {
        scope
            .step(
                unlink_label(client_id, plan_id),
                repo::association::unlink(scope.conn(), client_id, plan_id),
            )
            .await?
    } else {
        true
    };

    Ok(Disassociation {
        client_id,
        plan_id,
        unlinked,
        contract_cascade,
    })
}

pub fn link_label(client_id: i64, plan_id: i64) -> String {
    format!("link client {client_id} to plan {plan_id}")
}

pub fn unlink_label(client_id: i64, plan_id: i64) -> String {
    format!("unlink client {client_id} from plan {plan_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContractState, Level, PlanState};
    use crate::repo::contract::NewContract;
    use crate::test_support::{client, plan, setup_db};
    use crate::uow::ExecutionMode;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    async fn symmetric(uow: &Coordinator, client_id: i64, plan_id: i64) -> (bool, bool) {
        let db = uow.connection();
        let plans = repo::association::plans_for_client(db, client_id)
            .await
            .expect("plans");
        let clients = repo::association::clients_for_plan(db, plan_id)
            .await
            .expect("clients");
        (
            plans.iter().any(|plan| plan.id == plan_id),
            clients.iter().any(|client| client.id == client_id),
        )
    }

    #[tokio::test]
    async fn associate_links_both_directions() {
        let (_dir, db) = setup_db().await;
        let uow = Coordinator::new(db.clone(), ExecutionMode::Atomic);
        let c = client(&db, Level::Beginner).await;
        let p = plan(&db, Level::Beginner).await;

        associate(&uow, c.id, p.id, level_compatible)
            .await
            .expect("associate");

        assert_eq!(symmetric(&uow, c.id, p.id).await, (true, true));
    }

    #[tokio::test]
    async fn associate_rejects_missing_entities() {
        let (_dir, db) = setup_db().await;
        let uow = Coordinator::new(db.clone(), ExecutionMode::Atomic);
        let p = plan(&db, Level::Beginner).await;

        let err = associate(&uow, 42, p.id, level_compatible)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(message) if message.contains("client id 42")));
    }

    #[tokio::test]
    async fn associate_rejects_incompatible_level() {
        let (_dir, db) = setup_db().await;
        let uow = Coordinator::new(db.clone(), ExecutionMode::Atomic);
        let c = client(&db, Level::Beginner).await;
        let p = plan(&db, Level::Advanced).await;

        let err = associate(&uow, c.id, p.id, level_compatible)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Consistency(ConsistencyViolation::IncompatibleLevel { .. })
        ));
        assert_eq!(symmetric(&uow, c.id, p.id).await, (false, false));
    }

    #[tokio::test]
    async fn associate_accepts_custom_predicate() {
        let (_dir, db) = setup_db().await;
        let uow = Coordinator::new(db.clone(), ExecutionMode::Atomic);
        let c = client(&db, Level::Beginner).await;
        let p = plan(&db, Level::Advanced).await;

        associate(&uow, c.id, p.id, |_, _| true)
            .await
            .expect("associate with permissive rule");
        assert_eq!(symmetric(&uow, c.id, p.id).await, (true, true));
    }

    #[tokio::test]
    async fn associate_twice_is_rejected() {
        let (_dir, db) = setup_db().await;
        let uow = Coordinator::new(db.clone(), ExecutionMode::Atomic);
        let c = client(&db, Level::Advanced).await;
        let p = plan(&db, Level::Beginner).await;

        associate(&uow, c.id, p.id, level_compatible)
            .await
            .expect("first");
        let err = associate(&uow, c.id, p.id, level_compatible)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Consistency(ConsistencyViolation::AlreadyAssociated { .. })
        ));
    }

    #[tokio::test]
    async fn associate_rejects_inactive_plan() {
        let (_dir, db) = setup_db().await;
        let uow = Coordinator::new(db.clone(), ExecutionMode::Atomic);
        let c = client(&db, Level::Advanced).await;
        let p = plan(&db, Level::Beginner).await;
        repo::plan::set_state(&db, p.id, PlanState::Canceled)
            .await
            .expect("cancel plan");

        let err = associate(&uow, c.id, p.id, level_compatible)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Consistency(ConsistencyViolation::PlanNotActive { .. })
        ));
    }

    #[tokio::test]
    async fn disassociate_requires_existing_link() {
        let (_dir, db) = setup_db().await;
        let uow = Coordinator::new(db.clone(), ExecutionMode::Atomic);
        let c = client(&db, Level::Beginner).await;
        let p = plan(&db, Level::Beginner).await;

        let err = disassociate(&uow, c.id, p.id, false, "test")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Consistency(ConsistencyViolation::NotAssociated { .. })
        ));
    }

    #[tokio::test]
    async fn disassociate_blocks_on_active_contract_without_cascade() {
        let (_dir, db) = setup_db().await;
        let uow = Coordinator::new(db.clone(), ExecutionMode::Atomic);
        let c = client(&db, Level::Beginner).await;
        let p = plan(&db, Level::Beginner).await;
        associate(&uow, c.id, p.id, level_compatible)
            .await
            .expect("associate");
        let contract = repo::contract::insert(
            &db,
            NewContract {
                client_id: c.id,
                plan_id: p.id,
                price_cents: 5_000,
                start_date: date(2026, 1, 1),
                end_date: date(2026, 2, 1),
                renewed_from: None,
            },
        )
        .await
        .expect("contract");

        let err = disassociate(&uow, c.id, p.id, false, "test")
            .await
            .unwrap_err();
        match err {
            AppError::Consistency(ConsistencyViolation::ActiveContractExists {
                contract_id, ..
            }) => assert_eq!(contract_id, contract.id),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(symmetric(&uow, c.id, p.id).await, (true, true));
    }

    #[tokio::test]
    async fn disassociate_with_cascade_cancels_contract_and_unlinks() {
        let (_dir, db) = setup_db().await;
        let uow = Coordinator::new(db.clone(), ExecutionMode::Atomic);
        let c = client(&db, Level::Beginner).await;
        let p = plan(&db, Level::Beginner).await;
        associate(&uow, c.id, p.id, level_compatible)
            .await
            .expect("associate");
        let contract = repo::contract::insert(
            &db,
            NewContract {
                client_id: c.id,
                plan_id: p.id,
                price_cents: 5_000,
                start_date: date(2026, 1, 1),
                end_date: date(2026, 2, 1),
                renewed_from: None,
            },
        )
        .await
        .expect("contract");

        let outcome = disassociate(&uow, c.id, p.id, true, "plan dropped")
            .await
            .expect("disassociate");

        assert!(outcome.unlinked);
        let report = outcome.contract_cascade.expect("cascade report");
        assert_eq!(report.contracts_canceled, 1);
        let stored = repo::contract::require(&db, contract.id)
            .await
            .expect("contract");
        assert_eq!(stored.state, ContractState::Canceled.as_str());
        assert_eq!(symmetric(&uow, c.id, p.id).await, (false, false));
    }

    #[tokio::test]
    async fn symmetry_holds_across_associate_disassociate_sequences() {
        let (_dir, db) = setup_db().await;
        let uow = Coordinator::new(db.clone(), ExecutionMode::Atomic);
        let c = client(&db, Level::Advanced).await;
        let p1 = plan(&db, Level::Beginner).await;
        let p2 = plan(&db, Level::Intermediate).await;

        associate(&uow, c.id, p1.id, level_compatible).await.expect("p1");
        associate(&uow, c.id, p2.id, level_compatible).await.expect("p2");
        disassociate(&uow, c.id, p1.id, false, "swap").await.expect("drop p1");
        associate(&uow, c.id, p1.id, level_compatible).await.expect("p1 again");
        disassociate(&uow, c.id, p2.id, false, "swap").await.expect("drop p2");

        assert_eq!(symmetric(&uow, c.id, p1.id).await, (true, true));
        assert_eq!(symmetric(&uow, c.id, p2.id).await, (false, false));
        let plans = repo::association::plans_for_client(&db, c.id)
            .await
            .expect("plans");
        assert_eq!(plans.iter().map(|plan| plan.id).collect::<Vec<_>>(), vec![p1.id]);
    }
}
