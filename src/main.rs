mod app;
mod association;
mod cascade;
mod cli;
mod config;
mod db;
mod entities;
mod error;
mod model;
mod repo;
mod uow;
mod util;

#[cfg(test)]
mod test_support;

use chrono::Utc;
use clap::Parser;

use crate::app::App;
use crate::cli::{
    AuditCommand, Cli, ClientAdd, ClientCommand, ClientUpdate, Command, ContractCancel,
    ContractCommand, ContractCreate, ContractList, ContractRenew, ContractStateArg, FinanceAdd,
    FinanceCommand, LevelArg, ModeArg, MovementKindArg, PlanAdd, PlanCommand, PlanDisassociate,
    PlanStateArg, ProgressAdd, ProgressCommand, Removal,
};
use crate::config::{ModePreference, Settings};
use crate::error::AppError;
use crate::model::{
    parse_amount, ClientChanges, ClientInput, ContractInput, ContractQuery, ContractState, Level,
    MovementInput, MovementKind, PlanInput, PlanState, ProgressInput, RenewInput,
};
use crate::util::{
    format_audit_list, format_client_detail, format_client_list, format_contract_detail,
    format_contract_list, format_financial_list, format_plan_detail, format_plan_list,
    format_progress_list, format_reconcile_report, format_rollback_report,
};

#[tokio::main]
async fn main() {
    config::init_logging();
    if let Err(err) = run().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let Cli {
        home,
        mode,
        command,
    } = Cli::parse();

    let settings = Settings::resolve(home, mode_from_arg(mode))?;
    let db_path = settings.db_path();
    db::ensure_parent_dir(&db_path)?;
    let mut lock = db::open_lock(&db_path)?;
    let _guard = lock.write()?;

    let db = db::connect(&db_path).await?;
    db::ensure_schema(&db).await?;
    let supported = db::probe_atomic_support(&db).await;
    let mode = config::decide_mode(settings.mode, supported)?;
    tracing::info!(db = %db_path.display(), mode = mode.as_str(), "store ready");
    let app = App::new(db, mode);

    match command {
        Command::Client(command) => handle_client(&app, command).await,
        Command::Plan(command) => handle_plan(&app, command).await,
        Command::Contract(command) => handle_contract(&app, command).await,
        Command::Progress(command) => handle_progress(&app, command).await,
        Command::Finance(command) => handle_finance(&app, command).await,
        Command::Audit(AuditCommand::List) => {
            let audits = app.list_cascade_audits().await?;
            println!("{}", format_audit_list(&audits));
            Ok(())
        }
        Command::Reconcile => {
            let outcome = app.reconcile().await?;
            println!("{}", outcome.message);
            if !outcome.data.is_clean() {
                println!("{}", format_reconcile_report(&outcome.data));
            }
            Ok(())
        }
    }
}

async fn handle_client(app: &App, command: ClientCommand) -> Result<(), AppError> {
    match command {
        ClientCommand::Add(args) => handle_client_add(app, args).await,
        ClientCommand::List => {
            let clients = app.list_clients().await?;
            println!("{}", format_client_list(&clients));
            Ok(())
        }
        ClientCommand::Show(args) => {
            let detail = app.get_client_detail(args.id).await?;
            println!("{}", format_client_detail(&detail));
            Ok(())
        }
        ClientCommand::Update(args) => handle_client_update(app, args).await,
        ClientCommand::Remove(args) => handle_client_remove(app, args).await,
    }
}

async fn handle_client_add(app: &App, args: ClientAdd) -> Result<(), AppError> {
    let outcome = app
        .add_client(ClientInput {
            name: args.name,
            email: args.email,
            phone: args.phone,
            level: level_from_arg(args.level),
        })
        .await?;
    println!("{}: {}", outcome.message, outcome.data.name);
    Ok(())
}

async fn handle_client_update(app: &App, args: ClientUpdate) -> Result<(), AppError> {
    let active = match (args.activate, args.deactivate) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    };
    let changes = ClientChanges {
        name: args.name,
        email: args.email,
        phone: args.phone,
        level: args.level.map(level_from_arg),
        active,
    };
    if changes.name.is_none()
        && changes.email.is_none()
        && changes.phone.is_none()
        && changes.level.is_none()
        && changes.active.is_none()
    {
        return Err(AppError::Validation(
            "client update requires at least one change".to_string(),
        ));
    }
    let outcome = app.update_client(args.id, changes).await?;
    println!("{}", outcome.message);
    Ok(())
}

async fn handle_client_remove(app: &App, args: Removal) -> Result<(), AppError> {
    let outcome = app.delete_client(args.id, &args.reason, args.force).await?;
    println!("{}", outcome.message);
    if outcome.data.affected() > 0 || !outcome.data.errors.is_empty() {
        println!("{}", format_rollback_report(&outcome.data));
    }
    Ok(())
}

async fn handle_plan(app: &App, command: PlanCommand) -> Result<(), AppError> {
    match command {
        PlanCommand::Add(args) => handle_plan_add(app, args).await,
        PlanCommand::List => {
            let plans = app.list_plans().await?;
            println!("{}", format_plan_list(&plans));
            Ok(())
        }
        PlanCommand::Show(args) => {
            let detail = app.get_plan_detail(args.id).await?;
            println!("{}", format_plan_detail(&detail));
            Ok(())
        }
        PlanCommand::State(args) => {
            let outcome = app
                .set_plan_state(args.id, plan_state_from_arg(args.state))
                .await?;
            println!("{}", outcome.message);
            Ok(())
        }
        PlanCommand::Remove(args) => {
            let outcome = app.delete_plan(args.id, &args.reason, args.force).await?;
            println!("{}", outcome.message);
            if outcome.data.affected() > 0 || !outcome.data.errors.is_empty() {
                println!("{}", format_rollback_report(&outcome.data));
            }
            Ok(())
        }
        PlanCommand::Associate(args) => {
            let outcome = app.associate_plan(args.client_id, args.plan_id).await?;
            println!("{}", outcome.message);
            Ok(())
        }
        PlanCommand::Disassociate(args) => handle_plan_disassociate(app, args).await,
    }
}

async fn handle_plan_add(app: &App, args: PlanAdd) -> Result<(), AppError> {
    let outcome = app
        .add_plan(PlanInput {
            name: args.name,
            level: level_from_arg(args.level),
        })
        .await?;
    println!("{}: {}", outcome.message, outcome.data.name);
    Ok(())
}

async fn handle_plan_disassociate(app: &App, args: PlanDisassociate) -> Result<(), AppError> {
    let outcome = app
        .disassociate_plan(
            args.pair.client_id,
            args.pair.plan_id,
            args.cascade,
            &args.reason,
        )
        .await?;
    println!("{}", outcome.message);
    if let Some(report) = &outcome.data.contract_cascade {
        println!("{}", format_rollback_report(report));
    }
    Ok(())
}

async fn handle_contract(app: &App, command: ContractCommand) -> Result<(), AppError> {
    match command {
        ContractCommand::Create(args) => handle_contract_create(app, args).await,
        ContractCommand::Show(args) => {
            let detail = app.get_contract(args.id).await?;
            println!("{}", format_contract_detail(&detail));
            Ok(())
        }
        ContractCommand::List(args) => handle_contract_list(app, args).await,
        ContractCommand::Cancel(args) => handle_contract_cancel(app, args).await,
        ContractCommand::Renew(args) => handle_contract_renew(app, args).await,
        ContractCommand::Expire(args) => {
            let today = args.today.unwrap_or_else(|| Utc::now().date_naive());
            let outcome = app.expire_contracts(today).await?;
            println!("{}", outcome.message);
            if !outcome.data.is_empty() {
                println!("{}", format_contract_list(&outcome.data));
            }
            Ok(())
        }
    }
}

async fn handle_contract_create(app: &App, args: ContractCreate) -> Result<(), AppError> {
    let outcome = app
        .create_contract(ContractInput {
            client_id: args.pair.client_id,
            plan_id: args.pair.plan_id,
            price_cents: parse_amount(&args.price)?,
            months: args.months,
            start: args.start,
            record_payment: args.paid,
        })
        .await?;
    println!("{}", outcome.message);
    let created = outcome.data;
    println!(
        "Period: {} to {}",
        created.contract.start_date, created.contract.end_date
    );
    if created.linked.is_some() {
        println!(
            "Associated client ID: {} with plan ID: {}",
            created.contract.client_id, created.contract.plan_id
        );
    }
    if let Some(payment) = created.payment {
        println!("Created financial record ID: {}", payment.id);
    }
    Ok(())
}

async fn handle_contract_list(app: &App, args: ContractList) -> Result<(), AppError> {
    let contracts = app
        .list_contracts(ContractQuery {
            client_id: args.client_id,
            plan_id: args.plan_id,
            state: args.state.map(contract_state_from_arg),
        })
        .await?;
    println!("{}", format_contract_list(&contracts));
    Ok(())
}

async fn handle_contract_cancel(app: &App, args: ContractCancel) -> Result<(), AppError> {
    let outcome = app.cancel_contract(args.id, &args.reason).await?;
    println!("{}", outcome.message);
    if outcome.data.affected() > 0 || !outcome.data.errors.is_empty() {
        println!("{}", format_rollback_report(&outcome.data));
    }
    Ok(())
}

async fn handle_contract_renew(app: &App, args: ContractRenew) -> Result<(), AppError> {
    let price_cents = args.price.as_deref().map(parse_amount).transpose()?;
    let outcome = app
        .renew_contract(
            args.id,
            RenewInput {
                months: args.months,
                price_cents,
                record_payment: args.paid,
            },
        )
        .await?;
    println!("{}", outcome.message);
    let renewed = outcome.data;
    println!(
        "Period: {} to {}",
        renewed.contract.start_date, renewed.contract.end_date
    );
    if let Some(payment) = renewed.payment {
        println!("Created financial record ID: {}", payment.id);
    }
    Ok(())
}

async fn handle_progress(app: &App, command: ProgressCommand) -> Result<(), AppError> {
    match command {
        ProgressCommand::Add(args) => handle_progress_add(app, args).await,
        ProgressCommand::List(args) => {
            let entries = app.list_progress(args.client_id, args.contract_id).await?;
            println!("{}", format_progress_list(&entries));
            Ok(())
        }
    }
}

async fn handle_progress_add(app: &App, args: ProgressAdd) -> Result<(), AppError> {
    let outcome = app
        .add_progress_entry(ProgressInput {
            client_id: args.client_id,
            contract_id: args.contract_id,
            date: args.date,
            weight_kg: args.weight,
            body_fat_pct: args.body_fat,
            notes: args.notes,
        })
        .await?;
    println!("{}", outcome.message);
    Ok(())
}

async fn handle_finance(app: &App, command: FinanceCommand) -> Result<(), AppError> {
    match command {
        FinanceCommand::Add(args) => handle_finance_add(app, args).await,
        FinanceCommand::List(args) => {
            let records = app.list_financial_records(args.client_id).await?;
            println!("{}", format_financial_list(&records));
            Ok(())
        }
    }
}

async fn handle_finance_add(app: &App, args: FinanceAdd) -> Result<(), AppError> {
    let outcome = app
        .record_movement(MovementInput {
            kind: movement_kind_from_arg(args.kind),
            amount_cents: parse_amount(&args.amount)?,
            client_id: args.client_id,
            contract_id: args.contract_id,
            description: args.description,
        })
        .await?;
    println!("{}", outcome.message);
    Ok(())
}

fn mode_from_arg(arg: ModeArg) -> ModePreference {
    match arg {
        ModeArg::Auto => ModePreference::Auto,
        ModeArg::Atomic => ModePreference::Atomic,
        ModeArg::Sequential => ModePreference::Sequential,
    }
}

fn level_from_arg(arg: LevelArg) -> Level {
    match arg {
        LevelArg::Beginner => Level::Beginner,
        LevelArg::Intermediate => Level::Intermediate,
        LevelArg::Advanced => Level::Advanced,
    }
}

fn plan_state_from_arg(arg: PlanStateArg) -> PlanState {
    match arg {
        PlanStateArg::Active => PlanState::Active,
        PlanStateArg::Canceled => PlanState::Canceled,
        PlanStateArg::Finished => PlanState::Finished,
    }
}

fn contract_state_from_arg(arg: ContractStateArg) -> ContractState {
    match arg {
        ContractStateArg::Active => ContractState::Active,
        ContractStateArg::Canceled => ContractState::Canceled,
        ContractStateArg::Finished => ContractState::Finished,
        ContractStateArg::Renewed => ContractState::Renewed,
    }
}

fn movement_kind_from_arg(arg: MovementKindArg) -> MovementKind {
    match arg {
        MovementKindArg::Inflow => MovementKind::Inflow,
        MovementKindArg::Outflow => MovementKind::Outflow,
    }
}
