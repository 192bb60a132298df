use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{HOME_ENV, MODE_ENV};

#[derive(Parser, Debug)]
#[command(
    name = "gymledger",
    version,
    about = "Manage gym clients, plans and contracts with SQLite"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        env = HOME_ENV,
        help = "Data directory holding gymledger.db (default: ~/.gymledger)"
    )]
    pub home: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_enum,
        env = MODE_ENV,
        default_value = "auto",
        help = "How multi-step writes run: atomic scopes, sequential steps, or auto-detect"
    )]
    pub mode: ModeArg,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(subcommand)]
    Client(ClientCommand),
    #[command(subcommand)]
    Plan(PlanCommand),
    #[command(subcommand)]
    Contract(ContractCommand),
    #[command(subcommand)]
    Progress(ProgressCommand),
    #[command(subcommand)]
    Finance(FinanceCommand),
    #[command(subcommand)]
    Audit(AuditCommand),
    /// Repair drift left by interrupted sequential-mode writes
    Reconcile,
}

#[derive(Subcommand, Debug)]
pub enum ClientCommand {
    Add(ClientAdd),
    List,
    Show(IdArg),
    Update(ClientUpdate),
    Remove(Removal),
}

#[derive(Subcommand, Debug)]
pub enum PlanCommand {
    Add(PlanAdd),
    List,
    Show(IdArg),
    State(PlanStateChange),
    Remove(Removal),
    Associate(PairArgs),
    Disassociate(PlanDisassociate),
}

#[derive(Subcommand, Debug)]
pub enum ContractCommand {
    Create(ContractCreate),
    Show(IdArg),
    List(ContractList),
    Cancel(ContractCancel),
    Renew(ContractRenew),
    Expire(ContractExpire),
}

#[derive(Subcommand, Debug)]
pub enum ProgressCommand {
    Add(ProgressAdd),
    List(ProgressList),
}

#[derive(Subcommand, Debug)]
pub enum FinanceCommand {
    Add(FinanceAdd),
    List(FinanceList),
}

#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    List,
}

#[derive(Args, Debug)]
pub struct IdArg {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct ClientAdd {
    pub name: String,
    #[arg(long, value_enum, default_value = "beginner")]
    pub level: LevelArg,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
}

#[derive(Args, Debug)]
pub struct ClientUpdate {
    pub id: i64,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, value_enum)]
    pub level: Option<LevelArg>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long, conflicts_with = "deactivate")]
    pub activate: bool,
    #[arg(long)]
    pub deactivate: bool,
}

#[derive(Args, Debug)]
pub struct Removal {
    pub id: i64,
    #[arg(long, help = "Remove even when active links or contracts remain")]
    pub force: bool,
    #[arg(long, default_value = "removed")]
    pub reason: String,
}

#[derive(Args, Debug)]
pub struct PlanAdd {
    pub name: String,
    #[arg(long, value_enum, default_value = "beginner")]
    pub level: LevelArg,
}

#[derive(Args, Debug)]
pub struct PlanStateChange {
    pub id: i64,
    #[arg(value_enum)]
    pub state: PlanStateArg,
}

#[derive(Args, Debug)]
pub struct PairArgs {
    #[arg(long = "client")]
    pub client_id: i64,
    #[arg(long = "plan")]
    pub plan_id: i64,
}

#[derive(Args, Debug)]
pub struct PlanDisassociate {
    #[command(flatten)]
    pub pair: PairArgs,
    #[arg(long, help = "Cancel the pair's active contract first")]
    pub cascade: bool,
    #[arg(long, default_value = "plan disassociated")]
    pub reason: String,
}

#[derive(Args, Debug)]
pub struct ContractCreate {
    #[command(flatten)]
    pub pair: PairArgs,
    #[arg(long, value_name = "AMOUNT", help = "Price as a decimal amount, e.g. 49.90")]
    pub price: String,
    #[arg(long, default_value_t = 1)]
    pub months: u32,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub start: Option<NaiveDate>,
    #[arg(long, help = "Book the price as an inflow in the ledger")]
    pub paid: bool,
}

#[derive(Args, Debug)]
pub struct ContractList {
    #[arg(long = "client")]
    pub client_id: Option<i64>,
    #[arg(long = "plan")]
    pub plan_id: Option<i64>,
    #[arg(long, value_enum)]
    pub state: Option<ContractStateArg>,
}

#[derive(Args, Debug)]
pub struct ContractCancel {
    pub id: i64,
    #[arg(long, default_value = "canceled")]
    pub reason: String,
}

#[derive(Args, Debug)]
pub struct ContractRenew {
    pub id: i64,
    #[arg(long, default_value_t = 1)]
    pub months: u32,
    #[arg(long, value_name = "AMOUNT")]
    pub price: Option<String>,
    #[arg(long)]
    pub paid: bool,
}

#[derive(Args, Debug)]
pub struct ContractExpire {
    #[arg(long, value_name = "YYYY-MM-DD", help = "Reference day (default: today)")]
    pub today: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub struct ProgressAdd {
    #[arg(long = "client")]
    pub client_id: i64,
    #[arg(long = "contract")]
    pub contract_id: i64,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<NaiveDate>,
    #[arg(long)]
    pub weight: Option<f64>,
    #[arg(long)]
    pub body_fat: Option<f64>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Args, Debug)]
pub struct ProgressList {
    #[arg(long = "client")]
    pub client_id: Option<i64>,
    #[arg(long = "contract")]
    pub contract_id: Option<i64>,
}

#[derive(Args, Debug)]
pub struct FinanceAdd {
    #[arg(value_enum)]
    pub kind: MovementKindArg,
    #[arg(value_name = "AMOUNT")]
    pub amount: String,
    pub description: String,
    #[arg(long = "client")]
    pub client_id: Option<i64>,
    #[arg(long = "contract")]
    pub contract_id: Option<i64>,
}

#[derive(Args, Debug)]
pub struct FinanceList {
    #[arg(long = "client")]
    pub client_id: Option<i64>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ModeArg {
    Auto,
    Atomic,
    Sequential,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LevelArg {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum PlanStateArg {
    Active,
    Canceled,
    Finished,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ContractStateArg {
    Active,
    Canceled,
    Finished,
    Renewed,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum MovementKindArg {
    Inflow,
    Outflow,
}
