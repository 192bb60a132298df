use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use sea_orm::{ConnectionTrait, Database, DatabaseBackend, Statement};
use tempfile::TempDir;
use url::Url;

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_gymledger"))
}

fn run_cmd_with_mode(dir: &TempDir, mode: Option<&str>, args: &[&str]) -> Output {
    let mut cmd = Command::new(bin_path());
    cmd.arg("--home").arg(dir.path());
    if let Some(mode) = mode {
        cmd.arg("--mode").arg(mode);
    }
    cmd.args(args);
    cmd.env_remove("GYMLEDGER_HOME")
        .env_remove("GYMLEDGER_MODE")
        .env_remove("RUST_LOG");
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.output().expect("run command")
}

fn run_cmd(dir: &TempDir, args: &[&str]) -> Output {
    run_cmd_with_mode(dir, None, args)
}

fn output_stdout(output: Output) -> String {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("stdout utf8")
}

fn output_stderr(output: Output) -> String {
    assert!(
        !output.status.success(),
        "expected failure, stdout: {}",
        String::from_utf8_lossy(&output.stdout)
    );
    String::from_utf8(output.stderr).expect("stderr utf8")
}

fn parse_created_id(stdout: &str, kind: &str) -> i64 {
    let prefix = format!("Created {kind} ID: ");
    let line = stdout
        .lines()
        .find(|line| line.starts_with(&prefix))
        .unwrap_or_else(|| panic!("no {kind} id in output: {stdout}"));
    let rest = &line[prefix.len()..];
    let id_str = rest
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .expect("id");
    id_str.parse().expect("id parse")
}

fn create_client(dir: &TempDir, name: &str, level: &str) -> i64 {
    let stdout = output_stdout(run_cmd(dir, &["client", "add", name, "--level", level]));
    parse_created_id(&stdout, "client")
}

fn create_plan(dir: &TempDir, name: &str, level: &str) -> i64 {
    let stdout = output_stdout(run_cmd(dir, &["plan", "add", name, "--level", level]));
    parse_created_id(&stdout, "plan")
}

fn create_contract(dir: &TempDir, client_id: i64, plan_id: i64, paid: bool) -> String {
    let client = client_id.to_string();
    let plan = plan_id.to_string();
    let mut args = vec![
        "contract",
        "create",
        "--client",
        client.as_str(),
        "--plan",
        plan.as_str(),
        "--price",
        "49.90",
        "--start",
        "2026-01-01",
    ];
    if paid {
        args.push("--paid");
    }
    output_stdout(run_cmd(dir, &args))
}

fn sqlite_url(dir: &TempDir) -> String {
    let db_path = dir.path().join("gymledger.db");
    let mut url = Url::from_file_path(&db_path).expect("db path");
    url.set_query(Some("mode=rwc"));
    url.as_str().replacen("file://", "sqlite://", 1)
}

#[test]
fn client_add_and_show() {
    let dir = TempDir::new().expect("temp dir");
    let client_id = create_client(&dir, "Ana", "intermediate");

    let stdout = output_stdout(run_cmd(&dir, &["client", "show", &client_id.to_string()]));
    assert!(stdout.contains(&format!("Client ID: {client_id}")));
    assert!(stdout.contains("Level: intermediate"));
    assert!(stdout.contains("Plans: (none)"));
}

#[test]
fn contract_create_links_pair_and_books_payment() {
    let dir = TempDir::new().expect("temp dir");
    let client_id = create_client(&dir, "Ana", "advanced");
    let plan_id = create_plan(&dir, "Strength", "intermediate");

    let stdout = create_contract(&dir, client_id, plan_id, true);
    let contract_id = parse_created_id(&stdout, "contract");
    assert!(stdout.contains("Period: 2026-01-01 to 2026-02-01"));
    assert!(stdout.contains(&format!(
        "Associated client ID: {client_id} with plan ID: {plan_id}"
    )));
    parse_created_id(&stdout, "financial record");

    let plan_show = output_stdout(run_cmd(&dir, &["plan", "show", &plan_id.to_string()]));
    assert!(plan_show.contains(&format!("client id {client_id}")));
    assert!(plan_show.contains(&format!("contract id {contract_id}")));

    let ledger = output_stdout(run_cmd(&dir, &["finance", "list"]));
    assert!(ledger.contains("[inflow] 49.90"));
    assert!(ledger.ends_with("Balance: 49.90\n"));
}

#[test]
fn duplicate_active_contract_is_rejected() {
    let dir = TempDir::new().expect("temp dir");
    let client_id = create_client(&dir, "Ana", "beginner");
    let plan_id = create_plan(&dir, "Cardio", "beginner");
    create_contract(&dir, client_id, plan_id, false);

    let client = client_id.to_string();
    let plan = plan_id.to_string();
    let stderr = output_stderr(run_cmd(
        &dir,
        &[
            "contract", "create", "--client", &client, "--plan", &plan, "--price", "10",
        ],
    ));
    assert!(stderr.contains("Consistency violation"));
    assert!(stderr.contains("already has active contract"));
}

#[test]
fn incompatible_level_blocks_association() {
    let dir = TempDir::new().expect("temp dir");
    let client_id = create_client(&dir, "Ana", "beginner");
    let plan_id = create_plan(&dir, "Power", "advanced");

    let stderr = output_stderr(run_cmd(
        &dir,
        &[
            "plan",
            "associate",
            "--client",
            &client_id.to_string(),
            "--plan",
            &plan_id.to_string(),
        ],
    ));
    assert!(stderr.contains("is not compatible with client"));
}

#[test]
fn cancel_contract_cascades_and_is_idempotent() {
    let dir = TempDir::new().expect("temp dir");
    let client_id = create_client(&dir, "C1", "intermediate");
    let plan_id = create_plan(&dir, "P1", "intermediate");
    let contract_id = parse_created_id(&create_contract(&dir, client_id, plan_id, false), "contract");
    let client = client_id.to_string();
    let contract = contract_id.to_string();
    for date in ["2026-01-05", "2026-01-12"] {
        output_stdout(run_cmd(
            &dir,
            &[
                "progress", "add", "--client", &client, "--contract", &contract, "--date", date,
                "--weight", "72.5",
            ],
        ));
    }

    let stdout = output_stdout(run_cmd(
        &dir,
        &["contract", "cancel", &contract, "--reason", "moved away"],
    ));
    assert!(stdout.contains(&format!("Canceled contract ID: {contract_id}")));
    assert!(stdout.contains("Progress entries deleted: 2"));
    assert!(stdout.contains("Associations removed: 1"));

    let client_show = output_stdout(run_cmd(&dir, &["client", "show", &client]));
    assert!(client_show.contains("Plans: (none)"));
    let progress = output_stdout(run_cmd(&dir, &["progress", "list", "--contract", &contract]));
    assert_eq!(progress.trim(), "No progress entries found.");

    let again = output_stdout(run_cmd(&dir, &["contract", "cancel", &contract]));
    assert_eq!(
        again.trim(),
        format!("Contract ID: {contract_id} was already canceled")
    );

    let audits = output_stdout(run_cmd(&dir, &["audit", "list"]));
    assert_eq!(audits.lines().count(), 2);
    assert!(audits.contains("moved away"));
}

#[test]
fn disassociate_requires_cascade_when_contract_is_active() {
    let dir = TempDir::new().expect("temp dir");
    let client_id = create_client(&dir, "Ana", "beginner");
    let plan_id = create_plan(&dir, "Cardio", "beginner");
    create_contract(&dir, client_id, plan_id, false);
    let client = client_id.to_string();
    let plan = plan_id.to_string();

    let stderr = output_stderr(run_cmd(
        &dir,
        &["plan", "disassociate", "--client", &client, "--plan", &plan],
    ));
    assert!(stderr.contains("use --cascade"));

    let stdout = output_stdout(run_cmd(
        &dir,
        &[
            "plan",
            "disassociate",
            "--client",
            &client,
            "--plan",
            &plan,
            "--cascade",
        ],
    ));
    assert!(stdout.contains(&format!(
        "Disassociated client ID: {client_id} from plan ID: {plan_id}"
    )));
    assert!(stdout.contains("Contracts canceled: 1"));
}

#[test]
fn client_remove_needs_force_and_keeps_ledger() {
    let dir = TempDir::new().expect("temp dir");
    let client_id = create_client(&dir, "Ana", "beginner");
    let plan_id = create_plan(&dir, "Cardio", "beginner");
    create_contract(&dir, client_id, plan_id, true);
    let client = client_id.to_string();

    let stderr = output_stderr(run_cmd(&dir, &["client", "remove", &client]));
    assert!(stderr.contains("Cascade blocked"));

    let stdout = output_stdout(run_cmd(
        &dir,
        &["client", "remove", &client, "--force", "--reason", "left"],
    ));
    assert!(stdout.contains(&format!("Deleted client ID: {client_id}")));
    assert!(stdout.contains("Contracts deleted: 1"));

    let clients = output_stdout(run_cmd(&dir, &["client", "list"]));
    assert_eq!(clients.trim(), "No clients found.");
    let ledger = output_stdout(run_cmd(&dir, &["finance", "list", "--client", &client]));
    assert!(ledger.contains("[inflow] 49.90"));
}

#[test]
fn renew_contract_chains_periods() {
    let dir = TempDir::new().expect("temp dir");
    let client_id = create_client(&dir, "Ana", "beginner");
    let plan_id = create_plan(&dir, "Cardio", "beginner");
    let contract_id = parse_created_id(&create_contract(&dir, client_id, plan_id, false), "contract");

    let stdout = output_stdout(run_cmd(
        &dir,
        &[
            "contract",
            "renew",
            &contract_id.to_string(),
            "--months",
            "2",
            "--price",
            "80",
        ],
    ));
    assert!(stdout.contains(&format!("Renewed contract ID: {contract_id} as contract ID: ")));
    assert!(stdout.contains("Period: 2026-02-01 to 2026-04-01"));

    let active = output_stdout(run_cmd(
        &dir,
        &["contract", "list", "--state", "active"],
    ));
    assert_eq!(active.lines().count(), 1);
    assert!(active.contains("80.00"));
}

#[test]
fn expire_finishes_overdue_contracts() {
    let dir = TempDir::new().expect("temp dir");
    let client_id = create_client(&dir, "Ana", "beginner");
    let plan_id = create_plan(&dir, "Cardio", "beginner");
    create_contract(&dir, client_id, plan_id, false);

    let stdout = output_stdout(run_cmd(
        &dir,
        &["contract", "expire", "--today", "2026-03-01"],
    ));
    assert!(stdout.starts_with("Finished 1 expired contract(s)"));
    assert!(stdout.contains("[finished]"));
}

#[test]
fn sequential_mode_runs_the_same_operations() {
    let dir = TempDir::new().expect("temp dir");
    let client_id = create_client(&dir, "Ana", "beginner");
    let plan_id = create_plan(&dir, "Cardio", "beginner");
    let client = client_id.to_string();
    let plan = plan_id.to_string();

    let stdout = output_stdout(run_cmd_with_mode(
        &dir,
        Some("sequential"),
        &[
            "contract", "create", "--client", &client, "--plan", &plan, "--price", "10",
        ],
    ));
    parse_created_id(&stdout, "contract");
    let reconcile = output_stdout(run_cmd_with_mode(&dir, Some("sequential"), &["reconcile"]));
    assert_eq!(reconcile.trim(), "Nothing to reconcile");
}

#[test]
fn invalid_ids_are_rejected_before_store_access() {
    let dir = TempDir::new().expect("temp dir");
    let stderr = output_stderr(run_cmd(&dir, &["client", "show", "0"]));
    assert!(stderr.contains("Invalid input"));
}

#[tokio::test]
async fn reconcile_restores_missing_association() {
    let dir = TempDir::new().expect("temp dir");
    let client_id = create_client(&dir, "Ana", "beginner");
    let plan_id = create_plan(&dir, "Cardio", "beginner");
    create_contract(&dir, client_id, plan_id, false);

    let db = Database::connect(&sqlite_url(&dir))
        .await
        .expect("connect db");
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "DELETE FROM client_plans;".to_string(),
    ))
    .await
    .expect("drop links");
    db.close().await.expect("close db");

    let stdout = output_stdout(run_cmd(&dir, &["reconcile"]));
    assert!(stdout.contains("1 association(s) restored"));
    assert!(stdout.contains(&format!(
        "Restored link: client id {client_id} -> plan id {plan_id}"
    )));

    let client_show = output_stdout(run_cmd(&dir, &["client", "show", &client_id.to_string()]));
    assert!(client_show.contains(&format!("plan id {plan_id}")));
}
