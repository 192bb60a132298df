use chrono::{DateTime, Utc};

use crate::app::{ClientDetail, ContractDetail, PlanDetail, ReconcileReport};
use crate::cascade::RollbackReport;
use crate::entities::{cascade_audit, client, contract, financial_record, plan, progress_entry};
use crate::model::{format_amount, MovementKind};

fn has_text(value: &Option<String>) -> bool {
    value
        .as_deref()
        .map(|text| !text.trim().is_empty())
        .unwrap_or(false)
}

pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

fn contract_line(contract: &contract::Model) -> String {
    format!(
        "- [{}] contract id {} (client id {}, plan id {}, {} to {}, {})",
        contract.state,
        contract.id,
        contract.client_id,
        contract.plan_id,
        contract.start_date,
        contract.end_date,
        format_amount(contract.price_cents)
    )
}

pub fn format_client_detail(detail: &ClientDetail) -> String {
    let client = &detail.client;
    let mut output = String::new();
    output.push_str(&format!("Client ID: {}\n", client.id));
    output.push_str(&format!("Name: {}\n", client.name));
    output.push_str(&format!("Level: {}\n", client.level));
    output.push_str(&format!(
        "Status: {}\n",
        if client.active { "active" } else { "inactive" }
    ));
    if has_text(&client.email) {
        output.push_str(&format!("Email: {}\n", client.email.as_deref().unwrap_or("")));
    }
    if has_text(&client.phone) {
        output.push_str(&format!("Phone: {}\n", client.phone.as_deref().unwrap_or("")));
    }
    output.push_str(&format!("Created: {}\n", format_datetime(client.created_at)));
    output.push_str(&format!("Updated: {}\n", format_datetime(client.updated_at)));
    output.push('\n');
    if detail.plans.is_empty() {
        output.push_str("Plans: (none)\n");
    } else {
        output.push_str("Plans:\n");
        for plan in &detail.plans {
            output.push_str(&format!(
                "- [{}] {} (plan id {}, {})\n",
                plan.state, plan.name, plan.id, plan.level
            ));
        }
    }
    output.push('\n');
    if detail.contracts.is_empty() {
        output.push_str("Contracts: (none)");
        return output;
    }
    output.push_str("Contracts:\n");
    for contract in &detail.contracts {
        output.push_str(&contract_line(contract));
        output.push('\n');
    }
    output.trim_end().to_string()
}

pub fn format_plan_detail(detail: &PlanDetail) -> String {
    let plan = &detail.plan;
    let mut output = String::new();
    output.push_str(&format!("Plan ID: {}\n", plan.id));
    output.push_str(&format!("Name: {}\n", plan.name));
    output.push_str(&format!("Level: {}\n", plan.level));
    output.push_str(&format!("Status: {}\n", plan.state));
    output.push_str(&format!("Created: {}\n", format_datetime(plan.created_at)));
    output.push_str(&format!("Updated: {}\n", format_datetime(plan.updated_at)));
    output.push('\n');
    if detail.clients.is_empty() {
        output.push_str("Clients: (none)\n");
    } else {
        output.push_str("Clients:\n");
        for client in &detail.clients {
            output.push_str(&format!(
                "- {} (client id {}, {})\n",
                client.name, client.id, client.level
            ));
        }
    }
    output.push('\n');
    if detail.contracts.is_empty() {
        output.push_str("Contracts: (none)");
        return output;
    }
    output.push_str("Contracts:\n");
    for contract in &detail.contracts {
        output.push_str(&contract_line(contract));
        output.push('\n');
    }
    output.trim_end().to_string()
}

pub fn format_contract_detail(detail: &ContractDetail) -> String {
    let contract = &detail.contract;
    let mut output = String::new();
    output.push_str(&format!("Contract ID: {}\n", contract.id));
    output.push_str(&format!("Client ID: {}\n", contract.client_id));
    output.push_str(&format!("Plan ID: {}\n", contract.plan_id));
    output.push_str(&format!("Status: {}\n", contract.state));
    output.push_str(&format!("Price: {}\n", format_amount(contract.price_cents)));
    output.push_str(&format!("Start: {}\n", contract.start_date));
    output.push_str(&format!("End: {}\n", contract.end_date));
    if has_text(&contract.cancel_reason) {
        output.push_str(&format!(
            "Cancel reason: {}\n",
            contract.cancel_reason.as_deref().unwrap_or("")
        ));
    }
    if let Some(previous) = contract.renewed_from {
        output.push_str(&format!("Renewed from: contract id {previous}\n"));
    }
    output.push('\n');
    if detail.progress.is_empty() {
        output.push_str("Progress: (none)");
        return output;
    }
    output.push_str("Progress:\n");
    output.push_str(&format_progress_list(&detail.progress));
    output.trim_end().to_string()
}

pub fn format_client_list(clients: &[client::Model]) -> String {
    if clients.is_empty() {
        return "No clients found.".to_string();
    }
    let mut output = String::from("ID\tLEVEL\tSTATUS\tNAME\n");
    for client in clients {
        output.push_str(&format!(
            "{}\t{}\t{}\t{}\n",
            client.id,
            client.level,
            if client.active { "active" } else { "inactive" },
            client.name
        ));
    }
    output.trim_end().to_string()
}

pub fn format_plan_list(plans: &[plan::Model]) -> String {
    if plans.is_empty() {
        return "No plans found.".to_string();
    }
    let mut output = String::from("ID\tLEVEL\tSTATUS\tNAME\n");
    for plan in plans {
        output.push_str(&format!(
            "{}\t{}\t{}\t{}\n",
            plan.id, plan.level, plan.state, plan.name
        ));
    }
    output.trim_end().to_string()
}

pub fn format_contract_list(contracts: &[contract::Model]) -> String {
    if contracts.is_empty() {
        return "No contracts found.".to_string();
    }
    let mut output = String::new();
    for contract in contracts {
        output.push_str(&contract_line(contract));
        output.push('\n');
    }
    output.trim_end().to_string()
}

pub fn format_progress_list(entries: &[progress_entry::Model]) -> String {
    if entries.is_empty() {
        return "No progress entries found.".to_string();
    }
    let mut output = String::new();
    for entry in entries {
        let mut line = format!(
            "- {} (entry id {}, contract id {})",
            entry.date, entry.id, entry.contract_id
        );
        if let Some(weight) = entry.weight_kg {
            line.push_str(&format!(" weight {weight:.1} kg"));
        }
        if let Some(fat) = entry.body_fat_pct {
            line.push_str(&format!(" body fat {fat:.1}%"));
        }
        output.push_str(&line);
        output.push('\n');
        if has_text(&entry.notes) {
            output.push_str(&format!("  Notes: {}\n", entry.notes.as_deref().unwrap_or("")));
        }
    }
    output.trim_end().to_string()
}

pub fn format_financial_list(records: &[financial_record::Model]) -> String {
    if records.is_empty() {
        return "No financial records found.".to_string();
    }
    let mut output = String::new();
    let mut balance = 0i64;
    for record in records {
        let signed = if record.kind == MovementKind::Outflow.as_str() {
            -record.amount_cents
        } else {
            record.amount_cents
        };
        balance += signed;
        let client = record
            .client_id
            .map(|id| format!(", client id {id}"))
            .unwrap_or_default();
        output.push_str(&format!(
            "- [{}] {} {} (record id {}{}) {}\n",
            record.kind,
            format_amount(record.amount_cents),
            format_datetime(record.created_at),
            record.id,
            client,
            record.description
        ));
    }
    output.push_str(&format!("Balance: {}", format_amount(balance)));
    output
}

pub fn format_audit_list(audits: &[cascade_audit::Model]) -> String {
    if audits.is_empty() {
        return "No cascade audits found.".to_string();
    }
    let mut output = String::new();
    for audit in audits {
        output.push_str(&format!(
            "- [{}] {} id {} ({}, {}) audit id {}: {}\n",
            if audit.success { "ok" } else { "errors" },
            audit.root_kind,
            audit.root_id,
            audit.mode,
            format_datetime(audit.created_at),
            audit.id,
            audit.reason
        ));
    }
    output.trim_end().to_string()
}

pub fn format_rollback_report(report: &RollbackReport) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "Progress entries deleted: {}\n",
        report.progress_entries_deleted
    ));
    output.push_str(&format!("Contracts canceled: {}\n", report.contracts_canceled));
    output.push_str(&format!("Contracts deleted: {}\n", report.contracts_deleted));
    output.push_str(&format!(
        "Associations removed: {}\n",
        report.associations_removed
    ));
    if report.roots_deleted > 0 {
        output.push_str(&format!("Deleted {}: {}\n", report.root_kind.as_str(), report.root_id));
    }
    for error in &report.errors {
        output.push_str(&format!("Failed: {}: {}\n", error.item, error.error));
    }
    output.trim_end().to_string()
}

pub fn format_reconcile_report(report: &ReconcileReport) -> String {
    let mut output = format!(
        "Progress entries deleted: {}\n",
        report.progress_entries_deleted
    );
    for (client_id, plan_id) in &report.associations_restored {
        output.push_str(&format!(
            "Restored link: client id {client_id} -> plan id {plan_id}\n"
        ));
    }
    output.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::{CascadeItemError, EntityKind};
    use crate::uow::ExecutionMode;

    fn report() -> RollbackReport {
        RollbackReport {
            root_kind: EntityKind::Client,
            root_id: 4,
            reason: "left".to_string(),
            mode: ExecutionMode::Sequential,
            progress_entries_deleted: 2,
            contracts_canceled: 1,
            contracts_deleted: 1,
            associations_removed: 1,
            roots_deleted: 1,
            errors: vec![CascadeItemError {
                item: "record cascade audit for client 4".to_string(),
                error: "database error".to_string(),
            }],
            success: false,
            audit_id: None,
        }
    }

    #[test]
    fn rollback_report_lists_counts_and_failures() {
        let text = format_rollback_report(&report());
        assert!(text.contains("Progress entries deleted: 2"));
        assert!(text.contains("Deleted client: 4"));
        assert!(text.ends_with("Failed: record cascade audit for client 4: database error"));
    }

    #[test]
    fn empty_lists_have_placeholder_text() {
        assert_eq!(format_client_list(&[]), "No clients found.");
        assert_eq!(format_contract_list(&[]), "No contracts found.");
        assert_eq!(format_financial_list(&[]), "No financial records found.");
    }

    #[test]
    fn reconcile_report_lists_restored_links() {
        let text = format_reconcile_report(&ReconcileReport {
            progress_entries_deleted: 0,
            associations_restored: vec![(1, 2)],
        });
        assert_eq!(
            text,
            "Progress entries deleted: 0\nRestored link: client id 1 -> plan id 2"
        );
    }
}
