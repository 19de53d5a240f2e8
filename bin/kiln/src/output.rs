//! Tables and JSON documents printed by the commands.

use anyhow::Result;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use kiln_deploy::{ActionKey, ActionOutcome, DeploymentResult, ExecutionPlan, JournalEntry};
use serde_json::json;

use crate::cli::OutputFormat;

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_plan(plan: &ExecutionPlan, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&json!({
            "module": plan.module(),
            "steps": plan.steps().iter().map(|step| json!({
                "action": step.key().to_string(),
                "kind": step.action.kind.label(),
                "dependencies": step.dependencies.iter().map(ToString::to_string).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
        })),
        OutputFormat::Table => {
            let mut table = table(vec!["#", "Action", "Kind", "Depends on"]);
            for (i, step) in plan.steps().iter().enumerate() {
                let dependencies = step
                    .dependencies
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n");
                table.add_row(vec![
                    (i + 1).to_string(),
                    step.key().to_string(),
                    step.action.kind.label().to_string(),
                    dependencies,
                ]);
            }
            println!("{table}");
            Ok(())
        }
    }
}

pub fn print_result(result: &DeploymentResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&json!({
            "module": result.module,
            "outputs": result.outputs.iter().map(|(name, value)| (name.clone(), json!(value.to_string()))).collect::<serde_json::Map<_, _>>(),
            "executed": result.executed.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "skipped": result.skipped.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "addresses": result.addresses.iter().map(|(key, address)| (key.to_string(), json!(address))).collect::<serde_json::Map<_, _>>(),
        })),
        OutputFormat::Table => {
            let mut addresses = table(vec!["Action", "Address"]);
            for (key, address) in &result.addresses {
                addresses.add_row(vec![key.to_string(), address.to_string()]);
            }
            println!("{addresses}");

            if !result.outputs.is_empty() {
                let mut outputs = table(vec!["Output", "Value"]);
                for (name, value) in &result.outputs {
                    outputs.add_row(vec![name.clone(), value.to_string()]);
                }
                println!("{outputs}");
            }

            println!(
                "{} action(s) executed, {} reused from the journal",
                result.executed.len(),
                result.skipped.len()
            );
            Ok(())
        }
    }
}

pub fn print_journal(entries: &[(ActionKey, JournalEntry)], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&json!(
            entries
                .iter()
                .map(|(key, entry)| json!({ "action": key.to_string(), "entry": entry }))
                .collect::<Vec<_>>()
        )),
        OutputFormat::Table => {
            let mut table = table(vec!["Action", "Status", "Recorded at", "Result"]);
            for (key, entry) in entries {
                let detail = match (&entry.result, &entry.error) {
                    (Some(outcome), _) => describe(outcome),
                    (None, Some(error)) => error.clone(),
                    (None, None) => String::new(),
                };
                table.add_row(vec![
                    key.to_string(),
                    entry.status.to_string(),
                    entry.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    detail,
                ]);
            }
            println!("{table}");
            Ok(())
        }
    }
}

fn describe(outcome: &ActionOutcome) -> String {
    match outcome {
        ActionOutcome::Deployed { address, tx_hash } => format!("deployed at {address} ({tx_hash})"),
        ActionOutcome::Encoded { data } => format!("encoded {} byte(s)", data.len()),
        ActionOutcome::Sent { tx_hash } => format!("sent {tx_hash}"),
        ActionOutcome::Called { data } => format!("returned {data}"),
        ActionOutcome::Attached { address } => format!("attached at {address}"),
    }
}
