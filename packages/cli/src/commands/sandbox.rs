// ABOUTME: CLI commands for sandbox lifecycle management
// ABOUTME: Search, inspect, start, pause, resume and delete sandboxes through the orchestrator

use crate::output::{self, OutputFormat};
use anyhow::{Context, Result};
use berth_core::DEFAULT_PAGE_LIMIT;
use berth_sandbox::SandboxOrchestrator;
use clap::Subcommand;
use colored::*;
use uuid::Uuid;

pub const DEFAULT_OWNER: &str = "local";

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SandboxCommands {
    /// List sandboxes, newest first
    Search {
        /// Only show sandboxes started by this owner
        #[arg(long)]
        owner: Option<String>,
        /// Page token from a previous search
        #[arg(long)]
        page_id: Option<String>,
        /// Maximum number of sandboxes to show
        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: usize,
    },
    /// Show one or more sandboxes
    Get {
        /// Sandbox IDs
        #[arg(required = true)]
        ids: Vec<Uuid>,
    },
    /// Start a new sandbox from a spec
    Start {
        /// Spec ID (image reference)
        spec: String,
        /// Owner recorded on the sandbox
        #[arg(long, default_value = DEFAULT_OWNER)]
        owner: String,
    },
    /// Pause a running sandbox
    Pause { id: Uuid },
    /// Resume a paused or stopped sandbox
    Resume { id: Uuid },
    /// Stop and remove a sandbox and its workspace volume
    Delete { id: Uuid },
}

pub async fn handle_sandbox_command(
    command: SandboxCommands,
    sandboxes: &dyn SandboxOrchestrator,
    format: OutputFormat,
) -> Result<()> {
    match command {
        SandboxCommands::Search {
            owner,
            page_id,
            limit,
        } => {
            let page = sandboxes
                .search(owner.as_deref(), page_id.as_deref(), limit)
                .await;
            match format {
                OutputFormat::Json => println!("{}", output::to_json(&page)?),
                OutputFormat::Table => {
                    if page.items.is_empty() {
                        println!("{}", "No sandboxes found".yellow());
                        println!(
                            "{}",
                            "Use 'berth sandbox start <spec>' to start one".dimmed()
                        );
                        return Ok(());
                    }
                    println!("{}", output::sandboxes_table(&page.items));
                    if let Some(next) = page.next_page_id {
                        println!("Next page: {}", next.cyan());
                    }
                }
            }
        }
        SandboxCommands::Get { ids } => {
            let found = sandboxes.batch_get(&ids).await;
            let missing: Vec<String> = ids
                .iter()
                .zip(&found)
                .filter(|(_, record)| record.is_none())
                .map(|(id, _)| id.to_string())
                .collect();

            match format {
                OutputFormat::Json => println!("{}", output::to_json(&found)?),
                OutputFormat::Table => {
                    let records: Vec<_> = found.into_iter().flatten().collect();
                    match records.as_slice() {
                        [] => {}
                        [record] => println!("{}", output::sandbox_details(record)),
                        _ => println!("{}", output::sandboxes_table(&records)),
                    }
                }
            }
            if !missing.is_empty() {
                anyhow::bail!("Sandbox not found: {}", missing.join(", "));
            }
        }
        SandboxCommands::Start { spec, owner } => {
            let id = sandboxes
                .start(&owner, &spec)
                .await
                .with_context(|| format!("Failed to start sandbox from spec '{}'", spec))?;
            match (format, sandboxes.get(id).await) {
                (OutputFormat::Json, Some(record)) => println!("{}", output::to_json(&record)?),
                (OutputFormat::Json, None) => {
                    println!("{}", output::to_json(&serde_json::json!({ "id": id }))?)
                }
                (OutputFormat::Table, record) => {
                    println!("{}", format!("Started sandbox {}", id).green());
                    if let Some(record) = record {
                        println!("{}", output::sandbox_details(&record));
                    }
                }
            }
        }
        SandboxCommands::Pause { id } => {
            let done = sandboxes
                .pause(id)
                .await
                .with_context(|| format!("Failed to pause sandbox {}", id))?;
            report(done, "Paused", id, format)?;
        }
        SandboxCommands::Resume { id } => {
            let done = sandboxes
                .resume(id)
                .await
                .with_context(|| format!("Failed to resume sandbox {}", id))?;
            report(done, "Resumed", id, format)?;
        }
        SandboxCommands::Delete { id } => {
            let done = sandboxes
                .delete(id)
                .await
                .with_context(|| format!("Failed to delete sandbox {}", id))?;
            report(done, "Deleted", id, format)?;
        }
    }
    Ok(())
}

fn report(done: bool, verb: &str, id: Uuid, format: OutputFormat) -> Result<()> {
    if !done {
        anyhow::bail!("Sandbox not found: {}", id);
    }
    match format {
        OutputFormat::Json => println!(
            "{}",
            output::to_json(&serde_json::json!({ "id": id, "success": true }))?
        ),
        OutputFormat::Table => println!("{}", format!("{} sandbox {}", verb, id).green()),
    }
    Ok(())
}
