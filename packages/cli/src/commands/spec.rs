// ABOUTME: CLI commands for browsing sandbox specs
// ABOUTME: Lists and shows the templates sandboxes can be started from

use crate::output::{self, OutputFormat};
use anyhow::Result;
use berth_core::DEFAULT_PAGE_LIMIT;
use berth_sandbox::SpecRegistry;
use clap::Subcommand;
use colored::*;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SpecCommands {
    /// List available sandbox specs
    List {
        /// Page token from a previous listing
        #[arg(long)]
        page_id: Option<String>,
        /// Maximum number of specs to show
        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: usize,
    },
    /// Show a single spec
    Get {
        /// Spec ID (image reference)
        id: String,
    },
}

pub async fn handle_spec_command(
    command: SpecCommands,
    specs: &dyn SpecRegistry,
    format: OutputFormat,
) -> Result<()> {
    match command {
        SpecCommands::List { page_id, limit } => {
            let page = specs.search_specs(page_id.as_deref(), limit).await;
            match format {
                OutputFormat::Json => println!("{}", output::to_json(&page)?),
                OutputFormat::Table => {
                    if page.items.is_empty() {
                        println!("{}", "No sandbox specs found".yellow());
                        return Ok(());
                    }
                    println!("{}", output::specs_table(&page.items));
                    if let Some(next) = page.next_page_id {
                        println!("Next page: {}", next.cyan());
                    }
                }
            }
        }
        SpecCommands::Get { id } => {
            let Some(spec) = specs.get_spec(&id).await else {
                anyhow::bail!("Sandbox spec '{}' not found", id);
            };
            match format {
                OutputFormat::Json => println!("{}", output::to_json(&spec)?),
                OutputFormat::Table => println!("{}", output::spec_details(&spec)),
            }
        }
    }
    Ok(())
}
