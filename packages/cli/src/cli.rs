// ABOUTME: Top-level argument parser for the berth binary
// ABOUTME: Global output format plus the sandbox and spec command groups

use crate::commands::{handle_sandbox_command, handle_spec_command, SandboxCommands, SpecCommands};
use crate::context::AppContext;
use crate::output::OutputFormat;
use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "berth")]
#[command(about = "Berth CLI - sandboxed runtimes for AI agents")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(long, value_enum, global = true, default_value = "table")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Manage sandboxes
    #[command(subcommand)]
    Sandbox(SandboxCommands),
    /// Browse sandbox specs
    #[command(subcommand)]
    Spec(SpecCommands),
}

impl Cli {
    pub async fn run(self, context: &AppContext) -> Result<()> {
        match self.command {
            Commands::Sandbox(command) => {
                handle_sandbox_command(command, context.sandboxes.as_ref(), self.output).await
            }
            Commands::Spec(command) => {
                handle_spec_command(command, context.specs.as_ref(), self.output).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::DEFAULT_PAGE_LIMIT;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    #[test]
    fn test_parse_sandbox_search_defaults() {
        let cli = Cli::try_parse_from(["berth", "sandbox", "search"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Table);
        assert_eq!(
            cli.command,
            Commands::Sandbox(SandboxCommands::Search {
                owner: None,
                page_id: None,
                limit: DEFAULT_PAGE_LIMIT,
            })
        );
    }

    #[test]
    fn test_parse_global_output_after_subcommand() {
        let id = Uuid::new_v4();
        let id_arg = id.to_string();
        let cli = Cli::try_parse_from([
            "berth",
            "sandbox",
            "delete",
            id_arg.as_str(),
            "--output",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.command, Commands::Sandbox(SandboxCommands::Delete { id }));
    }

    #[test]
    fn test_parse_start_with_owner() {
        let cli = Cli::try_parse_from([
            "berth", "sandbox", "start", "ghcr.io/berth-dev/runtime:1", "--owner", "alice",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Commands::Sandbox(SandboxCommands::Start {
                spec: "ghcr.io/berth-dev/runtime:1".to_string(),
                owner: "alice".to_string(),
            })
        );
    }

    #[test]
    fn test_rejects_malformed_ids() {
        assert!(Cli::try_parse_from(["berth", "sandbox", "pause", "not-a-uuid"]).is_err());
        assert!(Cli::try_parse_from(["berth", "sandbox", "get"]).is_err());
    }

    #[test]
    fn test_parse_spec_list() {
        let cli =
            Cli::try_parse_from(["berth", "spec", "list", "--limit", "5", "--page-id", "10"])
                .unwrap();
        assert_eq!(
            cli.command,
            Commands::Spec(SpecCommands::List {
                page_id: Some("10".to_string()),
                limit: 5,
            })
        );
    }
}
