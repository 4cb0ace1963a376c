// ABOUTME: Rendering of sandboxes and specs for the terminal
// ABOUTME: comfy-table tables, detail listings and pretty JSON

use anyhow::Result;
use berth_sandbox::{SandboxRecord, SandboxSpec, SandboxStatus};
use chrono::{DateTime, Utc};
use colored::*;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M").to_string()
}

pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn status_text(status: SandboxStatus) -> ColoredString {
    match status {
        SandboxStatus::Running => status.as_str().green(),
        SandboxStatus::Starting => status.as_str().cyan(),
        SandboxStatus::Paused => status.as_str().yellow(),
        SandboxStatus::Deleted => status.as_str().dimmed(),
        SandboxStatus::Error => status.as_str().red(),
    }
}

pub fn sandboxes_table(records: &[SandboxRecord]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["ID", "Owner", "Spec", "Status", "URL", "Created"]);
    for record in records {
        table.add_row(vec![
            record.id.to_string(),
            truncate(&record.owner_id, 20),
            truncate(&record.spec_id, 40),
            status_text(record.status).to_string(),
            record.url.clone().unwrap_or_else(|| "-".to_string()),
            format_date(&record.created_at),
        ]);
    }
    table
}

pub fn sandbox_details(record: &SandboxRecord) -> String {
    let mut lines = vec![
        format!("{:<15} {}", "ID:".cyan(), record.id),
        format!("{:<15} {}", "Owner:".cyan(), record.owner_id),
        format!("{:<15} {}", "Spec:".cyan(), record.spec_id),
        format!("{:<15} {}", "Status:".cyan(), status_text(record.status)),
        format!("{:<15} {}", "Created:".cyan(), format_date(&record.created_at)),
    ];
    if let Some(url) = &record.url {
        lines.push(format!("{:<15} {}", "URL:".cyan(), url));
    }
    if let Some(key) = &record.session_api_key {
        lines.push(format!("{:<15} {}", "Session key:".cyan(), key.expose_secret()));
    }
    for exposed in &record.exposed_urls {
        lines.push(format!("  {:<13} {}", exposed.name, exposed.url));
    }
    lines.join("\n")
}

pub fn specs_table(specs: &[SandboxSpec]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["ID", "Command", "Ports", "Created"]);
    for spec in specs {
        let ports = spec
            .exposed_ports
            .iter()
            .map(|(port, name)| format!("{}:{}", name, port))
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            spec.id.clone(),
            truncate(&spec.command.join(" "), 40),
            if ports.is_empty() { "-".to_string() } else { ports },
            format_date(&spec.created_at),
        ]);
    }
    table
}

pub fn spec_details(spec: &SandboxSpec) -> String {
    let mut lines = vec![
        format!("{:<15} {}", "ID:".cyan(), spec.id),
        format!("{:<15} {}", "Image:".cyan(), spec.image),
        format!("{:<15} {}", "Command:".cyan(), spec.command.join(" ")),
        format!("{:<15} {}", "Working dir:".cyan(), spec.working_dir),
        format!("{:<15} {}", "Created:".cyan(), format_date(&spec.created_at)),
    ];
    if !spec.exposed_ports.is_empty() {
        lines.push(format!("{}", "Exposed ports:".cyan()));
        for (port, name) in &spec.exposed_ports {
            lines.push(format!("  {:<13} {}", name, port));
        }
    }
    if !spec.initial_env.is_empty() {
        lines.push(format!("{}", "Environment:".cyan()));
        for (key, value) in &spec.initial_env {
            lines.push(format!("  {}={}", key, value));
        }
    }
    lines.join("\n")
}
