//! `syncward status`: project states and pending queue entries.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use syncward_core::{ProcessingState, ProjectCode, QueueStage, Settings, StateStore, Status};
use syncward_queue::QueueSet;

use super::{load_settings, project_code};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show only this project.
    #[arg(long)]
    pub project: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, base_dir: Option<PathBuf>) -> Result<()> {
        let settings = load_settings(base_dir)?;
        let filter = self.project.as_deref().map(project_code).transpose()?;
        let rows = build_rows(&settings, filter.as_ref())?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(&settings, rows);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ProjectRow {
    project: ProjectCode,
    status: Status,
    error_code: i32,
    error_message: Option<String>,
    last_state_change: DateTime<Utc>,
    queued: Vec<QueueStage>,
    has_error_report: bool,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "project")]
    project: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "queued")]
    queued: String,
    #[tabled(rename = "last change")]
    last_change: String,
    #[tabled(rename = "detail")]
    detail: String,
}

fn build_rows(settings: &Settings, filter: Option<&ProjectCode>) -> Result<Vec<ProjectRow>> {
    let states = StateStore::new(settings);
    let queues = QueueSet::new(settings).context("failed to open queues")?;

    let mut records: Vec<ProcessingState> = match filter {
        Some(code) => vec![states
            .load(code)
            .with_context(|| format!("failed to load state for '{code}'"))?],
        None => states.list().context("failed to list project states")?,
    };

    // Projects queued before their first run have no state file yet.
    if filter.is_none() {
        for queue in queues.iter() {
            for code in queue.queued_projects(None)? {
                if !records.iter().any(|r| r.project_code == code) {
                    records.push(ProcessingState::new(code));
                }
            }
        }
        records.sort_by(|a, b| a.project_code.cmp(&b.project_code));
    }

    Ok(records
        .into_iter()
        .map(|record| {
            let queued = queues
                .iter()
                .filter(|q| q.contains(&record.project_code))
                .map(|q| q.stage())
                .collect();
            ProjectRow {
                queued,
                status: record.status,
                error_code: record.error_code.as_i32(),
                error_message: record.error_message,
                last_state_change: record.last_state_change,
                has_error_report: record.last_error_report.is_some(),
                project: record.project_code,
            }
        })
        .collect())
}

fn print_table(settings: &Settings, rows: Vec<ProjectRow>) {
    let held = rows.iter().filter(|r| r.status == Status::Hold).count();
    println!(
        "syncward v{} | {} | {} projects | {} on hold",
        env!("CARGO_PKG_VERSION"),
        settings.base_dir.display(),
        rows.len(),
        held,
    );
    if rows.is_empty() {
        println!("No projects known.");
        return;
    }

    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            status: status_label(&row.status),
            queued: if row.queued.is_empty() {
                "-".to_string()
            } else {
                row.queued
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            },
            last_change: row.last_state_change.format("%Y-%m-%d %H:%M:%S").to_string(),
            detail: detail(&row),
            project: row.project.to_string(),
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn status_label(status: &Status) -> String {
    match status {
        Status::Idle | Status::Cloned => status.as_str().green().to_string(),
        Status::Cloning | Status::Syncing => status.as_str().yellow().to_string(),
        Status::Hold => status.as_str().red().bold().to_string(),
        Status::Error => status.as_str().red().to_string(),
        Status::Unrecognized(raw) => format!("? {raw}").magenta().to_string(),
    }
}

fn detail(row: &ProjectRow) -> String {
    let mut detail = match &row.error_message {
        Some(message) => format!("[{}] {message}", row.error_code),
        None => String::new(),
    };
    if row.has_error_report {
        if !detail.is_empty() {
            detail.push_str("; ");
        }
        detail.push_str("skipped items reported");
    }
    detail
}
