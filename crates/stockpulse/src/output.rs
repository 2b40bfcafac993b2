//! Output formatting: table or JSON.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use stockpulse_core::{ListenerStatus, ScanResult, ScannedItem};

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Color when stdout is a terminal and `NO_COLOR` is unset.
pub fn should_color() -> bool {
    io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

pub fn print_output(output: &str) {
    if output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

pub fn render_json<T: serde::Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(data).map_err(|e| CliError::Render(e.to_string()))
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

// ── Scan results ─────────────────────────────────────────────────────

#[derive(Tabled)]
struct ItemRow {
    #[tabled(rename = "Product")]
    product_id: i64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Category")]
    category: String,
}

impl From<&ScannedItem> for ItemRow {
    fn from(item: &ScannedItem) -> Self {
        Self {
            product_id: item.product_id,
            name: item.name.clone(),
            category: item.category_id.map_or_else(|| "-".into(), |c| c.to_string()),
        }
    }
}

pub fn render_scan(format: OutputFormat, result: &ScanResult, color: bool) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => render_json(result),
        OutputFormat::Table => {
            let mut out = String::new();
            if !result.items.is_empty() {
                let rows: Vec<ItemRow> = result.items.iter().map(ItemRow::from).collect();
                out.push_str(&render_table(&rows));
                out.push('\n');
            }

            let processed = format!("{} tag(s) recorded", result.processed);
            if color {
                out.push_str(&processed.green().to_string());
            } else {
                out.push_str(&processed);
            }

            if !result.unknown_tags.is_empty() {
                let unknown = format!("unknown: {}", result.unknown_tags.join(", "));
                out.push('\n');
                if color {
                    out.push_str(&unknown.yellow().to_string());
                } else {
                    out.push_str(&unknown);
                }
            }
            Ok(out)
        }
    }
}

// ── Listener health ──────────────────────────────────────────────────

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Reader")]
    reader_id: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Connected")]
    connected: String,
    #[tabled(rename = "Errors")]
    error_count: u64,
    #[tabled(rename = "Reconnects")]
    reconnect_attempts: u64,
    #[tabled(rename = "Idle (s)")]
    idle: u64,
}

impl From<&ListenerStatus> for StatusRow {
    fn from(s: &ListenerStatus) -> Self {
        Self {
            reader_id: s.reader_id.clone(),
            kind: s.kind.to_string(),
            phase: s.phase.to_string(),
            connected: if s.connected { "yes" } else { "no" }.into(),
            error_count: s.error_count,
            reconnect_attempts: s.reconnect_attempts,
            idle: s.inactivity().as_secs(),
        }
    }
}

pub fn render_statuses(statuses: &[ListenerStatus]) -> String {
    let rows: Vec<StatusRow> = statuses.iter().map(StatusRow::from).collect();
    render_table(&rows)
}
