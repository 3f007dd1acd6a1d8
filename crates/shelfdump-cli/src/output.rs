//! Progress lines and the end-of-run summary.

use std::io::Write;

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use shelfdump_core::{DatabaseReport, Outcome, Progress, RunSummary};

/// Width of the dotted progress label.
const PROGRESS_WIDTH: usize = 48;

/// Output format for the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SummaryFormat {
    /// Human-readable table
    Text,
    /// JSON document
    Json,
}

impl std::fmt::Display for SummaryFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummaryFormat::Text => write!(f, "text"),
            SummaryFormat::Json => write!(f, "json"),
        }
    }
}

/// Render the summary in the requested format.
pub fn render_summary(summary: &RunSummary, format: SummaryFormat) -> String {
    match format {
        SummaryFormat::Text => render_text(summary),
        SummaryFormat::Json => {
            serde_json::to_string_pretty(summary).unwrap_or_else(|_| "{}".to_string())
        }
    }
}

fn render_text(summary: &RunSummary) -> String {
    let mut table = Table::new();
    table.set_header(vec!["Database", "Tables", "Bytes", "Duration", "Status"]);

    for report in &summary.databases {
        let status = match &report.outcome {
            Outcome::Exported { archive } => format!("ok {}", archive.display()),
            Outcome::Failed { reason } => format!("FAILED {}", reason),
        };
        table.add_row(vec![
            Cell::new(&report.database),
            Cell::new(report.tables),
            Cell::new(report.bytes),
            Cell::new(format_duration(report)),
            Cell::new(status),
        ]);
    }

    let mut output = if summary.databases.is_empty() {
        "No databases exported".to_string()
    } else {
        table.to_string()
    };

    if let Some(rotation) = &summary.rotation {
        output.push_str(&format!(
            "\nRotation: removed {}, kept {} weekday and {} Sunday directories",
            rotation.removed.len(),
            rotation.kept_weekdays,
            rotation.kept_sundays
        ));
    }
    let failed = summary.failures().count();
    if failed > 0 {
        output.push_str(&format!("\n{} of {} databases failed", failed, summary.databases.len()));
    }
    output
}

fn format_duration(report: &DatabaseReport) -> String {
    format!("{:.2}s", report.duration().as_secs_f64())
}

/// Prints one dotted line per database while the run progresses.
pub struct ConsoleProgress<W> {
    out: W,
}

impl ConsoleProgress<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleProgress<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> Progress for ConsoleProgress<W> {
    fn database_started(&mut self, database: &str) {
        let label = format!("Backing up database: {} ", database);
        // console write errors are ignored
        let _ = write!(self.out, "{:.<width$} ", label, width = PROGRESS_WIDTH);
        let _ = self.out.flush();
    }

    fn database_finished(&mut self, report: &DatabaseReport) {
        let verdict = if report.is_success() { "ok" } else { "FAILED" };
        let _ = writeln!(self.out, "{} {}", verdict, format_duration(report));
        let _ = self.out.flush();
    }
}
