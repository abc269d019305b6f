pub mod core;
pub mod modules;
pub mod utils;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

pub use crate::core::error::{AuditError, Result};
pub use crate::core::events::{AuditEvent, Stage};
pub use crate::core::orchestrator::AuditOrchestrator;
pub use crate::core::report::AuditReport;
pub use crate::core::session::{AuditSession, AuditSummary, DatabaseResult, DatabaseStatus, DumpOutcome};
pub use crate::core::target::{Target, TargetQueue};
pub use crate::core::AuditState;
pub use crate::modules::analyst::{AnalysisSink, DisabledAnalyst, OllamaAnalyst};
pub use crate::modules::runner::{ProcessRunner, RawReport, RunStatus, ScanCommand, ScanRunner};
pub use crate::modules::sqlmap::ScanProfile;
pub use crate::utils::parser::{self, ReportMarkers, TableDump};
pub use crate::utils::read_lines;

/// Shared audit configuration, loadable from a JSON file and overridable by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditConfig {
    pub target: String,
    pub list_file: String,
    pub scanner: String,
    pub timeout: u64,
    pub level: u8,
    pub risk: u8,
    pub extra_args: Vec<String>,
    pub analysis_enabled: bool,
    pub analysis_url: String,
    pub model: String,
    pub analysis_cap: usize,
    pub analysis_timeout: u64,
    pub dump_concurrency: usize,
    pub output: String,
    pub verbose: bool,
    pub dry_run: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            list_file: String::new(),
            scanner: "sqlmap".to_string(),
            timeout: 900,
            level: 2,
            risk: 2,
            extra_args: Vec::new(),
            analysis_enabled: true,
            analysis_url: "http://localhost:11434/api/generate".to_string(),
            model: "mistral".to_string(),
            analysis_cap: 8000,
            analysis_timeout: 120,
            dump_concurrency: 1,
            output: "audit_results.jsonl".to_string(),
            verbose: false,
            dry_run: false,
        }
    }
}

impl AuditConfig {
    /// Reads a JSON config file. Missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config '{}': {}", path.display(), e))?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| anyhow::anyhow!("failed to parse config '{}': {}", path.display(), e))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scanner.trim().is_empty() {
            return Err(AuditError::InvalidConfig("scanner must not be empty".into()));
        }
        if self.timeout == 0 {
            return Err(AuditError::InvalidConfig("timeout must be at least 1 second".into()));
        }
        if self.dump_concurrency == 0 {
            return Err(AuditError::InvalidConfig("dump concurrency must be at least 1".into()));
        }
        if !(1..=5).contains(&self.level) {
            return Err(AuditError::InvalidConfig(format!("level {} is outside 1..=5", self.level)));
        }
        if !(1..=3).contains(&self.risk) {
            return Err(AuditError::InvalidConfig(format!("risk {} is outside 1..=3", self.risk)));
        }
        if self.analysis_enabled && self.analysis_cap == 0 {
            return Err(AuditError::InvalidConfig("analysis cap must be positive".into()));
        }
        Ok(())
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn analysis_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout)
    }
}

/// Output abstraction for the audit pipeline.
/// The orchestrator only ever emits typed events; rendering is up to the sink.
pub trait AuditEventSink: Send + Sync {
    fn emit(&self, event: &AuditEvent);
}

pub type SinkRef = Arc<dyn AuditEventSink>;

/// Terminal output sink for CLI usage.
pub struct ConsoleSink {
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleSink {
    pub fn new_ref() -> SinkRef {
        Arc::new(Self { spinner: Mutex::new(None) })
    }

    fn stop_spinner(&self) {
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(pb) = slot.take() {
                pb.finish_and_clear();
            }
        }
    }

    fn start_spinner(&self, message: String) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]") {
            pb.set_style(style);
        }
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(120));
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(old) = slot.replace(pb) {
                old.finish_and_clear();
            }
        }
    }

    fn line(&self, source: &str, message: &str) {
        use colored::*;
        use std::io::Write;
        let stamp = chrono::Local::now().format("%H:%M:%S").to_string();
        print!("{} {} {}\r\n", format!("[{}]", stamp).dimmed(), format!("[{}]", source).bold(), message);
        std::io::stdout().flush().ok();
    }
}

impl AuditEventSink for ConsoleSink {
    fn emit(&self, event: &AuditEvent) {
        use colored::*;
        use std::io::Write;

        self.stop_spinner();

        match event {
            AuditEvent::Info { message } => self.line("Agent", message),
            AuditEvent::StageStarted { stage, database } => {
                let message = match database {
                    Some(db) => format!("{} stage for database '{}'...", stage, db),
                    None => format!("{} stage...", stage),
                };
                self.line("Agent", &message.cyan().to_string());
                self.start_spinner(message);
            }
            AuditEvent::NoVulnerability { target } => self.line(
                "Result",
                &format!("No databases found or {} is not vulnerable.", target).yellow().to_string(),
            ),
            AuditEvent::VulnerabilityConfirmed { databases } => {
                self.line("Result", &"Vulnerability confirmed.".green().to_string());
                self.line(
                    "Result",
                    &format!("Total databases found: {}", databases.len()).green().to_string(),
                );
                print!("\r\n{}\r\n", "--- Discovered Databases ---".bright_magenta());
                for db in databases {
                    print!("- {}\r\n", db);
                }
                print!("{}\r\n\r\n", "----------------------------".bright_magenta());
                std::io::stdout().flush().ok();
            }
            AuditEvent::ExtractionSucceeded { database, tables } => {
                self.line(
                    "Result",
                    &format!("Data extraction successful for '{}'", database).green().to_string(),
                );
                for t in tables {
                    print!("    {}.{} ({} entries)\r\n", t.database, t.table, t.entries);
                }
                std::io::stdout().flush().ok();
            }
            AuditEvent::ExtractionSkipped { database } => self.line(
                "Result",
                &format!("Could not extract meaningful data from '{}' or permission denied.", database)
                    .yellow()
                    .to_string(),
            ),
            AuditEvent::AnalysisReport { database, text } => {
                print!("\r\n{}\r\n", format!("[Analysis Report for {}]", database).blue().bold());
                for l in text.lines() {
                    print!("{}\r\n", l.cyan());
                }
                print!("\r\n");
                std::io::stdout().flush().ok();
            }
            AuditEvent::Error { stage, message } => {
                self.line("Error", &format!("{}: {}", stage, message).red().to_string())
            }
            AuditEvent::Cancelled => self.line("System", &"Audit interrupted.".yellow().to_string()),
            AuditEvent::Completed { target } => self.line(
                "System",
                &format!("Audit of {} completed.", target).green().bold().to_string(),
            ),
        }
    }
}
