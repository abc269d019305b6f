use std::fs::{File, OpenOptions};
use std::io::Write;

use log::warn;

use crate::core::events::AuditEvent;
use crate::core::session::{AuditSummary, DatabaseStatus};
use crate::core::AuditState;
use crate::SinkRef;

/// Collects finished sessions and appends each one as a JSON line to the output file.
pub struct AuditReport {
    file: File,
    path: String,
    summaries: Vec<AuditSummary>,
}

impl AuditReport {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| anyhow::anyhow!("failed to open output file '{}': {}", path, e))?;
        Ok(Self {
            file,
            path: path.to_string(),
            summaries: Vec::new(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn summaries(&self) -> &[AuditSummary] {
        &self.summaries
    }

    /// Persists the summary. A write failure is logged; the summary is still kept in memory.
    pub fn record(&mut self, summary: AuditSummary) {
        match serde_json::to_string(&summary) {
            Ok(line) => {
                if let Err(e) = writeln!(self.file, "{}", line) {
                    warn!("failed to write to '{}': {}", self.path, e);
                }
            }
            Err(e) => warn!("failed to serialize summary for {}: {}", summary.target, e),
        }
        self.summaries.push(summary);
    }

    /// Emits a per-target recap of everything recorded so far.
    pub fn report_summary(&self, sink: &SinkRef) {
        if self.summaries.is_empty() {
            sink.emit(&AuditEvent::info("No targets were audited."));
            return;
        }

        let vulnerable = self.summaries.iter().filter(|s| s.is_vulnerable()).count();
        sink.emit(&AuditEvent::info(format!(
            "{} target(s) audited, {} vulnerable. Results appended to {}",
            self.summaries.len(),
            vulnerable,
            self.path
        )));

        for (i, s) in self.summaries.iter().enumerate() {
            let line = match s.state {
                AuditState::Done => {
                    let extracted = s.extracted().count();
                    let failed = s.results.iter().filter(|r| r.status == DatabaseStatus::Failed).count();
                    format!(
                        "  #{} {} -> {} database(s), {} extracted, {} failed",
                        i + 1,
                        s.target,
                        s.databases.len(),
                        extracted,
                        failed
                    )
                }
                state => format!("  #{} {} -> {}", i + 1, s.target, state),
            };
            sink.emit(&AuditEvent::info(line));
        }
    }
}
