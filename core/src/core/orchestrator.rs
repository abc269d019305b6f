use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt};
use log::{debug, info, warn};

use crate::core::error::{AuditError, Result};
use crate::core::events::{AuditEvent, Stage};
use crate::core::session::{AuditSession, AuditSummary, DatabaseResult, DatabaseStatus, DumpOutcome};
use crate::core::target::Target;
use crate::core::AuditState;
use crate::modules::analyst::{AnalysisSink, DisabledAnalyst, OllamaAnalyst};
use crate::modules::runner::{ProcessRunner, ScanRunner};
use crate::modules::sqlmap::ScanProfile;
use crate::utils::parser::{self, ReportMarkers};
use crate::utils::truncate_chars;
use crate::{AuditConfig, SinkRef};

/// Drives one target through discovery, per-database dumps and analysis.
///
/// 1. Runs a discovery pass and parses the listed databases
/// 2. Stops with `NoVulnerability` if nothing usable was listed
/// 3. Dumps each database, routing successful dumps to the analyst
/// 4. Emits typed events for every decision; nothing is raised to the caller
pub struct AuditOrchestrator {
    runner: Arc<dyn ScanRunner>,
    analyst: Option<Arc<dyn AnalysisSink>>,
    sink: SinkRef,
    profile: ScanProfile,
    markers: ReportMarkers,
    timeout: Duration,
    analysis_cap: usize,
    analysis_timeout: Duration,
    dump_concurrency: usize,
}

impl AuditOrchestrator {
    pub fn new(
        config: &AuditConfig,
        runner: Arc<dyn ScanRunner>,
        analyst: Option<Arc<dyn AnalysisSink>>,
        sink: SinkRef,
    ) -> Self {
        if config.dump_concurrency > 1 {
            warn!(
                "running {} dumps at once; the scanner's --purge clears its session directory after each run \
                 and can remove files a parallel dump of the same target still uses",
                config.dump_concurrency
            );
        }
        Self {
            runner,
            analyst,
            sink,
            profile: ScanProfile::from_config(config),
            markers: ReportMarkers::SQLMAP,
            timeout: config.timeout_duration(),
            analysis_cap: config.analysis_cap,
            analysis_timeout: config.analysis_timeout_duration(),
            dump_concurrency: config.dump_concurrency.max(1),
        }
    }

    /// Real process runner plus the configured analyst. With analysis switched
    /// off, `DisabledAnalyst` answers every request with `AnalysisUnavailable`.
    pub fn from_config(config: &AuditConfig, sink: SinkRef) -> Result<Self> {
        config.validate()?;
        let analyst: Arc<dyn AnalysisSink> = if config.analysis_enabled {
            Arc::new(OllamaAnalyst::from_config(config)?)
        } else {
            Arc::new(DisabledAnalyst)
        };
        Ok(Self::new(config, Arc::new(ProcessRunner::new()), Some(analyst), sink))
    }

    pub fn with_markers(mut self, markers: ReportMarkers) -> Self {
        self.markers = markers;
        self
    }

    pub fn profile(&self) -> &ScanProfile {
        &self.profile
    }

    pub async fn perform_audit(&self, target: &str) -> AuditSummary {
        self.perform_audit_until(target, std::future::pending::<()>()).await
    }

    /// Like `perform_audit`, but abandons the session as soon as `cancel` resolves.
    /// Dropping the in-flight stage kills its scanner process.
    pub async fn perform_audit_until<F>(&self, target: &str, cancel: F) -> AuditSummary
    where
        F: Future<Output = ()>,
    {
        let mut session = AuditSession::new(target);

        let cancelled = tokio::select! {
            biased;
            _ = cancel => true,
            _ = self.drive(&mut session) => false,
        };

        if cancelled {
            info!("audit of {} cancelled in state {}", target, session.state());
            session.advance(AuditState::Cancelled);
            self.sink.emit(&AuditEvent::Cancelled);
        }

        session.into_summary()
    }

    async fn drive(&self, session: &mut AuditSession) {
        let target = match Target::parse(session.target()) {
            Ok(t) => t,
            Err(e) => {
                self.sink.emit(&AuditEvent::error(Stage::Validation, &e));
                session.record_error(e.to_string());
                session.advance(AuditState::Rejected);
                return;
            }
        };

        self.sink.emit(&AuditEvent::info(format!("Target identified: {}", target)));

        let databases = match self.discover(&target, session).await {
            Ok(dbs) => dbs,
            Err(e) => {
                self.sink.emit(&AuditEvent::error(Stage::Discovery, &e));
                session.record_error(e.to_string());
                session.advance(AuditState::NoVulnerability);
                return;
            }
        };

        if databases.is_empty() {
            session.advance(AuditState::NoVulnerability);
            self.sink.emit(&AuditEvent::NoVulnerability { target: target.to_string() });
            return;
        }

        session.advance(AuditState::Enumerating);
        session.set_databases(databases.clone());
        self.sink.emit(&AuditEvent::VulnerabilityConfirmed { databases: databases.clone() });

        let target = &target;
        let mut results = stream::iter(databases)
            .map(|db| self.audit_database(target, db))
            .buffer_unordered(self.dump_concurrency);

        while let Some(result) = results.next().await {
            session.record(result);
        }

        session.advance(AuditState::Done);
        self.sink.emit(&AuditEvent::Completed { target: target.to_string() });
    }

    async fn discover(&self, target: &Target, session: &mut AuditSession) -> Result<Vec<String>> {
        session.advance(AuditState::Discovering);
        self.sink.emit(&AuditEvent::StageStarted { stage: Stage::Discovery, database: None });

        let command = self.profile.discovery(target);
        let report = self.runner.run(&command, self.timeout).await;
        let text = report.checked()?;

        let databases = self.markers.extract_databases(text);
        if databases.is_empty() {
            debug!("{} for {}", AuditError::ParseAmbiguous, target);
        }
        Ok(databases)
    }

    async fn audit_database(&self, target: &Target, database: String) -> DatabaseResult {
        self.sink.emit(&AuditEvent::StageStarted { stage: Stage::Dump, database: Some(database.clone()) });

        let command = self.profile.dump(target, &database);
        let report = self.runner.run(&command, self.timeout).await;

        let retrieved = report.checked().map(|text| self.markers.detect_dump_success(text));
        let outcome = match retrieved {
            Ok(true) => DumpOutcome::Extracted(report),
            Ok(false) => DumpOutcome::NoData,
            Err(e) => {
                warn!("dump of '{}' failed: {}", database, e);
                self.sink.emit(&AuditEvent::error(Stage::Dump, format!("{}: {}", database, e)));
                let mut result = DatabaseResult::new(database, DatabaseStatus::Failed);
                result.error = Some(e.to_string());
                return result;
            }
        };

        match outcome {
            DumpOutcome::NoData => {
                self.sink.emit(&AuditEvent::ExtractionSkipped { database: database.clone() });
                DatabaseResult::new(database, DatabaseStatus::Skipped)
            }
            DumpOutcome::Extracted(report) => {
                let mut result = DatabaseResult::new(database, DatabaseStatus::Extracted);
                result.tables = parser::summarize_dump(&report.text);
                self.sink.emit(&AuditEvent::ExtractionSucceeded {
                    database: result.database.clone(),
                    tables: result.tables.clone(),
                });

                match self.analyze(&result.database, &report.text).await {
                    Some(Ok(text)) => {
                        self.sink.emit(&AuditEvent::AnalysisReport {
                            database: result.database.clone(),
                            text: text.clone(),
                        });
                        result.analysis = Some(text);
                    }
                    Some(Err(e)) => {
                        self.sink.emit(&AuditEvent::error(Stage::Analysis, format!("{}: {}", result.database, e)));
                        result.error = Some(e.to_string());
                    }
                    None => {}
                }
                result
            }
        }
    }

    /// `None` when no analyst is configured.
    async fn analyze(&self, database: &str, text: &str) -> Option<Result<String>> {
        let analyst = self.analyst.as_ref()?;
        let excerpt = truncate_chars(text, self.analysis_cap);
        self.sink.emit(&AuditEvent::info(format!("Analyzing dumped data from '{}'...", database)));

        let outcome = match tokio::time::timeout(self.analysis_timeout, analyst.analyze(database, excerpt)).await {
            Ok(result) => result,
            Err(_) => Err(AuditError::AnalysisUnavailable(format!(
                "no answer within {}s",
                self.analysis_timeout.as_secs()
            ))),
        };
        Some(outcome)
    }
}
