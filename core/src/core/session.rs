use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::AuditState;
use crate::modules::runner::RawReport;
use crate::utils::parser::TableDump;

/// Result of one dump stage. Decides whether analysis runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpOutcome {
    Extracted(RawReport),
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseStatus {
    Extracted,
    Skipped,
    Failed,
}

/// What happened to one discovered database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseResult {
    pub database: String,
    pub status: DatabaseStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<TableDump>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DatabaseResult {
    pub fn new(database: impl Into<String>, status: DatabaseStatus) -> Self {
        Self {
            database: database.into(),
            status,
            tables: Vec::new(),
            analysis: None,
            error: None,
        }
    }
}

/// Serializable record of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub target: String,
    pub state: AuditState,
    pub databases: Vec<String>,
    pub results: Vec<DatabaseResult>,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl AuditSummary {
    pub fn extracted(&self) -> impl Iterator<Item = &DatabaseResult> {
        self.results.iter().filter(|r| r.status == DatabaseStatus::Extracted)
    }

    pub fn is_vulnerable(&self) -> bool {
        !self.databases.is_empty()
    }
}

/// Run-scoped aggregate owned by a single `perform_audit` call.
#[derive(Debug)]
pub struct AuditSession {
    target: String,
    state: AuditState,
    history: Vec<AuditState>,
    databases: Vec<String>,
    results: Vec<DatabaseResult>,
    errors: Vec<String>,
    started_at: DateTime<Utc>,
}

impl AuditSession {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            state: AuditState::Start,
            history: vec![AuditState::Start],
            databases: Vec::new(),
            results: Vec::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn state(&self) -> AuditState {
        self.state
    }

    /// Outcome log of every state the session passed through.
    ///
    /// Per-database entries are appended when a result is recorded, in
    /// completion order, not when the dump starts. With parallel dumps the
    /// `Dumping` pairs therefore follow the order the dumps finished in.
    pub fn history(&self) -> &[AuditState] {
        &self.history
    }

    pub fn databases(&self) -> &[String] {
        &self.databases
    }

    /// Moves to `next` if the state machine allows it. Returns whether it moved.
    pub fn advance(&mut self, next: AuditState) -> bool {
        if !self.state.can_transition(next) {
            debug!("ignoring transition {} -> {} for {}", self.state, next, self.target);
            return false;
        }
        self.state = next;
        self.history.push(next);
        true
    }

    pub fn set_databases(&mut self, databases: Vec<String>) {
        self.databases = databases;
    }

    /// Records one database's result, passing through `Dumping` and its outcome state.
    ///
    /// `Analyzing` is logged only when an analysis was attempted, meaning the
    /// result carries a summary or an analysis error. Every other outcome logs
    /// `Skipped`.
    pub fn record(&mut self, result: DatabaseResult) {
        self.advance(AuditState::Dumping);
        let analyzed = result.status == DatabaseStatus::Extracted
            && (result.analysis.is_some() || result.error.is_some());
        if analyzed {
            self.advance(AuditState::Analyzing);
        } else {
            self.advance(AuditState::Skipped);
        }
        if let Some(ref e) = result.error {
            self.errors.push(format!("{}: {}", result.database, e));
        }
        self.results.push(result);
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn into_summary(self) -> AuditSummary {
        AuditSummary {
            target: self.target,
            state: self.state,
            databases: self.databases,
            results: self.results,
            errors: self.errors,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_walks_per_database_states() {
        let mut session = AuditSession::new("http://a.com");
        assert!(session.advance(AuditState::Discovering));
        assert!(session.advance(AuditState::Enumerating));
        session.set_databases(vec!["shop".into(), "users".into()]);

        let mut shop = DatabaseResult::new("shop", DatabaseStatus::Extracted);
        shop.analysis = Some("customer records".into());
        session.record(shop);
        let mut failed = DatabaseResult::new("users", DatabaseStatus::Failed);
        failed.error = Some("scanner timed out after 900s".into());
        session.record(failed);
        assert!(session.advance(AuditState::Done));

        assert_eq!(
            session.history(),
            [
                AuditState::Start,
                AuditState::Discovering,
                AuditState::Enumerating,
                AuditState::Dumping,
                AuditState::Analyzing,
                AuditState::Dumping,
                AuditState::Skipped,
                AuditState::Done,
            ]
        );

        let summary = session.into_summary();
        assert_eq!(summary.state, AuditState::Done);
        assert_eq!(summary.extracted().count(), 1);
        assert_eq!(summary.errors, vec!["users: scanner timed out after 900s"]);
        assert!(summary.finished_at >= summary.started_at);
    }

    #[test]
    fn test_extraction_without_analysis_logs_skipped() {
        let mut session = AuditSession::new("http://a.com");
        session.advance(AuditState::Discovering);
        session.advance(AuditState::Enumerating);
        session.record(DatabaseResult::new("shop", DatabaseStatus::Extracted));

        let mut unavailable = DatabaseResult::new("users", DatabaseStatus::Extracted);
        unavailable.error = Some("analysis unavailable: analysis disabled".into());
        session.record(unavailable);

        assert_eq!(
            &session.history()[3..],
            [AuditState::Dumping, AuditState::Skipped, AuditState::Dumping, AuditState::Analyzing]
        );
    }

    #[test]
    fn test_history_follows_completion_order() {
        let mut session = AuditSession::new("http://a.com");
        session.advance(AuditState::Discovering);
        session.advance(AuditState::Enumerating);
        session.set_databases(vec!["shop".into(), "users".into()]);

        // `users` finished first.
        session.record(DatabaseResult::new("users", DatabaseStatus::Skipped));
        let mut shop = DatabaseResult::new("shop", DatabaseStatus::Extracted);
        shop.analysis = Some("customer records".into());
        session.record(shop);
        session.advance(AuditState::Done);

        assert_eq!(
            &session.history()[3..],
            [AuditState::Dumping, AuditState::Skipped, AuditState::Dumping, AuditState::Analyzing, AuditState::Done]
        );
        let summary = session.into_summary();
        let order: Vec<_> = summary.results.iter().map(|r| r.database.as_str()).collect();
        assert_eq!(order, vec!["users", "shop"]);
    }

    #[test]
    fn test_illegal_transition_is_ignored() {
        let mut session = AuditSession::new("http://a.com");
        assert!(!session.advance(AuditState::Dumping));
        assert_eq!(session.state(), AuditState::Start);
    }

    #[test]
    fn test_summary_serializes_compactly() {
        let mut session = AuditSession::new("http://a.com");
        session.advance(AuditState::Discovering);
        session.advance(AuditState::NoVulnerability);
        let json = serde_json::to_string(&session.into_summary()).unwrap();
        assert!(json.contains(r#""state":"no_vulnerability""#));
        assert!(json.contains(r#""databases":[]"#));
    }
}
