use serde::{Deserialize, Serialize};

use crate::utils::parser::TableDump;

/// Pipeline stage an event or error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validation,
    Discovery,
    Dump,
    Analysis,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Validation => write!(f, "Validation"),
            Stage::Discovery => write!(f, "Discovery"),
            Stage::Dump => write!(f, "Dump"),
            Stage::Analysis => write!(f, "Analysis"),
        }
    }
}

/// Typed events emitted by the orchestrator, in order, to an `AuditEventSink`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    Info { message: String },
    StageStarted { stage: Stage, database: Option<String> },
    NoVulnerability { target: String },
    VulnerabilityConfirmed { databases: Vec<String> },
    ExtractionSucceeded { database: String, tables: Vec<TableDump> },
    ExtractionSkipped { database: String },
    AnalysisReport { database: String, text: String },
    Error { stage: Stage, message: String },
    Cancelled,
    Completed { target: String },
}

impl AuditEvent {
    pub fn info(message: impl Into<String>) -> Self {
        AuditEvent::Info { message: message.into() }
    }

    pub fn error(stage: Stage, message: impl std::fmt::Display) -> Self {
        AuditEvent::Error { stage, message: message.to_string() }
    }
}
