pub mod error;
pub mod events;
pub mod orchestrator;
pub mod report;
pub mod session;
pub mod target;

use serde::{Deserialize, Serialize};

/// States of one audit session.
///
/// `Start → Discovering → {NoVulnerability | Enumerating}`, then per database
/// `Dumping → {Analyzing | Skipped}`, and finally `Done`. `Rejected` and
/// `Cancelled` are terminal states reachable outside that main path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditState {
    Start,
    Rejected,
    Discovering,
    NoVulnerability,
    Enumerating,
    Dumping,
    Analyzing,
    Skipped,
    Done,
    Cancelled,
}

impl AuditState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AuditState::Rejected | AuditState::NoVulnerability | AuditState::Done | AuditState::Cancelled
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition(self, next: AuditState) -> bool {
        use AuditState::*;
        if next == Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Start, Discovering)
                | (Start, Rejected)
                | (Discovering, NoVulnerability)
                | (Discovering, Enumerating)
                | (Enumerating, Dumping)
                | (Enumerating, Done)
                | (Dumping, Analyzing)
                | (Dumping, Skipped)
                | (Analyzing, Dumping)
                | (Skipped, Dumping)
                | (Analyzing, Done)
                | (Skipped, Done)
        )
    }
}

impl std::fmt::Display for AuditState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditState::Start => write!(f, "start"),
            AuditState::Rejected => write!(f, "rejected"),
            AuditState::Discovering => write!(f, "discovering"),
            AuditState::NoVulnerability => write!(f, "no vulnerability"),
            AuditState::Enumerating => write!(f, "enumerating"),
            AuditState::Dumping => write!(f, "dumping"),
            AuditState::Analyzing => write!(f, "analyzing"),
            AuditState::Skipped => write!(f, "skipped"),
            AuditState::Done => write!(f, "done"),
            AuditState::Cancelled => write!(f, "cancelled"),
        }
    }
}
