use std::time::Duration;

pub type Result<T> = std::result::Result<T, AuditError>;

/// Failures that can occur while auditing a target.
///
/// None of these escape `perform_audit`: each one is turned into an
/// `AuditEvent::Error` at the stage where it happened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    #[error("invalid target '{0}': expected an http(s) URL")]
    InvalidTarget(String),

    #[error("scanner timed out after {}s", .0.as_secs())]
    ProcessTimeout(Duration),

    #[error("failed to run scanner: {0}")]
    ProcessSpawnFailure(String),

    #[error("scanner output contained no recognizable result")]
    ParseAmbiguous,

    #[error("analysis unavailable: {0}")]
    AnalysisUnavailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_uses_seconds() {
        let err = AuditError::ProcessTimeout(Duration::from_secs(900));
        assert_eq!(err.to_string(), "scanner timed out after 900s");
    }

    #[test]
    fn test_invalid_target_message() {
        let err = AuditError::InvalidTarget("ftp://x".into());
        assert!(err.to_string().contains("ftp://x"));
    }
}
