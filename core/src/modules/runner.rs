use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::core::error::{AuditError, Result};

/// Flags appended to every scanner invocation: non-interactive, uncolored, self-cleaning.
pub const SAFETY_FLAGS: [&str; 3] = ["--batch", "--disable-coloring", "--purge"];

/// An argument vector for one scanner invocation. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCommand {
    program: String,
    args: Vec<String>,
}

impl ScanCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Human-readable rendering for logs and dry runs, with safety flags included.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .chain(SAFETY_FLAGS)
            .map(|part| {
                if part.is_empty() || part.contains(|c: char| c.is_whitespace() || "'\"&;|$`<>()*?".contains(c)) {
                    format!("'{}'", part.replace('\'', r"'\''"))
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Completion status of one scanner invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    TimedOut,
    ProcessFailed(String),
}

/// Captured output of one scanner invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReport {
    pub text: String,
    pub status: RunStatus,
    pub elapsed: Duration,
}

impl RawReport {
    pub fn ok(text: impl Into<String>) -> Self {
        Self { text: text.into(), status: RunStatus::Ok, elapsed: Duration::ZERO }
    }

    pub fn timed_out(partial: impl Into<String>, elapsed: Duration) -> Self {
        Self { text: partial.into(), status: RunStatus::TimedOut, elapsed }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            status: RunStatus::ProcessFailed(message.into()),
            elapsed: Duration::ZERO,
        }
    }

    /// The report text if the run completed, otherwise the matching error.
    pub fn checked(&self) -> Result<&str> {
        match &self.status {
            RunStatus::Ok => Ok(&self.text),
            RunStatus::TimedOut => Err(AuditError::ProcessTimeout(self.elapsed)),
            RunStatus::ProcessFailed(message) => Err(AuditError::ProcessSpawnFailure(message.clone())),
        }
    }
}

/// Runs one scanner command under a wall-clock limit.
///
/// Implementations never fail: timeouts and spawn errors are reported through
/// `RawReport::status`.
#[async_trait]
pub trait ScanRunner: Send + Sync {
    async fn run(&self, command: &ScanCommand, limit: Duration) -> RawReport;
}

/// `ScanRunner` backed by a real child process.
///
/// The child is killed on timeout and whenever the running future is dropped,
/// which is how cancellation reaches the external scanner.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

async fn drain<R: AsyncRead + Unpin>(stream: Option<R>, buf: &mut Vec<u8>) {
    if let Some(mut stream) = stream {
        if let Err(e) = stream.read_to_end(buf).await {
            debug!("stopped reading scanner output: {}", e);
        }
    }
}

#[async_trait]
impl ScanRunner for ProcessRunner {
    async fn run(&self, command: &ScanCommand, limit: Duration) -> RawReport {
        debug!("running: {}", command.display());
        let started = Instant::now();

        let mut child = match Command::new(command.program())
            .args(command.args())
            .args(SAFETY_FLAGS)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                warn!("failed to start '{}': {}", command.program(), e);
                return RawReport::failed(format!("{}: {}", command.program(), e));
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut out = Vec::new();
        let mut err = Vec::new();

        let waited = tokio::time::timeout(limit, async {
            let (_, _, status) = tokio::join!(drain(stdout, &mut out), drain(stderr, &mut err), child.wait());
            status
        })
        .await;

        let status = match waited {
            Ok(Ok(exit)) => {
                if !exit.success() {
                    debug!("'{}' exited with {}", command.program(), exit);
                }
                RunStatus::Ok
            }
            Ok(Err(e)) => RunStatus::ProcessFailed(format!("{}: {}", command.program(), e)),
            Err(_) => {
                warn!("'{}' exceeded {}s, terminating", command.program(), limit.as_secs());
                if let Err(e) = child.kill().await {
                    debug!("kill after timeout failed: {}", e);
                }
                RunStatus::TimedOut
            }
        };

        let mut text = String::from_utf8_lossy(&out).into_owned();
        if !err.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&String::from_utf8_lossy(&err));
        }

        RawReport { text, status, elapsed: started.elapsed() }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ScanCommand {
        ScanCommand::new("sh", ["-c", script, "sqlaudit"])
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let report = ProcessRunner::new()
            .run(&sh("echo available databases; echo oops 1>&2"), Duration::from_secs(10))
            .await;
        assert_eq!(report.status, RunStatus::Ok);
        assert!(report.text.contains("available databases"));
        assert!(report.text.contains("oops"));
    }

    #[tokio::test]
    async fn test_appends_safety_flags() {
        let report = ProcessRunner::new().run(&sh("echo \"$@\""), Duration::from_secs(10)).await;
        assert_eq!(report.text.trim(), "--batch --disable-coloring --purge");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_still_ok() {
        let report = ProcessRunner::new().run(&sh("echo partial; exit 3"), Duration::from_secs(10)).await;
        assert_eq!(report.status, RunStatus::Ok);
        assert_eq!(report.checked().unwrap().trim(), "partial");
    }

    #[tokio::test]
    async fn test_timeout_is_reported_not_raised() {
        let report = ProcessRunner::new()
            .run(&sh("echo early; sleep 30"), Duration::from_millis(300))
            .await;
        assert_eq!(report.status, RunStatus::TimedOut);
        assert!(report.text.contains("early"));
        assert!(report.elapsed < Duration::from_secs(10));
        assert!(matches!(report.checked(), Err(AuditError::ProcessTimeout(_))));
    }

    /// True once the process is gone or only a zombie is left.
    #[cfg(target_os = "linux")]
    fn process_exited(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat.rsplit(") ").next().map_or(true, |rest| rest.starts_with('Z')),
            Err(_) => true,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropped_run_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("pid");
        let script = format!("echo $$ > '{}'; exec sleep 30", pidfile.display());

        let runner = ProcessRunner::new();
        let dropped = tokio::time::timeout(
            Duration::from_millis(500),
            runner.run(&sh(&script), Duration::from_secs(60)),
        )
        .await;
        assert!(dropped.is_err());

        let pid = std::fs::read_to_string(&pidfile).unwrap().trim().to_string();
        assert!(!pid.is_empty());

        let mut exited = false;
        for _ in 0..50 {
            if process_exited(&pid) {
                exited = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(exited, "scanner process {} still running after the run was dropped", pid);
    }

    #[tokio::test]
    async fn test_missing_binary_is_process_failure() {
        let command = ScanCommand::new("/nonexistent/sqlmap", ["-u", "http://a.com"]);
        let report = ProcessRunner::new().run(&command, Duration::from_secs(5)).await;
        assert!(matches!(report.status, RunStatus::ProcessFailed(_)));
        assert!(matches!(report.checked(), Err(AuditError::ProcessSpawnFailure(_))));
    }

    #[test]
    fn test_display_quotes_metacharacters() {
        let command = ScanCommand::new("sqlmap", ["-u", "http://a.com/?id=1&x=2"]);
        assert_eq!(
            command.display(),
            "sqlmap -u 'http://a.com/?id=1&x=2' --batch --disable-coloring --purge"
        );
    }
}
