use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::crash::CrashReport;

/// Result alias for launcher operations.
pub type LauncherResult<T> = Result<T, LauncherError>;

/// Errors that can occur while launching, monitoring or stopping a process under test.
#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("failed to launch {target}: {reason}")]
    LaunchFailure { target: String, reason: String },
    #[error("timed out after {timeout:?} waiting for {waiting_for}")]
    TimeoutFailure {
        waiting_for: String,
        timeout: Duration,
    },
    #[error("crash detected: {0}")]
    CrashDetected(CrashReport),
    #[error("log expectation failed: {0}")]
    ExpectationFailed(String),
    #[error("no launcher registered for platform '{0}'")]
    UnknownPlatform(String),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("config snapshot error for {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl LauncherError {
    pub(crate) fn launch(target: impl Into<String>, reason: impl Into<String>) -> Self {
        LauncherError::LaunchFailure {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn timeout(waiting_for: impl Into<String>, timeout: Duration) -> Self {
        LauncherError::TimeoutFailure {
            waiting_for: waiting_for.into(),
            timeout,
        }
    }

    pub(crate) fn snapshot(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LauncherError::Snapshot {
            path: path.into(),
            source,
        }
    }

    /// Return the crash report if this error signals a crash.
    pub fn crash_report(&self) -> Option<&CrashReport> {
        match self {
            LauncherError::CrashDetected(report) => Some(report),
            _ => None,
        }
    }
}
