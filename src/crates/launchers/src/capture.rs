use std::process::ExitStatus;

use crate::crash::{CrashReport, CrashSignatures};
use crate::error::{LauncherError, LauncherResult};

/// Origin stream for captured log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
    /// Tailed from the log file named in the launch config.
    File,
    /// Pulled from a mobile device log.
    Device,
}

/// Single captured log line with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub stream: LogStream,
    pub line: String,
}

impl LogLine {
    pub fn new(stream: LogStream, line: impl Into<String>) -> Self {
        Self {
            stream,
            line: line.into(),
        }
    }
}

/// Snapshot of everything a launcher has captured so far.
#[derive(Debug, Clone)]
pub struct CollectedLog {
    pub lines: Vec<LogLine>,
    /// Exit status, once the process has been reaped.
    pub exit_status: Option<ExitStatus>,
    pub crash: Option<CrashReport>,
}

impl CollectedLog {
    /// Scan captured lines and the exit status for a crash.
    pub fn scan(
        lines: Vec<LogLine>,
        exit_status: Option<ExitStatus>,
        signatures: &CrashSignatures,
    ) -> Self {
        let crash = signatures.scan(&lines).or_else(|| {
            exit_status
                .filter(|status| !status.success())
                .map(|status| CrashReport::abnormal_exit(status, &lines))
        });
        Self {
            lines,
            exit_status,
            crash,
        }
    }

    /// Build a log from a raw text excerpt, one line per line of text.
    pub fn from_excerpt(text: &str, signatures: &CrashSignatures) -> Self {
        let lines = text
            .lines()
            .map(|line| LogLine::new(LogStream::File, line.trim_end()))
            .collect();
        Self::scan(lines, None, signatures)
    }

    pub fn is_crash(&self) -> bool {
        self.crash.is_some()
    }

    /// Turn a detected crash into `CrashDetected`.
    pub fn into_result(self) -> LauncherResult<Self> {
        match self.crash {
            Some(report) => Err(LauncherError::CrashDetected(report)),
            None => Ok(self),
        }
    }

    /// True if any captured line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.line.contains(needle))
    }

    /// Captured lines joined with newlines.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.line.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_with_signature_yields_crash_detected() {
        let excerpt = "Loading level Physics/Base\n\
                       [Fatal] PhysX scene could not be created\n\
                       Shutting down";
        let log = CollectedLog::from_excerpt(excerpt, &CrashSignatures::default());
        assert!(log.is_crash());

        let err = log.into_result().unwrap_err();
        let report = err.crash_report().expect("crash report");
        assert_eq!(report.signature(), Some(r"\[Fatal\]"));
    }

    #[test]
    fn clean_excerpt_yields_no_crash() {
        let excerpt = "Loading level Physics/Base\nGetCollisionName: Right\nTest finished";
        let log = CollectedLog::from_excerpt(excerpt, &CrashSignatures::default())
            .into_result()
            .expect("clean log");
        assert_eq!(log.lines.len(), 3);
        assert!(log.contains("GetCollisionName"));
        assert_eq!(log.text(), excerpt);
    }

    #[test]
    fn empty_excerpt_is_clean() {
        let log = CollectedLog::from_excerpt("", &CrashSignatures::default());
        assert!(log.lines.is_empty());
        assert!(!log.is_crash());
    }
}
