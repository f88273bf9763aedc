use std::fmt;
use std::process::ExitStatus;

use regex::Regex;

use crate::capture::LogLine;
use crate::error::{LauncherError, LauncherResult};

/// Patterns that mark a fatal error in engine, server or device output.
pub const DEFAULT_CRASH_SIGNATURES: &[&str] = &[
    r"Exception with exit code",
    r"\[Fatal\]",
    r"(?i)fatal error",
    r"(?i)unhandled exception",
    r"(?i)access violation",
    r"Segmentation fault",
    r"SIGSEGV",
    r"ERROR: AddressSanitizer",
    r"panicked at",
    r"FATAL EXCEPTION",
    r"Fatal signal \d+",
];

/// Lines of context kept before the offending line.
const EXCERPT_CONTEXT: usize = 5;

/// Why a process was judged to have crashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrashCause {
    /// A crash signature matched a captured line.
    Signature { pattern: String, line: String },
    /// The process exited with a failing status.
    AbnormalExit(String),
}

/// Evidence collected when a crash is detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    pub cause: CrashCause,
    /// Captured lines leading up to and including the crash line.
    pub excerpt: Vec<String>,
}

impl CrashReport {
    /// Build a report for a process that exited with a failing status.
    pub fn abnormal_exit(status: ExitStatus, lines: &[LogLine]) -> Self {
        Self::exited(status.to_string(), lines)
    }

    /// Build a report for a process that ended in a way described by `description`.
    pub fn exited(description: impl Into<String>, lines: &[LogLine]) -> Self {
        let start = lines.len().saturating_sub(EXCERPT_CONTEXT);
        Self {
            cause: CrashCause::AbnormalExit(description.into()),
            excerpt: lines[start..].iter().map(|line| line.line.clone()).collect(),
        }
    }

    /// The matched signature, if the crash came from log output.
    pub fn signature(&self) -> Option<&str> {
        match &self.cause {
            CrashCause::Signature { pattern, .. } => Some(pattern),
            CrashCause::AbnormalExit(_) => None,
        }
    }
}

impl fmt::Display for CrashReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            CrashCause::Signature { pattern, line } => {
                write!(f, "signature '{pattern}' matched: {line}")
            }
            CrashCause::AbnormalExit(status) => write!(f, "process exited abnormally ({status})"),
        }
    }
}

/// Compiled set of crash signatures.
#[derive(Debug, Clone)]
pub struct CrashSignatures {
    patterns: Vec<Regex>,
}

impl CrashSignatures {
    /// Compile the default signatures plus any extra patterns.
    pub fn with_extra<S: AsRef<str>>(extra: &[S]) -> LauncherResult<Self> {
        let mut patterns = Vec::with_capacity(DEFAULT_CRASH_SIGNATURES.len() + extra.len());
        for pattern in DEFAULT_CRASH_SIGNATURES
            .iter()
            .copied()
            .chain(extra.iter().map(AsRef::as_ref))
        {
            let regex = Regex::new(pattern).map_err(|err| {
                LauncherError::launch("crash signatures", format!("bad pattern {pattern:?}: {err}"))
            })?;
            patterns.push(regex);
        }
        Ok(Self { patterns })
    }

    /// Return the first captured line matching any signature.
    pub fn scan(&self, lines: &[LogLine]) -> Option<CrashReport> {
        for (index, line) in lines.iter().enumerate() {
            if let Some(regex) = self.patterns.iter().find(|regex| regex.is_match(&line.line)) {
                let start = index.saturating_sub(EXCERPT_CONTEXT);
                return Some(CrashReport {
                    cause: CrashCause::Signature {
                        pattern: regex.as_str().to_string(),
                        line: line.line.clone(),
                    },
                    excerpt: lines[start..=index]
                        .iter()
                        .map(|line| line.line.clone())
                        .collect(),
                });
            }
        }
        None
    }
}

impl Default for CrashSignatures {
    fn default() -> Self {
        let patterns = DEFAULT_CRASH_SIGNATURES
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect();
        Self { patterns }
    }
}
