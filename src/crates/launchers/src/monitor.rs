use std::thread;
use std::time::{Duration, Instant};

use crate::capture::CollectedLog;
use crate::error::{LauncherError, LauncherResult};
use crate::launcher::Launcher;

const MONITOR_INTERVAL: Duration = Duration::from_millis(100);

/// Watches a launcher's output for lines a test expects, and lines it must never see.
#[derive(Debug, Clone, Default)]
pub struct LogMonitor {
    expected: Vec<String>,
    unexpected: Vec<String>,
}

/// Progress of a monitor against one log snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorVerdict {
    pub missing: Vec<String>,
    pub unexpected_seen: Vec<String>,
}

impl MonitorVerdict {
    pub fn is_satisfied(&self) -> bool {
        self.missing.is_empty() && self.unexpected_seen.is_empty()
    }
}

impl LogMonitor {
    pub fn new<E, U>(expected: E, unexpected: U) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        U: IntoIterator,
        U::Item: Into<String>,
    {
        Self {
            expected: expected.into_iter().map(Into::into).collect(),
            unexpected: unexpected.into_iter().map(Into::into).collect(),
        }
    }

    pub fn expect_line(mut self, line: impl Into<String>) -> Self {
        self.expected.push(line.into());
        self
    }

    pub fn reject_line(mut self, line: impl Into<String>) -> Self {
        self.unexpected.push(line.into());
        self
    }

    /// Compare a log snapshot against the expectations.
    pub fn check(&self, log: &CollectedLog) -> MonitorVerdict {
        MonitorVerdict {
            missing: self
                .expected
                .iter()
                .filter(|needle| !log.contains(needle))
                .cloned()
                .collect(),
            unexpected_seen: self
                .unexpected
                .iter()
                .filter(|needle| log.contains(needle))
                .cloned()
                .collect(),
        }
    }

    /// Poll the launcher until every expected line has shown up.
    ///
    /// Fails with `ExpectationFailed` as soon as an unexpected line appears or the process
    /// exits with lines still missing, `TimeoutFailure` at the deadline, and `CrashDetected`
    /// if the launcher reports a crash.
    pub fn wait_on(&self, launcher: &mut Launcher, timeout: Duration) -> LauncherResult<CollectedLog> {
        let start = Instant::now();
        loop {
            let alive = launcher.is_alive();
            let log = launcher.collect_log()?;
            let verdict = self.check(&log);

            if !verdict.unexpected_seen.is_empty() {
                return Err(LauncherError::ExpectationFailed(format!(
                    "unexpected lines found: {}",
                    verdict.unexpected_seen.join(", ")
                )));
            }
            if verdict.missing.is_empty() {
                log::debug!("all {} expected lines seen", self.expected.len());
                return Ok(log);
            }
            if !alive {
                return Err(LauncherError::ExpectationFailed(format!(
                    "process exited before these lines appeared: {}",
                    verdict.missing.join(", ")
                )));
            }
            if start.elapsed() >= timeout {
                return Err(LauncherError::timeout(
                    format!("expected lines {}", verdict.missing.join(", ")),
                    timeout,
                ));
            }
            thread::sleep(MONITOR_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crash::CrashSignatures;
    use pretty_assertions::assert_eq;

    #[test]
    fn verdict_lists_missing_and_unexpected_lines() {
        let log = CollectedLog::from_excerpt(
            "Layer Name: Right\nGroupName: All\n",
            &CrashSignatures::default(),
        );
        let monitor = LogMonitor::new(["Layer Name: Right", "Test passed"], ["GroupName: All"]);
        assert_eq!(
            monitor.check(&log),
            MonitorVerdict {
                missing: vec!["Test passed".to_string()],
                unexpected_seen: vec!["GroupName: All".to_string()],
            }
        );
    }

    #[test]
    fn empty_monitor_is_always_satisfied() {
        let log = CollectedLog::from_excerpt("anything", &CrashSignatures::default());
        assert!(LogMonitor::default().check(&log).is_satisfied());
    }

    #[test]
    fn builder_methods_extend_lists() {
        let monitor = LogMonitor::default()
            .expect_line("GroupName: ")
            .reject_line("GroupName: GroupLeft");
        let log = CollectedLog::from_excerpt("GroupName: Right", &CrashSignatures::default());
        assert!(monitor.check(&log).is_satisfied());
    }
}
