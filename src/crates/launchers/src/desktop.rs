use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

use crate::capture::{CollectedLog, LogLine};
use crate::config::{LaunchConfig, StopRequest};
use crate::crash::{CrashReport, CrashSignatures};
use crate::error::{LauncherError, LauncherResult};
use crate::launcher::LauncherState;
use crate::platform::{LauncherKind, Platform};
use crate::process::{LineWait, ProcessHandle};

/// Launcher for executables started directly on the host: game, server, editor or any
/// other binary from the build directory.
pub struct DesktopLauncher {
    platform: Platform,
    kind: LauncherKind,
    state: LauncherState,
    process: Option<ProcessHandle>,
    stop_request: StopRequest,
    grace_period: Duration,
    signatures: CrashSignatures,
    /// Output kept after the process handle has been released.
    retained: Vec<LogLine>,
    /// Lines already checked for crash signatures while running.
    scanned: usize,
    exit_status: Option<ExitStatus>,
}

impl DesktopLauncher {
    pub fn new(platform: Platform, kind: LauncherKind) -> Self {
        Self {
            platform,
            kind,
            state: LauncherState::NotStarted,
            process: None,
            stop_request: StopRequest::default(),
            grace_period: Duration::ZERO,
            signatures: CrashSignatures::default(),
            retained: Vec::new(),
            scanned: 0,
            exit_status: None,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn kind(&self) -> &LauncherKind {
        &self.kind
    }

    pub fn state(&self) -> LauncherState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(ProcessHandle::pid)
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Spawn the configured executable and, if requested, wait for its ready line.
    pub fn launch(&mut self, config: &LaunchConfig) -> LauncherResult<()> {
        if self.state == LauncherState::Running {
            return Err(LauncherError::launch(
                config.target_name(),
                "launcher already has a running process",
            ));
        }
        check_executable(&config.executable)
            .map_err(|reason| LauncherError::launch(config.target_name(), reason))?;
        let signatures = CrashSignatures::with_extra(&config.crash_signatures)?;

        let mut process = ProcessHandle::spawn(config)?;
        log::info!(
            "launched {} {} (pid {}): {}",
            self.platform,
            self.kind,
            process.pid(),
            config.target_name()
        );

        self.signatures = signatures;
        self.stop_request = config.stop_request.clone();
        self.grace_period = config.grace_period;
        self.retained.clear();
        self.scanned = 0;
        self.exit_status = None;

        if let Some(needle) = &config.ready_line {
            match process.wait_for_line(needle, config.startup_timeout)? {
                LineWait::Seen => {}
                LineWait::Exited(status) => {
                    let lines = process.lines();
                    let report = self
                        .signatures
                        .scan(&lines)
                        .unwrap_or_else(|| CrashReport::abnormal_exit(status, &lines));
                    self.retained = lines;
                    self.exit_status = Some(status);
                    self.state = LauncherState::Crashed;
                    log::info!("{} exited before becoming ready: {report}", self.kind);
                    return Err(LauncherError::CrashDetected(report));
                }
                LineWait::TimedOut => {
                    let status = process.stop(&StopRequest::Kill, Duration::ZERO)?;
                    self.retained = process.lines();
                    self.exit_status = Some(status);
                    self.state = LauncherState::Stopped;
                    return Err(LauncherError::timeout(
                        format!("ready line {needle:?}"),
                        config.startup_timeout,
                    ));
                }
            }
        }

        self.process = Some(process);
        self.state = LauncherState::Running;
        Ok(())
    }

    /// Poll the process, recording a stop or crash if it has exited.
    pub fn is_alive(&mut self) -> bool {
        if self.state != LauncherState::Running {
            return false;
        }
        let polled = match self.process.as_mut() {
            Some(process) => process.try_wait(),
            None => return false,
        };
        match polled {
            Ok(None) if self.signature_seen() => {
                log::info!("{} reported a crash signature while running", self.kind);
                if let Some(mut process) = self.process.take() {
                    match process.stop(&StopRequest::Kill, Duration::ZERO) {
                        Ok(status) => self.exit_status = Some(status),
                        Err(err) => log::warn!("failed to kill crashed {}: {err}", self.kind),
                    }
                    self.retained = process.lines();
                }
                self.state = LauncherState::Crashed;
                false
            }
            Ok(None) => true,
            Ok(Some(_)) => {
                self.release();
                false
            }
            Err(err) => {
                log::warn!("failed to poll {}: {err}", self.kind);
                self.release();
                false
            }
        }
    }

    /// Wait up to `timeout` for the process to exit on its own.
    pub fn wait(&mut self, timeout: Duration) -> LauncherResult<Option<ExitStatus>> {
        let Some(process) = self.process.as_mut() else {
            return Ok(self.exit_status);
        };
        match process.wait_timeout(timeout)? {
            Some(_) => {
                self.release();
                Ok(self.exit_status)
            }
            None => Err(LauncherError::timeout(format!("{} to exit", self.kind), timeout)),
        }
    }

    /// Request a graceful exit and fall back to killing the process.
    pub fn stop(&mut self) -> LauncherResult<()> {
        // An exit that happened before the request is classified, not masked.
        self.is_alive();
        let Some(mut process) = self.process.take() else {
            if self.state != LauncherState::Crashed {
                self.state = LauncherState::Stopped;
            }
            return Ok(());
        };

        let status = process.stop(&self.stop_request, self.grace_period)?;
        self.retained = process.lines();
        self.exit_status = Some(status);
        if self.state == LauncherState::Running {
            self.state = LauncherState::Stopped;
        }
        log::info!("stopped {} ({status})", self.kind);
        Ok(())
    }

    /// Snapshot the captured output, reporting a crash as `CrashDetected`.
    pub fn collect_log(&mut self) -> LauncherResult<CollectedLog> {
        // Reap first so an exit that already happened is part of this snapshot.
        self.is_alive();

        let lines = match &self.process {
            Some(process) => process.lines(),
            None => self.retained.clone(),
        };
        let stopped_on_request = self.state == LauncherState::Stopped;
        let exit_status = if stopped_on_request {
            // A forced kill during `stop` is not a crash.
            None
        } else {
            self.exit_status
        };
        let mut collected = CollectedLog::scan(lines, exit_status, &self.signatures);
        collected.exit_status = self.exit_status;

        if collected.is_crash() && self.state == LauncherState::Running {
            if let Some(mut process) = self.process.take() {
                let status = process.stop(&StopRequest::Kill, Duration::ZERO)?;
                self.retained = process.lines();
                self.exit_status = Some(status);
            }
            self.state = LauncherState::Crashed;
            if let Some(report) = &collected.crash {
                log::info!("{} crashed: {report}", self.kind);
            }
        }
        collected.into_result()
    }

    /// Check output captured since the previous poll for a crash signature.
    fn signature_seen(&mut self) -> bool {
        let Some(process) = self.process.as_ref() else {
            return false;
        };
        let signatures = &self.signatures;
        process
            .with_lines_since(&mut self.scanned, |fresh| signatures.scan(fresh).is_some())
            .unwrap_or(false)
    }

    /// Move a reaped process into retained state and classify how it ended.
    fn release(&mut self) {
        let Some(process) = self.process.take() else {
            return;
        };
        let lines = process.lines();
        let status = process.exit_status();
        let crashed = self.signatures.scan(&lines).is_some()
            || status.map_or(true, |status| !status.success());
        self.retained = lines;
        self.exit_status = status;
        self.state = if crashed {
            LauncherState::Crashed
        } else {
            LauncherState::Stopped
        };
        log::info!(
            "{} exited on its own ({}), state {:?}",
            self.kind,
            status.map_or_else(|| "unknown status".to_string(), |status| status.to_string()),
            self.state
        );
    }
}

/// Reject paths that cannot be spawned before handing them to the OS.
fn check_executable(path: &Path) -> Result<(), String> {
    let metadata = std::fs::metadata(path).map_err(|err| format!("executable not found: {err}"))?;
    if !metadata.is_file() {
        return Err("executable path is not a file".to_string());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err("executable permission denied".to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_executable_is_launch_failure() {
        let mut launcher = DesktopLauncher::new(Platform::host(), LauncherKind::Game);
        let err = launcher
            .launch(&LaunchConfig::new("/definitely/not/here/Game.GameLauncher"))
            .unwrap_err();
        assert!(matches!(err, LauncherError::LaunchFailure { .. }));
        assert_eq!(launcher.state(), LauncherState::NotStarted);
        assert!(!launcher.is_alive());
    }

    #[test]
    fn directory_is_not_an_executable() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_executable(dir.path()).unwrap_err();
        assert!(err.contains("not a file"));
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Editor");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        let err = check_executable(&path).unwrap_err();
        assert!(err.contains("permission denied"));
    }

    #[cfg(unix)]
    fn shell(script: &str) -> LaunchConfig {
        LaunchConfig::new("/bin/sh")
            .with_args(["-c", script])
            .with_grace_period(Duration::from_millis(200))
    }

    #[cfg(unix)]
    #[test]
    fn exit_is_seen_while_a_background_child_holds_stdout() {
        let mut launcher = DesktopLauncher::new(Platform::host(), LauncherKind::Generic("sh".into()));
        launcher
            .launch(&shell("sleep 4 & echo started; exit 0").with_ready_line("started"))
            .unwrap();
        std::thread::sleep(Duration::from_millis(300));

        let start = std::time::Instant::now();
        assert!(!launcher.is_alive());
        assert!(
            start.elapsed() < Duration::from_secs(2),
            "is_alive blocked for {:?}",
            start.elapsed()
        );
        assert_eq!(launcher.state(), LauncherState::Stopped);
        assert!(launcher.collect_log().unwrap().contains("started"));
    }

    #[cfg(unix)]
    #[test]
    fn stop_is_bounded_while_a_background_child_holds_stdout() {
        let mut launcher = DesktopLauncher::new(Platform::host(), LauncherKind::Generic("sh".into()));
        launcher.launch(&shell("sleep 4 & sleep 10")).unwrap();
        assert!(launcher.is_alive());

        let start = std::time::Instant::now();
        launcher.stop().unwrap();
        assert!(
            start.elapsed() < Duration::from_secs(2),
            "stop blocked for {:?}",
            start.elapsed()
        );
        assert_eq!(launcher.state(), LauncherState::Stopped);
        assert!(!launcher.is_alive());
    }

    #[test]
    fn stop_before_launch_is_a_no_op() {
        let mut launcher = DesktopLauncher::new(Platform::host(), LauncherKind::Editor);
        launcher.stop().unwrap();
        launcher.stop().unwrap();
        assert_eq!(launcher.state(), LauncherState::Stopped);
        assert!(launcher.collect_log().unwrap().lines.is_empty());
    }
}
