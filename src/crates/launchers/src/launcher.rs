use std::process::ExitStatus;
use std::time::Duration;

use crate::android::AndroidLauncher;
use crate::capture::CollectedLog;
use crate::config::LaunchConfig;
use crate::desktop::DesktopLauncher;
use crate::error::LauncherResult;
use crate::platform::{LauncherKind, Platform};

/// Lifecycle of the process owned by a launcher.
///
/// `NotStarted -> Running -> (Stopped | Crashed)`. A new `launch` starts a fresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherState {
    NotStarted,
    Running,
    Stopped,
    Crashed,
}

/// A process launcher for one platform variant.
pub enum Launcher {
    Desktop(DesktopLauncher),
    Android(AndroidLauncher),
}

/// Outcome of `Launcher::run`.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub exit_status: Option<ExitStatus>,
    pub log: CollectedLog,
}

impl Launcher {
    /// Launcher for any executable on the host platform.
    pub fn host(kind: LauncherKind) -> Self {
        Launcher::Desktop(DesktopLauncher::new(Platform::host(), kind))
    }

    pub fn platform(&self) -> Platform {
        match self {
            Launcher::Desktop(inner) => inner.platform(),
            Launcher::Android(_) => Platform::Android,
        }
    }

    pub fn state(&self) -> LauncherState {
        match self {
            Launcher::Desktop(inner) => inner.state(),
            Launcher::Android(inner) => inner.state(),
        }
    }

    /// Process id of the live process, if any.
    pub fn pid(&self) -> Option<u32> {
        match self {
            Launcher::Desktop(inner) => inner.pid(),
            Launcher::Android(inner) => inner.pid(),
        }
    }

    /// Exit status of the last process, for variants that can observe it.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self {
            Launcher::Desktop(inner) => inner.exit_status(),
            Launcher::Android(_) => None,
        }
    }

    /// Start the process described by `config`.
    pub fn launch(&mut self, config: &LaunchConfig) -> LauncherResult<()> {
        match self {
            Launcher::Desktop(inner) => inner.launch(config),
            Launcher::Android(inner) => inner.launch(config),
        }
    }

    /// Poll liveness; an exit or crash noticed here updates the state.
    pub fn is_alive(&mut self) -> bool {
        match self {
            Launcher::Desktop(inner) => inner.is_alive(),
            Launcher::Android(inner) => inner.is_alive(),
        }
    }

    /// Stop the process. Safe to call repeatedly.
    pub fn stop(&mut self) -> LauncherResult<()> {
        match self {
            Launcher::Desktop(inner) => inner.stop(),
            Launcher::Android(inner) => inner.stop(),
        }
    }

    /// Everything captured so far; `CrashDetected` if the output or exit shows a crash.
    pub fn collect_log(&mut self) -> LauncherResult<CollectedLog> {
        match self {
            Launcher::Desktop(inner) => inner.collect_log(),
            Launcher::Android(inner) => inner.collect_log(),
        }
    }

    /// Wait for the process to exit on its own within `timeout`.
    pub fn wait(&mut self, timeout: Duration) -> LauncherResult<Option<ExitStatus>> {
        match self {
            Launcher::Desktop(inner) => inner.wait(timeout),
            Launcher::Android(inner) => inner.wait(timeout).map(|_| None),
        }
    }

    /// Launch, wait for the process to finish within `config.timeout`, and check the result.
    ///
    /// The process is stopped on every path. A failing exit status or a crash signature
    /// in the output is reported as `CrashDetected`.
    pub fn run(&mut self, config: &LaunchConfig) -> LauncherResult<RunReport> {
        self.launch(config)?;
        let waited = self.wait(config.timeout);
        let stopped = self.stop();
        let exit_status = waited?;
        stopped?;

        let log = self.collect_log()?;
        Ok(RunReport { exit_status, log })
    }
}

impl From<DesktopLauncher> for Launcher {
    fn from(inner: DesktopLauncher) -> Self {
        Launcher::Desktop(inner)
    }
}

impl From<AndroidLauncher> for Launcher {
    fn from(inner: AndroidLauncher) -> Self {
        Launcher::Android(inner)
    }
}
