//! Launchers that start, monitor and stop engine processes for end-to-end tests.
//!
//! Each platform variant (host desktop binaries, Android builds driven through `adb`) sits
//! behind the [`Launcher`] enum. A launcher owns at most one live process and moves through
//! [`LauncherState`]: `NotStarted -> Running -> (Stopped | Crashed)`.
//!
//! Typical usage:
//! ```no_run
//! use std::time::Duration;
//! use engine_launchers::{LogMonitor, TestSession, Workspace};
//!
//! let workspace = Workspace::new("/build/bin/profile", "/src/AutomatedTesting", "AutomatedTesting");
//! let mut session = TestSession::new(workspace);
//! session
//!     .revert_on_teardown(["/src/AutomatedTesting/Registry/physxsystemconfiguration.setreg"], "/tmp/backup")
//!     .expect("config snapshot");
//!
//! let editor = session.launcher("linux_editor").expect("registered platform");
//! editor
//!     .start_with_args(["--runpythontest", "ForceRegion_Impulses.py"])
//!     .expect("editor should launch");
//!
//! LogMonitor::new(["Test passed"], ["Test failed"])
//!     .wait_on(&mut editor.launcher, Duration::from_secs(120))
//!     .expect("expected lines");
//! session.teardown().expect("launchers stopped and config restored");
//! ```

mod android;
mod capture;
mod config;
mod crash;
mod desktop;
mod error;
mod launcher;
mod monitor;
mod platform;
mod process;
mod registry;
mod session;
mod snapshot;
mod workspace;

pub use android::{Adb, AndroidLauncher};
pub use capture::{CollectedLog, LogLine, LogStream};
pub use config::{LaunchConfig, StopRequest};
pub use crash::{CrashCause, CrashReport, CrashSignatures, DEFAULT_CRASH_SIGNATURES};
pub use desktop::DesktopLauncher;
pub use error::{LauncherError, LauncherResult};
pub use launcher::{Launcher, LauncherState, RunReport};
pub use monitor::{LogMonitor, MonitorVerdict};
pub use platform::{LauncherKind, Platform};
pub use registry::{LauncherFactory, LauncherRegistry, PreparedLauncher};
pub use session::TestSession;
pub use snapshot::{ConfigSnapshot, SnapshotEntry};
pub use workspace::{AndroidSettings, Workspace};
