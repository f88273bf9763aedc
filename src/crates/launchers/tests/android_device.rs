#![cfg(feature = "test-support")]

#[path = "launcher_support.rs"]
mod support;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use engine_launchers::{
    AndroidLauncher, AndroidSettings, LaunchConfig, Launcher, LauncherError, LauncherState,
    Platform,
};
use support::{fake_adb_path, init_logging};

const PACKAGE: &str = "org.o3de.AutomatedTesting";

/// A fake device directory plus an APK to deploy to it.
struct Device {
    dir: tempfile::TempDir,
    apk: PathBuf,
}

impl Device {
    fn new() -> Self {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("AutomatedTesting.apk");
        fs::write(&apk, b"PK\x03\x04").unwrap();
        Self { dir, apk }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn launcher(&self) -> Launcher {
        let settings = AndroidSettings::new(PACKAGE, ".AutomatedTestingActivity", &self.apk)
            .with_adb(fake_adb_path())
            .with_device(self.path().display().to_string());
        AndroidLauncher::new(settings).into()
    }

    fn config(&self) -> LaunchConfig {
        LaunchConfig::new(&self.apk)
    }

    fn write_logcat(&self, text: &str) {
        fs::write(self.path().join("logcat"), text).unwrap();
    }

    /// The app process disappears from the device.
    fn kill_app(&self) {
        fs::remove_file(self.path().join("pid")).unwrap();
    }

    fn app_running(&self) -> bool {
        self.path().join("pid").exists()
    }

    fn commands(&self) -> Vec<String> {
        fs::read_to_string(self.path().join("commands.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

#[test]
fn deploy_start_and_force_stop() {
    let device = Device::new();
    let mut launcher = device.launcher();
    assert_eq!(launcher.platform(), Platform::Android);

    launcher.launch(&device.config()).expect("app should start");
    assert_eq!(launcher.state(), LauncherState::Running);
    assert_eq!(launcher.pid(), Some(4242));
    assert!(launcher.is_alive());

    launcher.stop().expect("force-stop");
    assert_eq!(launcher.state(), LauncherState::Stopped);
    assert!(!launcher.is_alive());
    assert!(!device.app_running());
    launcher.stop().expect("second stop is a no-op");

    let commands = device.commands();
    assert_eq!(
        commands.first().map(String::as_str),
        Some(format!("install -r {}", device.apk.display()).as_str())
    );
    assert!(commands[1].starts_with(&format!(
        "shell am start -W -n {PACKAGE}/.AutomatedTestingActivity"
    )));
    assert_eq!(commands[2], format!("shell pidof {PACKAGE}"));
    assert_eq!(
        commands.last().map(String::as_str),
        Some(format!("shell am force-stop {PACKAGE}").as_str())
    );
}

#[test]
fn ready_line_is_read_from_the_device_log() {
    let device = Device::new();
    device.write_logcat("I O3DE    : Loading level\nI O3DE    : engine ready\n");
    let mut launcher = device.launcher();

    launcher
        .launch(
            &device
                .config()
                .with_ready_line("engine ready")
                .with_startup_timeout(Duration::from_secs(5)),
        )
        .expect("ready line should be found in logcat");
    assert!(launcher.is_alive());
    assert!(device
        .commands()
        .iter()
        .any(|command| command == "logcat -d --pid=4242"));
}

#[test]
fn crash_found_only_in_logcat_is_reported() {
    let device = Device::new();
    let mut launcher = device.launcher();
    launcher.launch(&device.config()).unwrap();
    assert!(launcher.is_alive());

    device.write_logcat(
        "E AndroidRuntime: FATAL EXCEPTION: main\n\
         E AndroidRuntime: java.lang.RuntimeException: native crash\n",
    );
    let err = launcher.collect_log().unwrap_err();
    let report = err.crash_report().expect("crash report");
    assert!(report.signature().is_some(), "{report}");
    assert!(report
        .excerpt
        .iter()
        .any(|line| line.contains("FATAL EXCEPTION")));
    assert_eq!(launcher.state(), LauncherState::Crashed);
    assert!(!device.app_running(), "crashed app should be force-stopped");

    launcher.stop().unwrap();
    assert_eq!(launcher.state(), LauncherState::Crashed);
}

#[test]
fn vanished_app_with_crash_banner_is_crashed() {
    let device = Device::new();
    let mut launcher = device.launcher();
    launcher.launch(&device.config()).unwrap();

    device.write_logcat("F libc    : Fatal signal 11 (SIGSEGV), code 1\n");
    device.kill_app();
    assert!(!launcher.is_alive());
    assert_eq!(launcher.state(), LauncherState::Crashed);
    assert!(matches!(
        launcher.collect_log(),
        Err(LauncherError::CrashDetected(_))
    ));
}

#[test]
fn vanished_app_without_crash_banner_is_stopped() {
    let device = Device::new();
    let mut launcher = device.launcher();
    launcher.launch(&device.config()).unwrap();

    device.write_logcat("I O3DE    : quitting\n");
    device.kill_app();
    assert!(!launcher.is_alive());
    assert_eq!(launcher.state(), LauncherState::Stopped);
    assert!(launcher.collect_log().unwrap().contains("quitting"));
}

#[test]
fn failed_activity_start_is_launch_failure() {
    let device = Device::new();
    fs::write(
        device.path().join("start_error"),
        "Activity class {org.o3de.AutomatedTesting/.AutomatedTestingActivity} does not exist.",
    )
    .unwrap();
    let mut launcher = device.launcher();

    match launcher.launch(&device.config()).unwrap_err() {
        LauncherError::LaunchFailure { reason, .. } => {
            assert!(reason.starts_with("start failed"), "{reason}")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(launcher.state(), LauncherState::NotStarted);
    assert!(!launcher.is_alive());
}
