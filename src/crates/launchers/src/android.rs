use std::path::PathBuf;
use std::process::{Command, Output};
use std::thread;
use std::time::{Duration, Instant};

use crate::capture::{CollectedLog, LogLine, LogStream};
use crate::config::LaunchConfig;
use crate::crash::{CrashReport, CrashSignatures};
use crate::error::{LauncherError, LauncherResult};
use crate::launcher::LauncherState;
use crate::workspace::AndroidSettings;

const DEVICE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Thin wrapper over the `adb` command line for one device.
#[derive(Debug, Clone)]
pub struct Adb {
    program: PathBuf,
    device: Option<String>,
}

impl Adb {
    /// Use `settings.adb` when set, otherwise look `adb` up on `PATH`.
    pub fn locate(settings: &AndroidSettings) -> LauncherResult<Self> {
        let program = match &settings.adb {
            Some(path) => path.clone(),
            None => which::which("adb")
                .map_err(|err| LauncherError::launch("adb", format!("adb not found: {err}")))?,
        };
        Ok(Self {
            program,
            device: settings.device.clone(),
        })
    }

    /// Full argument list for an adb invocation, including the device selector.
    pub fn command_args(&self, args: &[String]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(serial) = &self.device {
            full.push("-s".to_string());
            full.push(serial.clone());
        }
        full.extend(args.iter().cloned());
        full
    }

    fn run(&self, args: &[String]) -> std::io::Result<Output> {
        let full = self.command_args(args);
        log::debug!("{} {}", self.program.display(), full.join(" "));
        Command::new(&self.program).args(&full).output()
    }

    /// Run a step of the launch sequence, turning any failure into `LaunchFailure`.
    fn step(&self, step: &str, args: &[String]) -> LauncherResult<String> {
        let output = self
            .run(args)
            .map_err(|err| LauncherError::launch("android", format!("{step}: {err}")))?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        // `am start` reports errors on stdout with a zero exit code.
        if !output.status.success() || stdout.contains("Error:") || stdout.contains("Failure") {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LauncherError::launch(
                "android",
                format!("{step} failed ({}): {} {}", output.status, stdout.trim(), stderr.trim()),
            ));
        }
        Ok(stdout)
    }
}

pub(crate) fn install_args(apk: &str) -> Vec<String> {
    vec!["install".into(), "-r".into(), apk.into()]
}

pub(crate) fn start_args(package: &str, activity: &str, args: &[String]) -> Vec<String> {
    let mut full = vec![
        "shell".to_string(),
        "am".to_string(),
        "start".to_string(),
        "-W".to_string(),
        "-n".to_string(),
        format!("{package}/{activity}"),
    ];
    if !args.is_empty() {
        full.push("--es".to_string());
        full.push("args".to_string());
        full.push(shell_quote(&args.join(" ")));
    }
    full
}

pub(crate) fn pidof_args(package: &str) -> Vec<String> {
    vec!["shell".into(), "pidof".into(), package.into()]
}

pub(crate) fn force_stop_args(package: &str) -> Vec<String> {
    vec!["shell".into(), "am".into(), "force-stop".into(), package.into()]
}

pub(crate) fn logcat_args(pid: u32) -> Vec<String> {
    vec!["logcat".into(), "-d".into(), format!("--pid={pid}")]
}

/// `adb shell` joins its arguments into one device-side command line.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn parse_pid(output: &str) -> Option<u32> {
    output.split_whitespace().next()?.parse().ok()
}

/// Launcher that deploys a build to an Android device and drives it through `adb`.
pub struct AndroidLauncher {
    settings: AndroidSettings,
    adb: Option<Adb>,
    state: LauncherState,
    pid: Option<u32>,
    signatures: CrashSignatures,
    device_log: Vec<LogLine>,
}

impl AndroidLauncher {
    pub fn new(settings: AndroidSettings) -> Self {
        Self {
            settings,
            adb: None,
            state: LauncherState::NotStarted,
            pid: None,
            signatures: CrashSignatures::default(),
            device_log: Vec::new(),
        }
    }

    pub fn settings(&self) -> &AndroidSettings {
        &self.settings
    }

    pub fn state(&self) -> LauncherState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid.filter(|_| self.state == LauncherState::Running)
    }

    /// Install `config.executable` as an APK and start the configured activity.
    pub fn launch(&mut self, config: &LaunchConfig) -> LauncherResult<()> {
        if self.state == LauncherState::Running {
            return Err(LauncherError::launch(
                config.target_name(),
                "launcher already has a running app",
            ));
        }
        if !config.executable.is_file() {
            return Err(LauncherError::launch(
                config.target_name(),
                "apk not found",
            ));
        }
        let signatures = CrashSignatures::with_extra(&config.crash_signatures)?;
        let adb = Adb::locate(&self.settings)?;

        let package = self.settings.package.clone();
        adb.step("install", &install_args(&config.executable.display().to_string()))?;
        adb.step(
            "start",
            &start_args(&package, &self.settings.activity, &config.args),
        )?;
        let pid_text = adb.step("pidof", &pidof_args(&package))?;
        let pid = parse_pid(&pid_text).ok_or_else(|| {
            LauncherError::launch(config.target_name(), format!("{package} is not running after start"))
        })?;
        log::info!("launched {package} on android (pid {pid})");

        self.signatures = signatures;
        self.device_log.clear();
        self.pid = Some(pid);
        self.adb = Some(adb);
        self.state = LauncherState::Running;

        if let Some(needle) = &config.ready_line {
            self.wait_for_device_line(needle, config.startup_timeout)?;
        }
        Ok(())
    }

    fn wait_for_device_line(&mut self, needle: &str, timeout: Duration) -> LauncherResult<()> {
        let start = Instant::now();
        loop {
            self.refresh_device_log();
            if self.device_log.iter().any(|line| line.line.contains(needle)) {
                return Ok(());
            }
            if !self.is_alive() {
                self.state = LauncherState::Crashed;
                let report = self.signatures.scan(&self.device_log).unwrap_or_else(|| {
                    CrashReport::exited("app exited before becoming ready", &self.device_log)
                });
                return Err(LauncherError::CrashDetected(report));
            }
            if start.elapsed() >= timeout {
                self.stop()?;
                return Err(LauncherError::timeout(format!("ready line {needle:?}"), timeout));
            }
            thread::sleep(DEVICE_POLL_INTERVAL);
        }
    }

    /// Check whether the app still has a process on the device.
    pub fn is_alive(&mut self) -> bool {
        if self.state != LauncherState::Running {
            return false;
        }
        let Some(adb) = &self.adb else {
            return false;
        };
        let alive = match adb.run(&pidof_args(&self.settings.package)) {
            Ok(output) => {
                output.status.success()
                    && parse_pid(&String::from_utf8_lossy(&output.stdout)) == self.pid
            }
            Err(err) => {
                log::warn!("failed to query {} on device: {err}", self.settings.package);
                false
            }
        };
        if !alive {
            self.refresh_device_log();
            self.state = if self.signatures.scan(&self.device_log).is_some() {
                LauncherState::Crashed
            } else {
                // A vanished app without a crash banner was closed, not crashed.
                LauncherState::Stopped
            };
            log::info!(
                "{} is no longer running, state {:?}",
                self.settings.package,
                self.state
            );
        }
        alive
    }

    pub fn wait(&mut self, timeout: Duration) -> LauncherResult<()> {
        let start = Instant::now();
        while self.is_alive() {
            if start.elapsed() >= timeout {
                return Err(LauncherError::timeout(
                    format!("{} to exit", self.settings.package),
                    timeout,
                ));
            }
            thread::sleep(DEVICE_POLL_INTERVAL);
        }
        Ok(())
    }

    /// Force-stop the app. Safe to call repeatedly.
    pub fn stop(&mut self) -> LauncherResult<()> {
        if self.state != LauncherState::Running {
            if self.state == LauncherState::NotStarted {
                self.state = LauncherState::Stopped;
            }
            return Ok(());
        }
        self.refresh_device_log();
        if let Some(adb) = &self.adb {
            let output = adb.run(&force_stop_args(&self.settings.package))?;
            if !output.status.success() {
                log::warn!(
                    "force-stop of {} exited with {}",
                    self.settings.package,
                    output.status
                );
            }
        }
        self.state = LauncherState::Stopped;
        log::info!("stopped {}", self.settings.package);
        Ok(())
    }

    /// Device log lines of the app process; `CrashDetected` on a crash banner.
    pub fn collect_log(&mut self) -> LauncherResult<CollectedLog> {
        if self.state == LauncherState::Running {
            self.refresh_device_log();
        }
        let collected = CollectedLog::scan(self.device_log.clone(), None, &self.signatures);
        if collected.is_crash() && self.state == LauncherState::Running {
            self.stop()?;
            self.state = LauncherState::Crashed;
        }
        collected.into_result()
    }

    fn refresh_device_log(&mut self) {
        let (Some(adb), Some(pid)) = (&self.adb, self.pid) else {
            return;
        };
        match adb.run(&logcat_args(pid)) {
            Ok(output) if output.status.success() => {
                self.device_log = String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .map(|line| LogLine::new(LogStream::Device, line.trim_end()))
                    .collect();
            }
            Ok(output) => log::warn!("logcat exited with {}", output.status),
            Err(err) => log::warn!("failed to read device log: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn settings() -> AndroidSettings {
        AndroidSettings::new(
            "org.o3de.AutomatedTesting",
            ".AutomatedTestingActivity",
            "/build/android/app.apk",
        )
    }

    #[test]
    fn device_serial_prefixes_every_command() {
        let adb = Adb {
            program: PathBuf::from("adb"),
            device: Some("emulator-5554".into()),
        };
        assert_eq!(
            adb.command_args(&pidof_args("org.o3de.AutomatedTesting")),
            vec!["-s", "emulator-5554", "shell", "pidof", "org.o3de.AutomatedTesting"]
        );
    }

    #[test]
    fn start_passes_arguments_as_one_quoted_extra() {
        let args = vec!["+LoadLevel".to_string(), "it's a level".to_string()];
        assert_eq!(
            start_args("org.o3de.Game", ".GameActivity", &args),
            vec![
                "shell",
                "am",
                "start",
                "-W",
                "-n",
                "org.o3de.Game/.GameActivity",
                "--es",
                "args",
                r"'+LoadLevel it'\''s a level'",
            ]
        );
        assert_eq!(start_args("org.o3de.Game", ".GameActivity", &[]).len(), 6);
    }

    #[test]
    fn install_and_logcat_commands() {
        assert_eq!(install_args("/tmp/app.apk"), vec!["install", "-r", "/tmp/app.apk"]);
        assert_eq!(logcat_args(4242), vec!["logcat", "-d", "--pid=4242"]);
        assert_eq!(
            force_stop_args("org.o3de.Game"),
            vec!["shell", "am", "force-stop", "org.o3de.Game"]
        );
    }

    #[test]
    fn pid_parsing_takes_first_pid() {
        assert_eq!(parse_pid("12345\n"), Some(12345));
        assert_eq!(parse_pid("123 456"), Some(123));
        assert_eq!(parse_pid(""), None);
    }

    #[test]
    fn missing_apk_is_launch_failure() {
        let mut launcher = AndroidLauncher::new(settings().with_adb("/nonexistent/adb"));
        let err = launcher
            .launch(&LaunchConfig::new("/nonexistent/app.apk"))
            .unwrap_err();
        assert!(matches!(err, LauncherError::LaunchFailure { .. }));
        assert_eq!(launcher.state(), LauncherState::NotStarted);
    }

    #[test]
    fn missing_adb_is_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("app.apk");
        std::fs::write(&apk, b"PK").unwrap();
        let mut launcher = AndroidLauncher::new(settings().with_adb(dir.path().join("no-adb")));
        let err = launcher.launch(&LaunchConfig::new(&apk)).unwrap_err();
        match err {
            LauncherError::LaunchFailure { reason, .. } => assert!(reason.starts_with("install")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!launcher.is_alive());
    }

    #[test]
    fn stop_is_idempotent_without_device() {
        let mut launcher = AndroidLauncher::new(settings());
        launcher.stop().unwrap();
        launcher.stop().unwrap();
        assert_eq!(launcher.state(), LauncherState::Stopped);
        assert!(launcher.collect_log().unwrap().lines.is_empty());
    }
}
