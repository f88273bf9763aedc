use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::LaunchConfig;
use crate::error::LauncherResult;
use crate::platform::{LauncherKind, Platform};

/// Device-side settings for Android launches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AndroidSettings {
    /// Explicit `adb` path; looked up on `PATH` when absent.
    #[serde(default)]
    pub adb: Option<PathBuf>,
    /// Device serial passed through `adb -s`.
    #[serde(default)]
    pub device: Option<String>,
    pub package: String,
    pub activity: String,
    /// APK deployed on launch.
    pub apk: PathBuf,
}

impl AndroidSettings {
    pub fn new(
        package: impl Into<String>,
        activity: impl Into<String>,
        apk: impl Into<PathBuf>,
    ) -> Self {
        Self {
            adb: None,
            device: None,
            package: package.into(),
            activity: activity.into(),
            apk: apk.into(),
        }
    }

    pub fn with_adb(mut self, adb: impl Into<PathBuf>) -> Self {
        self.adb = Some(adb.into());
        self
    }

    pub fn with_device(mut self, serial: impl Into<String>) -> Self {
        self.device = Some(serial.into());
        self
    }
}

/// Build and project layout that launchers resolve their executables from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Directory holding the built executables.
    pub build_dir: PathBuf,
    /// Project root passed to the engine as `project_path`.
    pub project_path: PathBuf,
    /// Project name used to derive launcher executable names.
    pub project: String,
    /// Executable name for the generic launcher entry, without platform suffix.
    #[serde(default)]
    pub generic_executable: Option<String>,
    #[serde(default)]
    pub android: Option<AndroidSettings>,
}

impl Workspace {
    pub fn new(
        build_dir: impl Into<PathBuf>,
        project_path: impl Into<PathBuf>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            build_dir: build_dir.into(),
            project_path: project_path.into(),
            project: project.into(),
            generic_executable: None,
            android: None,
        }
    }

    pub fn with_android(mut self, settings: AndroidSettings) -> Self {
        self.android = Some(settings);
        self
    }

    pub fn with_generic_executable(mut self, name: impl Into<String>) -> Self {
        self.generic_executable = Some(name.into());
        self
    }

    /// Load a workspace description from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> LauncherResult<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Path of the executable for a desktop platform and launcher kind.
    pub fn binary_path(&self, platform: Platform, kind: &LauncherKind) -> PathBuf {
        let stem = kind.executable_stem(&self.project);
        match (platform, kind) {
            (Platform::Mac, LauncherKind::Game | LauncherKind::Dedicated) => self
                .build_dir
                .join(format!("{stem}.app"))
                .join("Contents")
                .join("MacOS")
                .join(stem),
            _ => self
                .build_dir
                .join(format!("{stem}{}", platform.exe_suffix())),
        }
    }

    /// Default launch config for a platform and launcher kind.
    pub fn launch_config(&self, platform: Platform, kind: &LauncherKind) -> LaunchConfig {
        let executable = match (platform, &self.android) {
            (Platform::Android, Some(settings)) => settings.apk.clone(),
            _ => self.binary_path(platform, kind),
        };
        LaunchConfig::new(executable)
            .with_arg(self.project_path_arg())
            .with_args(kind.default_args().iter().copied())
            .with_working_directory(&self.build_dir)
    }

    fn project_path_arg(&self) -> String {
        format!(
            "--regset=/Amazon/AzCore/Bootstrap/project_path={}",
            self.project_path.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn workspace() -> Workspace {
        Workspace::new("/build/bin/profile", "/src/AutomatedTesting", "AutomatedTesting")
    }

    #[test]
    fn windows_binaries_have_exe_suffix() {
        let path = workspace().binary_path(Platform::Windows, &LauncherKind::Game);
        assert_eq!(
            path,
            PathBuf::from("/build/bin/profile/AutomatedTesting.GameLauncher.exe")
        );
    }

    #[test]
    fn mac_game_launcher_lives_in_app_bundle() {
        let path = workspace().binary_path(Platform::Mac, &LauncherKind::Game);
        assert_eq!(
            path,
            PathBuf::from(
                "/build/bin/profile/AutomatedTesting.GameLauncher.app/Contents/MacOS/AutomatedTesting.GameLauncher"
            )
        );
    }

    #[test]
    fn dedicated_config_runs_headless() {
        let config = workspace().launch_config(Platform::Linux, &LauncherKind::Dedicated);
        assert_eq!(
            config.executable,
            PathBuf::from("/build/bin/profile/AutomatedTesting.ServerLauncher")
        );
        assert_eq!(
            config.args,
            vec![
                "--regset=/Amazon/AzCore/Bootstrap/project_path=/src/AutomatedTesting".to_string(),
                "-rhi=null".to_string(),
            ]
        );
        assert_eq!(
            config.working_directory,
            Some(PathBuf::from("/build/bin/profile"))
        );
    }

    #[test]
    fn android_config_targets_apk() {
        let ws = workspace().with_android(AndroidSettings::new(
            "org.o3de.AutomatedTesting",
            ".AutomatedTestingActivity",
            "/build/android/app.apk",
        ));
        let config = ws.launch_config(Platform::Android, &LauncherKind::Game);
        assert_eq!(config.executable, PathBuf::from("/build/android/app.apk"));
    }

    #[test]
    fn workspace_parses_from_json() {
        let ws: Workspace = serde_json::from_str(
            r#"{
                "build_dir": "/build/bin/profile",
                "project_path": "/src/AutomatedTesting",
                "project": "AutomatedTesting",
                "android": {
                    "package": "org.o3de.AutomatedTesting",
                    "activity": ".AutomatedTestingActivity",
                    "apk": "/build/android/app.apk",
                    "device": "emulator-5554"
                }
            }"#,
        )
        .unwrap();
        let android = ws.android.expect("android settings");
        assert_eq!(android.device.as_deref(), Some("emulator-5554"));
        assert_eq!(android.adb, None);
    }
}
