use std::fmt;

use serde::{Deserialize, Serialize};

/// Operating system a launcher targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Windows,
    Mac,
    Linux,
    Android,
}

impl Platform {
    /// The desktop platform this process is running on.
    pub fn host() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Mac
        } else {
            Platform::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Mac => "mac",
            Platform::Linux => "linux",
            Platform::Android => "android",
        }
    }

    pub fn is_desktop(&self) -> bool {
        !matches!(self, Platform::Android)
    }

    pub(crate) fn exe_suffix(&self) -> &'static str {
        match self {
            Platform::Windows => ".exe",
            _ => "",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which engine executable a launcher starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LauncherKind {
    /// Windowed game launcher, `<Project>.GameLauncher`.
    Game,
    /// Headless server, `<Project>.ServerLauncher`.
    Dedicated,
    /// The editor.
    Editor,
    /// Any other executable in the build directory, named without extension.
    Generic(String),
}

impl LauncherKind {
    /// File stem of the executable for a project.
    pub fn executable_stem(&self, project: &str) -> String {
        match self {
            LauncherKind::Game => format!("{project}.GameLauncher"),
            LauncherKind::Dedicated => format!("{project}.ServerLauncher"),
            LauncherKind::Editor => "Editor".to_string(),
            LauncherKind::Generic(name) => name.clone(),
        }
    }

    /// Arguments every launch of this kind carries in addition to the project path.
    pub fn default_args(&self) -> &'static [&'static str] {
        match self {
            LauncherKind::Dedicated => &["-rhi=null"],
            LauncherKind::Editor => &["--autotest_mode"],
            LauncherKind::Game | LauncherKind::Generic(_) => &[],
        }
    }
}

impl fmt::Display for LauncherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LauncherKind::Game => f.write_str("game"),
            LauncherKind::Dedicated => f.write_str("dedicated"),
            LauncherKind::Editor => f.write_str("editor"),
            LauncherKind::Generic(name) => write!(f, "generic({name})"),
        }
    }
}
