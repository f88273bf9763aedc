use std::collections::BTreeMap;

use crate::android::AndroidLauncher;
use crate::config::LaunchConfig;
use crate::desktop::DesktopLauncher;
use crate::error::{LauncherError, LauncherResult};
use crate::launcher::Launcher;
use crate::platform::{LauncherKind, Platform};
use crate::workspace::Workspace;

/// A launcher paired with the config its platform entry derives from the workspace.
pub struct PreparedLauncher {
    pub launcher: Launcher,
    /// Default config; tests may clone and extend it before launching.
    pub config: LaunchConfig,
}

impl PreparedLauncher {
    /// Launch with the default config.
    pub fn start(&mut self) -> LauncherResult<()> {
        self.launcher.launch(&self.config)
    }

    /// Launch with the default config plus extra arguments.
    pub fn start_with_args<I, S>(&mut self, args: I) -> LauncherResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let config = self.config.clone().with_args(args);
        self.launcher.launch(&config)
    }
}

/// Builds a launcher for a workspace.
pub type LauncherFactory = fn(&Workspace) -> LauncherResult<PreparedLauncher>;

/// Named launcher factories, one per platform entry a test can ask for.
pub struct LauncherRegistry {
    factories: BTreeMap<String, LauncherFactory>,
}

impl LauncherRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the stock desktop and Android entries.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("windows", |ws| desktop(ws, Platform::Windows, LauncherKind::Game));
        registry.register("windows_editor", |ws| {
            desktop(ws, Platform::Windows, LauncherKind::Editor)
        });
        registry.register("windows_dedicated", |ws| {
            desktop(ws, Platform::Windows, LauncherKind::Dedicated)
        });
        registry.register("windows_generic", |ws| generic(ws, Platform::Windows));
        registry.register("mac", |ws| desktop(ws, Platform::Mac, LauncherKind::Game));
        registry.register("linux", |ws| desktop(ws, Platform::Linux, LauncherKind::Game));
        registry.register("linux_editor", |ws| {
            desktop(ws, Platform::Linux, LauncherKind::Editor)
        });
        registry.register("linux_dedicated", |ws| {
            desktop(ws, Platform::Linux, LauncherKind::Dedicated)
        });
        registry.register("android", android);
        registry
    }

    /// Add or replace the factory for `name`.
    pub fn register(&mut self, name: impl Into<String>, factory: LauncherFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build the launcher registered under `name`.
    pub fn create(&self, name: &str, workspace: &Workspace) -> LauncherResult<PreparedLauncher> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| LauncherError::UnknownPlatform(name.to_string()))?;
        factory(workspace)
    }
}

impl Default for LauncherRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn desktop(
    workspace: &Workspace,
    platform: Platform,
    kind: LauncherKind,
) -> LauncherResult<PreparedLauncher> {
    let config = workspace.launch_config(platform, &kind);
    Ok(PreparedLauncher {
        launcher: DesktopLauncher::new(platform, kind).into(),
        config,
    })
}

/// Generic entries need the workspace to name the executable.
fn generic(workspace: &Workspace, platform: Platform) -> LauncherResult<PreparedLauncher> {
    let name = workspace.generic_executable.clone().ok_or_else(|| {
        LauncherError::launch(
            format!("{platform} generic"),
            "workspace has no generic executable name",
        )
    })?;
    desktop(workspace, platform, LauncherKind::Generic(name))
}

fn android(workspace: &Workspace) -> LauncherResult<PreparedLauncher> {
    let settings = workspace.android.clone().ok_or_else(|| {
        LauncherError::launch("android", "workspace has no android settings")
    })?;
    let config = workspace.launch_config(Platform::Android, &LauncherKind::Game);
    Ok(PreparedLauncher {
        launcher: AndroidLauncher::new(settings).into(),
        config,
    })
}
