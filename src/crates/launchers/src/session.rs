use std::path::{Path, PathBuf};

use crate::error::{LauncherError, LauncherResult};
use crate::registry::{LauncherRegistry, PreparedLauncher};
use crate::snapshot::ConfigSnapshot;
use crate::workspace::Workspace;

/// Process-wide launcher state for one test session.
///
/// Every launcher created through the session is stopped, and every config snapshot
/// restored, on `teardown` or when the session is dropped.
pub struct TestSession {
    workspace: Workspace,
    registry: LauncherRegistry,
    launchers: Vec<PreparedLauncher>,
    snapshots: Vec<ConfigSnapshot>,
    torn_down: bool,
}

impl TestSession {
    pub fn new(workspace: Workspace) -> Self {
        Self::with_registry(workspace, LauncherRegistry::with_defaults())
    }

    pub fn with_registry(workspace: Workspace, registry: LauncherRegistry) -> Self {
        Self {
            workspace,
            registry,
            launchers: Vec::new(),
            snapshots: Vec::new(),
            torn_down: false,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn registry_mut(&mut self) -> &mut LauncherRegistry {
        &mut self.registry
    }

    /// Create a launcher for a registered platform name and keep it for teardown.
    pub fn launcher(&mut self, name: &str) -> LauncherResult<&mut PreparedLauncher> {
        let prepared = self.registry.create(name, &self.workspace)?;
        self.torn_down = false;
        self.launchers.push(prepared);
        let index = self.launchers.len() - 1;
        Ok(&mut self.launchers[index])
    }

    /// Launchers created so far, in creation order.
    pub fn launchers_mut(&mut self) -> &mut [PreparedLauncher] {
        &mut self.launchers
    }

    /// Back up config files now and restore them at teardown.
    pub fn revert_on_teardown<I, P>(
        &mut self,
        files: I,
        backup_dir: impl Into<PathBuf>,
    ) -> LauncherResult<&ConfigSnapshot>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let snapshot = ConfigSnapshot::capture(files, backup_dir)?;
        self.torn_down = false;
        self.snapshots.push(snapshot);
        let index = self.snapshots.len() - 1;
        Ok(&self.snapshots[index])
    }

    /// Stop every launcher, then restore every snapshot.
    ///
    /// All steps run even if some fail; the first failure is returned.
    pub fn teardown(&mut self) -> LauncherResult<()> {
        let mut first_error: Option<LauncherError> = None;

        for prepared in self.launchers.iter_mut() {
            if let Err(err) = prepared.launcher.stop() {
                log::warn!("failed to stop {} launcher: {err}", prepared.launcher.platform());
                first_error = first_error.or(Some(err));
            }
        }
        // Later snapshots may cover files already captured earlier; unwind in reverse.
        for snapshot in self.snapshots.iter().rev() {
            if let Err(err) = snapshot.restore() {
                log::warn!(
                    "failed to restore snapshot in {}: {err}",
                    snapshot.backup_dir().display()
                );
                first_error = first_error.or(Some(err));
            }
        }
        self.torn_down = true;

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for TestSession {
    fn drop(&mut self) {
        if !self.torn_down {
            let _ = self.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::LauncherState;
    use std::fs;

    #[test]
    fn teardown_restores_snapshots_and_stops_launchers() {
        let project = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        let setreg = project.path().join("physxsystemconfiguration.setreg");
        fs::write(&setreg, "before").unwrap();

        let mut session = TestSession::new(Workspace::new(
            project.path(),
            project.path(),
            "AutomatedTesting",
        ));
        session
            .revert_on_teardown([&setreg], backups.path())
            .unwrap();
        session.launcher("linux_dedicated").unwrap();
        fs::write(&setreg, "after").unwrap();

        session.teardown().unwrap();
        assert_eq!(fs::read_to_string(&setreg).unwrap(), "before");
        assert_eq!(
            session.launchers_mut()[0].launcher.state(),
            LauncherState::Stopped
        );
    }

    #[test]
    fn drop_runs_teardown() {
        let project = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        let setreg = project.path().join("physxdebugconfiguration.setreg");

        {
            let mut session = TestSession::new(Workspace::new(
                project.path(),
                project.path(),
                "AutomatedTesting",
            ));
            session
                .revert_on_teardown([&setreg], backups.path())
                .unwrap();
            fs::write(&setreg, "created by test").unwrap();
        }
        assert!(!setreg.exists());
    }

    #[test]
    fn shared_backup_directory_keeps_the_first_snapshot() {
        let project = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        let a = project.path().join("a").join("physx.setreg");
        let b = project.path().join("b").join("physx.setreg");
        for (path, text) in [(&a, "A original"), (&b, "B original")] {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }

        let mut session = TestSession::new(Workspace::new(project.path(), project.path(), "P"));
        session.revert_on_teardown([&a], backups.path()).unwrap();
        assert!(matches!(
            session.revert_on_teardown([&b], backups.path()).err(),
            Some(LauncherError::Snapshot { .. })
        ));

        fs::write(&a, "A changed").unwrap();
        session.teardown().unwrap();
        assert_eq!(fs::read_to_string(&a).unwrap(), "A original");
        assert_eq!(fs::read_to_string(&b).unwrap(), "B original");
    }

    #[test]
    fn unknown_launcher_name_is_an_error() {
        let project = tempfile::tempdir().unwrap();
        let mut session = TestSession::new(Workspace::new(project.path(), project.path(), "P"));
        assert!(matches!(
            session.launcher("ios").err(),
            Some(LauncherError::UnknownPlatform(_))
        ));
    }
}
