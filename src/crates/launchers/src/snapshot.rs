use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LauncherError, LauncherResult};

const MANIFEST_NAME: &str = "snapshot.json";

/// One file recorded in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Where the file lives in the project.
    pub original: PathBuf,
    /// Copy inside the backup directory, if the file existed at capture time.
    pub backup: Option<PathBuf>,
}

/// Backup of configuration files a test may change, restorable after the test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    backup_dir: PathBuf,
    entries: Vec<SnapshotEntry>,
}

impl ConfigSnapshot {
    /// Copy each file into `backup_dir` and write a manifest describing them.
    ///
    /// A directory still holding the manifest of an unrestored snapshot is refused, so
    /// two captures never share backups.
    pub fn capture<I, P>(files: I, backup_dir: impl Into<PathBuf>) -> LauncherResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let backup_dir = backup_dir.into();
        fs::create_dir_all(&backup_dir).map_err(|err| LauncherError::snapshot(&backup_dir, err))?;
        let manifest = backup_dir.join(MANIFEST_NAME);
        if manifest.exists() {
            return Err(LauncherError::snapshot(
                manifest,
                io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "backup directory holds a snapshot that has not been restored",
                ),
            ));
        }

        let mut entries = Vec::new();
        for (index, file) in files.into_iter().enumerate() {
            let original = file.as_ref().to_path_buf();
            let backup = if original.is_file() {
                let name = original
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                // Prefix with the index so same-named files from different folders coexist.
                let target = backup_dir.join(format!("{index}_{name}"));
                fs::copy(&original, &target).map_err(|err| LauncherError::snapshot(&original, err))?;
                Some(target)
            } else {
                None
            };
            entries.push(SnapshotEntry { original, backup });
        }

        let snapshot = Self {
            backup_dir,
            entries,
        };
        snapshot.write_manifest()?;
        log::debug!(
            "captured {} config files into {}",
            snapshot.entries.len(),
            snapshot.backup_dir.display()
        );
        Ok(snapshot)
    }

    /// Re-open a snapshot written by an earlier `capture`.
    pub fn load(backup_dir: impl AsRef<Path>) -> LauncherResult<Self> {
        let manifest = backup_dir.as_ref().join(MANIFEST_NAME);
        let text =
            fs::read_to_string(&manifest).map_err(|err| LauncherError::snapshot(&manifest, err))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Put every file back the way it was at capture time.
    ///
    /// Files that did not exist then are removed, and the manifest is cleared so the
    /// directory can take a new capture. Running it twice leaves the same result as long
    /// as no new capture has reused the directory.
    pub fn restore(&self) -> LauncherResult<()> {
        for entry in &self.entries {
            match &entry.backup {
                Some(backup) => {
                    if let Some(parent) = entry.original.parent() {
                        fs::create_dir_all(parent)
                            .map_err(|err| LauncherError::snapshot(parent, err))?;
                    }
                    fs::copy(backup, &entry.original)
                        .map_err(|err| LauncherError::snapshot(&entry.original, err))?;
                }
                None if entry.original.exists() => {
                    fs::remove_file(&entry.original)
                        .map_err(|err| LauncherError::snapshot(&entry.original, err))?;
                }
                None => {}
            }
        }
        let manifest = self.backup_dir.join(MANIFEST_NAME);
        match fs::remove_file(&manifest) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => {
                return Err(LauncherError::snapshot(manifest, err));
            }
            _ => {}
        }
        log::info!("restored {} config files", self.entries.len());
        Ok(())
    }

    fn write_manifest(&self) -> LauncherResult<()> {
        let manifest = self.backup_dir.join(MANIFEST_NAME);
        let text = serde_json::to_string_pretty(self)?;
        fs::write(&manifest, text).map_err(|err| LauncherError::snapshot(&manifest, err))
    }
}
