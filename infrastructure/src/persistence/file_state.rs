//! File-backed supervisor snapshot.
//!
//! The snapshot is written as pretty JSON through a temp file and a rename,
//! so a crash mid-write leaves either the old or the new snapshot on disk.

use ralph_application::ports::persistence::{PersistenceError, StatePersistence};
use ralph_domain::PersistedState;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Default snapshot location, relative to the working directory.
pub const DEFAULT_STATE_FILE: &str = ".ralph/state.json";

/// JSON snapshot file implementing [`StatePersistence`].
#[derive(Debug, Clone)]
pub struct FileStatePersistence {
    path: PathBuf,
}

impl Default for FileStatePersistence {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_FILE)
    }
}

impl FileStatePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    fn write_atomic(&self, contents: &str) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.temp_path();
        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl StatePersistence for FileStatePersistence {
    fn save(&self, snapshot: &PersistedState) -> Result<(), PersistenceError> {
        debug!(
            path = %self.path.display(),
            state = %snapshot.current_state,
            "Writing supervisor state"
        );
        let mut buf = serde_json::to_string_pretty(snapshot)?;
        buf.push('\n');
        self.write_atomic(&buf)
    }

    fn load(&self) -> Option<PersistedState> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not read supervisor state");
                return None;
            }
        };

        let snapshot: PersistedState = match serde_json::from_str(&contents) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Supervisor state is corrupt; ignoring it"
                );
                return None;
            }
        };

        if !snapshot.is_supported_version() {
            warn!(
                path = %self.path.display(),
                version = snapshot.version,
                "Supervisor state was written by a newer version; ignoring it"
            );
            return None;
        }
        Some(snapshot)
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn age(&self) -> Option<Duration> {
        self.load().map(|snapshot| snapshot.age())
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Supervisor state cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
