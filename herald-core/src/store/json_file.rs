use super::{PersistedState, PersistenceError, StatePersistence};
use std::path::{Path, PathBuf};

/// Stores the state document as pretty-printed JSON on disk.
///
/// Writes go to a sibling temp file that is then renamed over the target,
/// so a crash mid-write leaves the previous document intact.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl StatePersistence for JsonFilePersistence {
    fn load(&self) -> Result<PersistedState, PersistenceError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PersistedState::default());
            }
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(PersistedState::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn flush(&self, state: &PersistedState) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(state)?;
        let temp_path = self.temp_path();
        std::fs::write(&temp_path, json)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}
