//! A [`StoragePort`] over a directory of files.
//!
//! Each key maps to `<root>/<key>.json`. Writes go to a temporary sibling
//! first and are renamed into place, so a crash mid-write leaves the previous
//! save intact.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use village_core::error::{GameError, Result};
use village_core::persistence::StoragePort;

/// Directory-backed key-value storage.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Storage rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory holding the entries.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `key`.
    ///
    /// # Errors
    ///
    /// [`GameError::Storage`] for keys that would escape the root.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(GameError::Storage(format!("invalid storage key '{key}'")));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

fn storage_error(action: &str, path: &Path, e: &std::io::Error) -> GameError {
    GameError::Storage(format!("{action} {}: {e}", path.display()))
}

impl StoragePort for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error("read", &path, &e)),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root).map_err(|e| storage_error("create", &self.root, &e))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| storage_error("write", &tmp, &e))?;
        fs::rename(&tmp, &path).map_err(|e| storage_error("rename", &path, &e))?;
        tracing::debug!(path = %path.display(), bytes = value.len(), "Wrote entry");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error("remove", &path, &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert_eq!(storage.get("nothing").unwrap(), None);
    }

    #[test]
    fn test_set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path().join("nested"));
        storage.set("save", "{\"a\":1}").unwrap();
        assert_eq!(storage.get("save").unwrap().as_deref(), Some("{\"a\":1}"));
        assert!(!dir.path().join("nested/save.json.tmp").exists());

        storage.remove("save").unwrap();
        storage.remove("save").unwrap();
        assert_eq!(storage.get("save").unwrap(), None);
    }

    #[test]
    fn test_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path());
        assert!(matches!(
            storage.set("../escape", "x"),
            Err(GameError::Storage(_))
        ));
        assert!(storage.get("").is_err());
    }
}
