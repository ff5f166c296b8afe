//! Config validation.

use std::path::Path;

use village_core::config::GameConfig;
use village_core::error::{GameError, Result};

/// Parse and range-check one RON config file.
///
/// # Errors
///
/// [`GameError::ConfigParse`] if the file cannot be read, is not valid RON,
/// or holds out-of-range values.
pub fn validate_config_file(path: &Path) -> Result<GameConfig> {
    let label = path.display().to_string();
    let source = std::fs::read_to_string(path).map_err(|e| GameError::ConfigParse {
        path: label.clone(),
        message: e.to_string(),
    })?;
    GameConfig::from_ron(&source, &label)
}

/// Validate every `.ron` file under `dir`, returning the number checked.
///
/// Every file is checked even after a failure; the first failure is
/// returned.
///
/// # Errors
///
/// The first invalid file, or an unreadable directory.
pub fn validate_config_dir(dir: &Path) -> Result<usize> {
    let entries = std::fs::read_dir(dir).map_err(|e| GameError::ConfigParse {
        path: dir.display().to_string(),
        message: e.to_string(),
    })?;

    let mut paths: Vec<_> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "ron"))
        .collect();
    paths.sort();

    let mut first_error = None;
    for path in &paths {
        match validate_config_file(path) {
            Ok(_) => tracing::info!(path = %path.display(), "Config OK"),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Config invalid");
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(paths.len()),
    }
}

/// Validate a file or every config in a directory.
///
/// # Errors
///
/// See [`validate_config_file`] and [`validate_config_dir`].
pub fn validate_path(path: &Path) -> Result<usize> {
    if path.is_dir() {
        validate_config_dir(path)
    } else {
        validate_config_file(path).map(|_| 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fast.ron");
        std::fs::write(&path, "GameConfig(drift_interval_ms: 1000, max_trees: 4)").unwrap();

        let config = validate_config_file(&path).unwrap();
        assert_eq!(config.drift_interval_ms, 1_000);
        assert_eq!(config.max_trees, 4);
        assert_eq!(config.initial_neighbors, 10);
    }

    #[test]
    fn test_out_of_range_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ron");
        std::fs::write(&path, "GameConfig(initial_neighbors: 9, max_neighbors: 3)").unwrap();
        assert!(matches!(
            validate_config_file(&path),
            Err(GameError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_config_file(&dir.path().join("absent.ron")).is_err());
    }

    #[test]
    fn test_directory_reports_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ron"), "GameConfig()").unwrap();
        std::fs::write(dir.path().join("b.ron"), "GameConfig(").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        assert!(validate_path(dir.path()).is_err());

        std::fs::remove_file(dir.path().join("b.ron")).unwrap();
        assert_eq!(validate_path(dir.path()).unwrap(), 1);
    }
}
