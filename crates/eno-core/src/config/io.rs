//! YAML configuration I/O
//!
//! Works with any serde type. Loading never fails: a missing or broken file
//! falls back to `T::default()` so the instrument always starts.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load configuration from a YAML file, or defaults
///
/// Every config section uses `#[serde(default)]`, so a partial file only
/// overrides the keys it names.
///
/// ```ignore
/// let config: EnoConfig = load_config(&default_config_path());
/// ```
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("No config at {:?}, using defaults", path);
            return T::default();
        }
        Err(e) => {
            log::warn!("Failed to read config {:?}: {}, using defaults", path, e);
            return T::default();
        }
    };

    if contents.trim().is_empty() {
        log::info!("Config {:?} is empty, using defaults", path);
        return T::default();
    }

    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("Failed to parse config {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Save configuration to a YAML file, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;

    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("Saved config to {:?}", path);
    Ok(())
}

/// Write `T::default()` to `path` unless a file is already there
pub fn write_default_config<T>(path: &Path) -> Result<()>
where
    T: Serialize + Default,
{
    if path.exists() {
        bail!("Refusing to overwrite existing config {:?}", path);
    }
    save_config(&T::default(), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct TestConfig {
        gain: f32,
        name: String,
    }

    impl Default for TestConfig {
        fn default() -> Self {
            Self {
                gain: 0.4,
                name: "eno".to_string(),
            }
        }
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config: TestConfig = load_config(Path::new("/nonexistent/eno/config.yaml"));
        assert_eq!(config, TestConfig::default());
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let config = TestConfig {
            gain: 0.75,
            name: "looper".to_string(),
        };
        save_config(&config, &path).unwrap();

        let loaded: TestConfig = load_config(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "gain: 0.1\n").unwrap();

        let loaded: TestConfig = load_config(&path);
        assert_eq!(loaded.gain, 0.1);
        assert_eq!(loaded.name, "eno");
    }

    #[test]
    fn test_invalid_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "gain: [not, a, number\n").unwrap();

        let loaded: TestConfig = load_config(&path);
        assert_eq!(loaded, TestConfig::default());
    }

    #[test]
    fn test_write_default_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        write_default_config::<TestConfig>(&path).unwrap();
        let loaded: TestConfig = load_config(&path);
        assert_eq!(loaded, TestConfig::default());

        assert!(write_default_config::<TestConfig>(&path).is_err());
    }
}
