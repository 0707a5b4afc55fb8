//! Standard locations for eno files

use std::path::PathBuf;

/// Application directory name under the platform config directory
pub const APP_DIR: &str = "eno";

/// Config file name
pub const CONFIG_FILE: &str = "config.yaml";

/// Get the eno config directory
///
/// Returns `<config_dir>/eno` (e.g. `~/.config/eno` on Linux), or `./eno`
/// when the platform has no config directory.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Get the default config file path: `<config_dir>/eno/config.yaml`
pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}
