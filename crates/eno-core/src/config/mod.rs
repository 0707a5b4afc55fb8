//! Configuration utilities
//!
//! - Generic YAML config loading/saving
//! - Standard config paths
//!
//! # Usage
//!
//! ```ignore
//! use eno_core::config::{default_config_path, load_config, save_config};
//!
//! let config: EnoConfig = load_config(&default_config_path());
//! save_config(&config, &default_config_path())?;
//! ```

mod io;
mod paths;

pub use io::{load_config, save_config, write_default_config};
pub use paths::{config_dir, default_config_path, APP_DIR, CONFIG_FILE};
