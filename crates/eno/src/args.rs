//! Command line flags

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Default, PartialEq)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Config file (default: ~/.config/eno/config.yaml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Soundfont to load instead of the configured one
    #[arg(long, value_name = "PATH")]
    pub soundfont: Option<PathBuf>,

    /// Output device by name, overriding the configured one
    #[arg(long, value_name = "DEVICE_NAME")]
    pub device: Option<String>,

    /// Preferred sample rate, overriding the configured one
    #[arg(long, value_name = "HZ")]
    pub sample_rate: Option<u32>,

    /// Write a default config file and exit
    #[arg(long)]
    pub write_default_config: bool,

    /// List audio output devices and exit
    #[arg(long)]
    pub list_devices: bool,
}
