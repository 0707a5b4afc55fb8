//! Eno - live looping instrument
//!
//! Mixes a soundfont synth, an overdub looper and a tap-tempo metronome into
//! one stereo output, controlled over OSC and MIDI.
//!
//! Run `eno --help` for the command line flags.

mod app;
mod args;
mod config;

use std::process::ExitCode;

use args::Args;
use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("eno {} starting up", env!("CARGO_PKG_VERSION"));

    match app::run(args).await {
        Ok(()) => {
            log::info!("eno stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
