//! Startup and shutdown orchestration
//!
//! 1. Load config, open the audio device to learn its sample rate
//! 2. Build the synth, looper and metronome at that rate and start the stream
//! 3. Start the OSC server (fatal if no port is free) and MIDI input (optional)
//! 4. Run the dispatcher until Ctrl-C, then stop transports and drop audio last

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use eno_control::{
    event_channel, run_dispatcher, ControlError, ControlTargets, MidiInputHandler, OscServer,
};
use eno_core::audio::{list_output_devices, AudioOutput, DeviceId};
use eno_core::config::{default_config_path, load_config, write_default_config};
use eno_core::engine::{Looper, Metronome, MixBus, Synth};
use tokio::sync::watch;

use crate::args::Args;
use crate::config::EnoConfig;

/// Build the three sources from config at the device sample rate
pub fn build_targets(config: &EnoConfig, sample_rate: u32) -> ControlTargets {
    let synth = Synth::new(sample_rate);
    synth.set_gain(config.synth.gain);

    let metronome =
        Metronome::new(sample_rate).with_idle_reset_beats(config.metronome.idle_reset_beats);
    metronome.set_bpm(config.metronome.bpm);
    metronome.set_gain(config.metronome.gain);

    let looper = Looper::with_max_seconds(sample_rate, config.looper.max_loop_seconds);
    looper.set_gain(config.looper.gain);
    looper.set_decay(config.looper.decay);

    ControlTargets {
        synth: Arc::new(synth),
        looper: Arc::new(looper),
        metronome: Arc::new(metronome),
    }
}

/// Let command line flags take precedence over the config file
pub fn apply_overrides(args: &Args, config: &mut EnoConfig) {
    if let Some(soundfont) = &args.soundfont {
        config.synth.soundfont = Some(soundfont.clone());
    }
    if let Some(name) = &args.device {
        config.audio = config.audio.clone().with_device(DeviceId::new(name.as_str()));
    }
    if let Some(rate) = args.sample_rate {
        config.audio = config.audio.clone().with_sample_rate(rate);
    }
}

/// Run the instrument until Ctrl-C
pub async fn run(args: Args) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);

    if args.write_default_config {
        write_default_config::<EnoConfig>(&config_path)?;
        println!("Wrote default config to {}", config_path.display());
        return Ok(());
    }

    if args.list_devices {
        for device in list_output_devices().context("Failed to list audio devices")? {
            println!("{}", device);
        }
        return Ok(());
    }

    let mut config: EnoConfig = load_config(&config_path);
    apply_overrides(&args, &mut config);

    let output = AudioOutput::open(&config.audio).context("Failed to open audio output")?;
    let sample_rate = output.sample_rate();
    log::info!(
        "Audio output: {} at {} Hz, buffer {:?} frames",
        output.device_name(),
        sample_rate,
        output.buffer_size()
    );
    let targets = build_targets(&config, sample_rate);

    if let Some(path) = &config.synth.soundfont {
        if let Err(e) = targets.synth.load(path) {
            log::warn!("Failed to load soundfont {:?}: {} (synth stays silent)", path, e);
        }
    }

    let bus = MixBus::new(
        targets.synth.clone(),
        targets.looper.clone(),
        targets.metronome.clone(),
    );
    let skipped_passes = bus.xrun_counter();
    let audio = output.start(bus).context("Failed to start audio stream")?;

    let (events_tx, events_rx) = event_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let osc_task = if config.control.osc.enabled {
        let server = OscServer::bind(&config.control.osc, events_tx.clone())
            .await
            .context("Failed to start OSC server")?;
        Some(tokio::spawn(server.run(shutdown_rx.clone())))
    } else {
        log::info!("OSC disabled");
        None
    };

    let midi = if config.control.midi.enabled {
        match MidiInputHandler::connect(&config.control.midi, events_tx.clone()) {
            Ok(handler) => Some(handler),
            Err(ControlError::NoMidiPorts) => {
                log::info!("No MIDI input ports, running without MIDI");
                None
            }
            Err(e) => {
                log::warn!("MIDI unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };
    // Dispatcher ends on its own once every transport is gone
    drop(events_tx);

    let dispatcher = tokio::spawn(run_dispatcher(events_rx, targets.clone(), shutdown_rx));

    log::info!("eno running at {} Hz, press Ctrl-C to quit", sample_rate);
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    log::info!("Shutting down");
    shutdown_tx.send_replace(true);
    drop(midi);

    if let Some(task) = osc_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("OSC server stopped with error: {}", e),
            Err(e) => log::warn!("OSC task failed: {}", e),
        }
    }
    if let Err(e) = dispatcher.await {
        log::warn!("Dispatcher task failed: {}", e);
    }

    targets.synth.all_notes_off();
    log::info!(
        "Audio stream errors: {}, silent passes: {}",
        audio.stream_errors(),
        skipped_passes.load(Ordering::Relaxed)
    );
    drop(audio);
    Ok(())
}
