//! Event channel and dispatcher task
//!
//! Soundfont loads are handed to a loader task that runs them one at a time
//! on the blocking pool; every other event is applied in place. A slow load
//! never delays taps queued behind it.

use std::path::PathBuf;
use std::sync::Arc;

use eno_core::engine::Synth;
use flume::{Receiver, Sender};
use tokio::sync::watch;

use crate::events::{load_soundfont, ControlEvent, ControlTargets};

/// Capacity of the transport → dispatcher channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Create the bounded channel shared by all transports
pub fn event_channel() -> (Sender<ControlEvent>, Receiver<ControlEvent>) {
    flume::bounded(EVENT_CHANNEL_CAPACITY)
}

/// Apply events in arrival order until shutdown or until every sender is gone
pub async fn run_dispatcher(
    events: Receiver<ControlEvent>,
    targets: ControlTargets,
    mut shutdown: watch::Receiver<bool>,
) {
    log::debug!("Control dispatcher started");
    let (loads, pending_loads) = flume::unbounded();
    let loader = tokio::spawn(run_loader(pending_loads, targets.synth.clone()));

    loop {
        tokio::select! {
            received = events.recv_async() => match received {
                Ok(ControlEvent::SynthLoad(path)) => {
                    log::trace!("Control event: load {:?}", path);
                    if loads.send(path).is_err() {
                        log::warn!("Soundfont loader is gone, ignoring load request");
                    }
                }
                Ok(event) => {
                    log::trace!("Control event: {:?}", event);
                    event.apply(&targets);
                }
                Err(_) => {
                    log::debug!("All control transports closed");
                    break;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    drop(loads);
    if let Err(e) = loader.await {
        log::warn!("Soundfont loader task failed: {}", e);
    }
    log::debug!("Control dispatcher stopped");
}

/// Run queued soundfont loads in order, off the async workers
async fn run_loader(paths: Receiver<PathBuf>, synth: Arc<Synth>) {
    while let Ok(path) = paths.recv_async().await {
        let synth = Arc::clone(&synth);
        let loaded = tokio::task::spawn_blocking(move || load_soundfont(&synth, &path)).await;
        if let Err(e) = loaded {
            log::warn!("Soundfont load panicked: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_targets;
    use eno_core::engine::LooperState;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_dispatch_in_order_until_senders_close() {
        let targets = test_targets();
        let (tx, rx) = event_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(ControlEvent::LooperTap).unwrap();
        tx.send(ControlEvent::LooperTap).unwrap();
        tx.send(ControlEvent::LooperStop).unwrap();
        tx.send(ControlEvent::MetronomeBpm(90)).unwrap();
        tx.send(ControlEvent::SynthLoad(PathBuf::from("/nonexistent/font.sf2")))
            .unwrap();
        drop(tx);

        run_dispatcher(rx, targets.clone(), shutdown_rx).await;
        assert_eq!(targets.looper.state(), LooperState::Stopped);
        assert_eq!(targets.metronome.bpm(), 90);
        assert!(!targets.synth.is_loaded());
    }

    #[tokio::test]
    async fn test_dispatch_stops_on_shutdown() {
        let targets = test_targets();
        let (_tx, rx) = event_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_dispatcher(rx, targets, shutdown_rx));
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("dispatcher did not stop")
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_soundfont_load_does_not_hold_up_taps() {
        let dir = tempfile::tempdir().unwrap();
        let fifo = dir.path().join("slow.sf2");
        let status = std::process::Command::new("mkfifo")
            .arg(&fifo)
            .status()
            .unwrap();
        assert!(status.success(), "mkfifo failed");

        let targets = test_targets();
        let (tx, rx) = event_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_dispatcher(rx, targets.clone(), shutdown_rx));

        // Opening a FIFO blocks until a writer shows up
        tx.send_async(ControlEvent::SynthLoad(fifo.clone())).await.unwrap();
        tx.send_async(ControlEvent::MetronomeTap).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while targets.metronome.tap_count() == 0 {
            assert!(Instant::now() < deadline, "tap stuck behind the soundfont load");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Release the loader with bytes that are not a soundfont
        tokio::task::spawn_blocking(move || std::fs::write(&fifo, b"not a soundfont"))
            .await
            .unwrap()
            .unwrap();
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("dispatcher did not stop")
            .unwrap();
        assert!(!targets.synth.is_loaded());
    }
}
