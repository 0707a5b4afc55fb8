//! OSC control server
//!
//! Messages are routed through [`ROUTES`], a static table mapping each
//! address to a typed handler that validates its own arguments and builds a
//! [`ControlEvent`]. Numeric arguments accept any OSC numeric type (int, long,
//! float, double); integers given as floats are truncated. Argument count must
//! match exactly. Bundles are unpacked recursively.

use std::net::SocketAddr;
use std::path::PathBuf;

use flume::Sender;
use rosc::{OscMessage, OscPacket, OscType};
use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::config::OscConfig;
use crate::events::ControlEvent;
use crate::{ArgError, ControlError, ControlResult};

/// Largest datagram we accept
const MAX_PACKET_SIZE: usize = 64 * 1024;

/// Builds an event from a message's arguments
pub type Handler = fn(&[OscType]) -> Result<ControlEvent, ArgError>;

/// Address → handler routing table
pub static ROUTES: &[(&str, Handler)] = &[
    ("/eno/synth/on", synth_on),
    ("/eno/synth/off", synth_off),
    ("/eno/synth/pitch", synth_pitch),
    ("/eno/synth/cc", synth_cc),
    ("/eno/synth/program", synth_program),
    ("/eno/synth/load", synth_load),
    ("/eno/synth/gain", synth_gain),
    ("/eno/synth/panic", synth_panic),
    ("/eno/metronome/tap", metronome_tap),
    ("/eno/metronome/bpm", metronome_bpm),
    ("/eno/metronome/gain", metronome_gain),
    ("/eno/looper/tap", looper_tap),
    ("/eno/looper/cancel", looper_cancel),
    ("/eno/looper/stop", looper_stop),
    ("/eno/looper/gain", looper_gain),
    ("/eno/looper/decay", looper_decay),
];

/// Upper bound accepted for `/eno/metronome/bpm`
const MAX_BPM: i64 = 10_000;

/// Route one message: None for unknown addresses
pub fn route_message(msg: &OscMessage) -> Option<Result<ControlEvent, ArgError>> {
    ROUTES
        .iter()
        .find(|(addr, _)| *addr == msg.addr)
        .map(|(_, handler)| handler(&msg.args))
}

/// Flatten a packet into events, logging and dropping bad messages
pub fn packet_events(packet: OscPacket, out: &mut Vec<ControlEvent>) {
    match packet {
        OscPacket::Message(msg) => match route_message(&msg) {
            Some(Ok(event)) => out.push(event),
            Some(Err(e)) => log::warn!("OSC: bad arguments for {}: {}", msg.addr, e),
            None => log::debug!("OSC: no route for {}", msg.addr),
        },
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                packet_events(inner, out);
            }
        }
    }
}

fn expect_count(args: &[OscType], expected: usize) -> Result<(), ArgError> {
    if args.len() != expected {
        return Err(ArgError::Count {
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn no_args(args: &[OscType], event: ControlEvent) -> Result<ControlEvent, ArgError> {
    expect_count(args, 0)?;
    Ok(event)
}

fn type_name(arg: &OscType) -> String {
    match arg {
        OscType::Int(_) => "int".to_string(),
        OscType::Long(_) => "long".to_string(),
        OscType::Float(_) => "float".to_string(),
        OscType::Double(_) => "double".to_string(),
        OscType::String(_) => "string".to_string(),
        other => format!("{:?}", other),
    }
}

/// Integer argument within `min..=max`
fn int_arg(args: &[OscType], index: usize, min: i64, max: i64) -> Result<i64, ArgError> {
    let value = match &args[index] {
        OscType::Int(v) => *v as i64,
        OscType::Long(v) => *v,
        OscType::Float(v) if v.is_finite() => *v as i64,
        OscType::Double(v) if v.is_finite() => *v as i64,
        OscType::Float(_) | OscType::Double(_) => return Err(ArgError::NotFinite { index }),
        other => {
            return Err(ArgError::Type {
                index,
                expected: "number",
                got: type_name(other),
            })
        }
    };
    if !(min..=max).contains(&value) {
        return Err(ArgError::Range { index, value, min, max });
    }
    Ok(value)
}

fn u7_arg(args: &[OscType], index: usize) -> Result<u8, ArgError> {
    Ok(int_arg(args, index, 0, 127)? as u8)
}

fn channel_arg(args: &[OscType], index: usize) -> Result<u8, ArgError> {
    Ok(int_arg(args, index, 0, 15)? as u8)
}

/// Finite float argument
fn float_arg(args: &[OscType], index: usize) -> Result<f32, ArgError> {
    let value = match &args[index] {
        OscType::Int(v) => *v as f32,
        OscType::Long(v) => *v as f32,
        OscType::Float(v) => *v,
        OscType::Double(v) => *v as f32,
        other => {
            return Err(ArgError::Type {
                index,
                expected: "number",
                got: type_name(other),
            })
        }
    };
    if !value.is_finite() {
        return Err(ArgError::NotFinite { index });
    }
    Ok(value)
}

/// Single float argument (gain, decay)
fn gain_arg(args: &[OscType]) -> Result<f32, ArgError> {
    expect_count(args, 1)?;
    float_arg(args, 0)
}

fn synth_on(args: &[OscType]) -> Result<ControlEvent, ArgError> {
    expect_count(args, 3)?;
    Ok(ControlEvent::SynthNoteOn {
        channel: channel_arg(args, 0)?,
        note: u7_arg(args, 1)?,
        velocity: u7_arg(args, 2)?,
    })
}

fn synth_off(args: &[OscType]) -> Result<ControlEvent, ArgError> {
    expect_count(args, 2)?;
    Ok(ControlEvent::SynthNoteOff {
        channel: channel_arg(args, 0)?,
        note: u7_arg(args, 1)?,
    })
}

fn synth_pitch(args: &[OscType]) -> Result<ControlEvent, ArgError> {
    expect_count(args, 2)?;
    Ok(ControlEvent::SynthPitchBend {
        channel: channel_arg(args, 0)?,
        value: int_arg(args, 1, 0, 0x3fff)? as u16,
    })
}

fn synth_cc(args: &[OscType]) -> Result<ControlEvent, ArgError> {
    expect_count(args, 3)?;
    Ok(ControlEvent::SynthControlChange {
        channel: channel_arg(args, 0)?,
        controller: u7_arg(args, 1)?,
        value: u7_arg(args, 2)?,
    })
}

fn synth_program(args: &[OscType]) -> Result<ControlEvent, ArgError> {
    expect_count(args, 2)?;
    Ok(ControlEvent::SynthProgramChange {
        channel: channel_arg(args, 0)?,
        program: u7_arg(args, 1)?,
    })
}

fn synth_load(args: &[OscType]) -> Result<ControlEvent, ArgError> {
    expect_count(args, 1)?;
    match &args[0] {
        OscType::String(path) => Ok(ControlEvent::SynthLoad(PathBuf::from(path))),
        other => Err(ArgError::Type {
            index: 0,
            expected: "string",
            got: type_name(other),
        }),
    }
}

fn synth_gain(args: &[OscType]) -> Result<ControlEvent, ArgError> {
    Ok(ControlEvent::SynthGain(gain_arg(args)?))
}

fn synth_panic(args: &[OscType]) -> Result<ControlEvent, ArgError> {
    no_args(args, ControlEvent::SynthAllNotesOff)
}

fn metronome_tap(args: &[OscType]) -> Result<ControlEvent, ArgError> {
    no_args(args, ControlEvent::MetronomeTap)
}

fn metronome_bpm(args: &[OscType]) -> Result<ControlEvent, ArgError> {
    expect_count(args, 1)?;
    Ok(ControlEvent::MetronomeBpm(int_arg(args, 0, 0, MAX_BPM)? as u32))
}

fn metronome_gain(args: &[OscType]) -> Result<ControlEvent, ArgError> {
    Ok(ControlEvent::MetronomeGain(gain_arg(args)?))
}

fn looper_tap(args: &[OscType]) -> Result<ControlEvent, ArgError> {
    no_args(args, ControlEvent::LooperTap)
}

fn looper_cancel(args: &[OscType]) -> Result<ControlEvent, ArgError> {
    no_args(args, ControlEvent::LooperCancel)
}

fn looper_stop(args: &[OscType]) -> Result<ControlEvent, ArgError> {
    no_args(args, ControlEvent::LooperStop)
}

fn looper_gain(args: &[OscType]) -> Result<ControlEvent, ArgError> {
    Ok(ControlEvent::LooperGain(gain_arg(args)?))
}

fn looper_decay(args: &[OscType]) -> Result<ControlEvent, ArgError> {
    Ok(ControlEvent::LooperDecay(gain_arg(args)?))
}

/// UDP server feeding decoded events into the dispatcher channel
pub struct OscServer {
    socket: UdpSocket,
    events: Sender<ControlEvent>,
}

impl OscServer {
    /// Bind the first free port in `first_port..=last_port`
    pub async fn bind(config: &OscConfig, events: Sender<ControlEvent>) -> ControlResult<Self> {
        for port in config.first_port..=config.last_port {
            match UdpSocket::bind((config.host.as_str(), port)).await {
                Ok(socket) => {
                    log::info!("OSC: listening on {}", socket.local_addr()?);
                    return Ok(Self { socket, events });
                }
                Err(e) => log::debug!("OSC: port {} unavailable: {}", port, e),
            }
        }
        Err(ControlError::OscBind {
            host: config.host.clone(),
            first: config.first_port,
            last: config.last_port,
        })
    }

    pub fn local_addr(&self) -> ControlResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive and forward packets until shutdown
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> ControlResult<()> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let mut decoded = Vec::new();

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    let Some((len, from)) = received_datagram(received) else {
                        continue;
                    };
                    match rosc::decoder::decode_udp(&buf[..len]) {
                        Ok((_, packet)) => {
                            packet_events(packet, &mut decoded);
                            for event in decoded.drain(..) {
                                if self.events.send_async(event).await.is_err() {
                                    log::debug!("OSC: dispatcher gone, stopping");
                                    return Ok(());
                                }
                            }
                        }
                        Err(e) => log::warn!("OSC: undecodable packet from {}: {:?}", from, e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        log::info!("OSC: server stopped");
        Ok(())
    }
}

/// Unwrap a `recv_from` result; socket errors are logged and skipped
fn received_datagram(
    received: std::io::Result<(usize, SocketAddr)>,
) -> Option<(usize, SocketAddr)> {
    match received {
        Ok(datagram) => Some(datagram),
        Err(e) => {
            log::warn!("OSC: receive failed: {}", e);
            None
        }
    }
}
