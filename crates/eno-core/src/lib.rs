//! Eno Core - mixing engine, sound sources and audio output

pub mod audio;
pub mod config;
pub mod engine;
pub mod types;

pub use types::*;
