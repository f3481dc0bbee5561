//! FluidADSR: a SoundFont synthesizer with analog-style envelope and filter
//! controls.
//!
//! MIDI CC 71-75 and 79 are bound to filter resonance, release, attack,
//! cutoff, decay and sustain of every voice. Synthesis is done by oxisynth,
//! audio output by cpal and MIDI input by midir.

pub mod app;
pub mod cli;
pub mod driver;
pub mod engine;
pub mod error;
pub mod modulator;
pub mod runtime;
pub mod server;
pub mod settings;

pub use error::{Error, Result};
