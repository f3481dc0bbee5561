//! The synthesis engine seam.
//!
//! Everything audible happens inside the engine; this crate only configures
//! it, feeds it MIDI and pulls rendered audio out of it.

pub mod oxi;

use std::path::Path;

use crate::error::Result;
use crate::modulator::{ModMode, Modulator};

pub use oxi::OxiEngine;

/// Identifier the engine hands back for a loaded sound bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundBankId(pub usize);

/// Operations the rest of the program needs from a synthesizer.
pub trait SynthEngine: Send {
    /// Load a SoundFont and make its presets current.
    fn load_sound_bank(&mut self, path: &Path) -> Result<SoundBankId>;

    /// Register a modulator applied to every voice the engine starts.
    fn add_default_mod(&mut self, modulator: &Modulator, mode: ModMode) -> Result<()>;

    /// Set a controller value on a channel.
    fn cc(&mut self, channel: u8, controller: u8, value: u8) -> Result<()>;

    /// Apply one incoming MIDI message.
    fn handle_midi_event(&mut self, message: MidiMessage) -> Result<()>;

    /// Render `left.len()` frames of stereo audio.
    fn render(&mut self, left: &mut [f32], right: &mut [f32]);
}

/// A decoded MIDI channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8 },
    PolyPressure { channel: u8, key: u8, value: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, value: u8 },
    /// 14-bit bend, 8192 = center.
    PitchBend { channel: u8, value: u16 },
    SystemReset,
}

impl MidiMessage {
    /// Decode raw MIDI bytes as delivered by an input port. Anything that is
    /// not a complete channel message (or a system reset) yields `None`.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        if status == 0xFF {
            return Some(Self::SystemReset);
        }

        let channel = status & 0x0F;
        let byte = |i: usize| rest.get(i).map(|b| b & 0x7F);

        match status & 0xF0 {
            0x80 => Some(Self::NoteOff { channel, key: byte(0)? }),
            0x90 => {
                let key = byte(0)?;
                let velocity = byte(1)?;
                // Note On with velocity 0 = Note Off
                if velocity == 0 {
                    Some(Self::NoteOff { channel, key })
                } else {
                    Some(Self::NoteOn { channel, key, velocity })
                }
            }
            0xA0 => Some(Self::PolyPressure { channel, key: byte(0)?, value: byte(1)? }),
            0xB0 => Some(Self::ControlChange { channel, controller: byte(0)?, value: byte(1)? }),
            0xC0 => Some(Self::ProgramChange { channel, program: byte(0)? }),
            0xD0 => Some(Self::ChannelPressure { channel, value: byte(0)? }),
            0xE0 => {
                let lsb = byte(0)? as u16;
                let msb = byte(1)? as u16;
                Some(Self::PitchBend { channel, value: (msb << 7) | lsb })
            }
            _ => None,
        }
    }
}
