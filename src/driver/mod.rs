//! Audio and MIDI device drivers.
//!
//! cpal renders the engine's output; midir delivers controller and note
//! input. The two meet in a bounded channel drained by the audio callback,
//! so the engine is only ever touched from the audio thread once running.

pub mod audio;
pub mod buffer;
pub mod midi;

pub use audio::AudioDriver;
pub use midi::MidiDriver;

/// Capacity of the MIDI → audio callback queue.
pub const MIDI_QUEUE_SIZE: usize = 256;
