//! [`SynthEngine`] backed by oxisynth.
//!
//! oxisynth plays SoundFonts but keeps its default modulator list to itself,
//! so controller bindings are tracked here in a [`ModulatorSet`] and their
//! summed contribution is pushed into the channel's generator offsets each
//! time a bound CC arrives.

use std::fs::File;
use std::path::Path;

use oxisynth::{GeneratorType, MidiEvent, SoundFont, Synth, SynthDescriptor};

use super::{MidiMessage, SoundBankId, SynthEngine};
use crate::error::{Error, Result};
use crate::modulator::{Generator, ModMode, Modulator, ModulatorSet};
use crate::settings::{self, Settings};

/// Reset All Controllers.
const CC_RESET_ALL_CONTROLLERS: u8 = 121;

pub struct OxiEngine {
    synth: Synth,
    modulators: ModulatorSet,
    fonts_loaded: usize,
}

impl OxiEngine {
    /// Construct the synthesizer from the `synth.*` settings.
    pub fn new(settings: &Settings) -> Result<Self> {
        let midi_channels = saturate_u8(settings.int(settings::SYNTH_MIDI_CHANNELS));
        let descriptor = SynthDescriptor {
            sample_rate: settings.num(settings::SYNTH_SAMPLE_RATE) as f32,
            gain: settings.num(settings::SYNTH_GAIN) as f32,
            polyphony: u16::try_from(settings.int(settings::SYNTH_POLYPHONY)).unwrap_or(u16::MAX),
            midi_channels,
            audio_channels: saturate_u8(settings.int(settings::SYNTH_AUDIO_CHANNELS)),
            audio_groups: saturate_u8(settings.int(settings::SYNTH_AUDIO_GROUPS)),
            reverb_active: settings.toggle(settings::SYNTH_REVERB_ACTIVE),
            chorus_active: settings.toggle(settings::SYNTH_CHORUS_ACTIVE),
            ..Default::default()
        };

        let (sample_rate, gain) = (descriptor.sample_rate, descriptor.gain);

        let synth = Synth::new(descriptor).map_err(|e| Error::EngineConstruction(format!("{e:?}")))?;
        log::info!("[Engine] Synth ready: {sample_rate} Hz, gain {gain}, {midi_channels} channels");

        Ok(Self {
            synth,
            modulators: ModulatorSet::new(midi_channels as usize),
            fonts_loaded: 0,
        })
    }

    /// Modulators registered so far.
    pub fn modulators(&self) -> &ModulatorSet {
        &self.modulators
    }
}

impl SynthEngine for OxiEngine {
    fn load_sound_bank(&mut self, path: &Path) -> Result<SoundBankId> {
        let load_error = |reason: String| Error::SoundBankLoad {
            path: path.to_path_buf(),
            reason,
        };

        let mut file = File::open(path).map_err(|e| load_error(e.to_string()))?;
        let font = SoundFont::load(&mut file).map_err(|e| load_error(format!("{e:?}")))?;
        self.synth.add_font(font, true);

        self.fonts_loaded += 1;
        log::info!("[Engine] Loaded SoundFont {} (bank {})", path.display(), self.fonts_loaded);
        Ok(SoundBankId(self.fonts_loaded))
    }

    fn add_default_mod(&mut self, modulator: &Modulator, mode: ModMode) -> Result<()> {
        self.modulators.add(modulator, mode);
        log::debug!("[Engine] Default modulator {modulator} ({mode:?})");
        Ok(())
    }

    fn cc(&mut self, channel: u8, controller: u8, value: u8) -> Result<()> {
        self.synth
            .send_event(MidiEvent::ControlChange {
                channel,
                ctrl: controller,
                value,
            })
            .map_err(engine_error)?;

        let synth = &mut self.synth;
        let mut failure = None;
        let mut apply = |generator: Generator, offset: f64| {
            if let Err(e) = synth.set_gen(channel as usize, generator_type(generator), offset as f32) {
                failure = Some(e);
            }
        };

        self.modulators.set_cc(channel, controller, value, &mut apply);

        if controller == CC_RESET_ALL_CONTROLLERS {
            // The synth zeroes the channel's generator offsets, but the sound
            // controllers keep their values and so keep modulating.
            for generator in Generator::ALL {
                apply(generator, self.modulators.offset(channel, generator));
            }
        }

        match failure {
            Some(e) => Err(engine_error(e)),
            None => Ok(()),
        }
    }

    fn handle_midi_event(&mut self, message: MidiMessage) -> Result<()> {
        let event = match message {
            MidiMessage::ControlChange { channel, controller, value } => {
                return self.cc(channel, controller, value);
            }
            MidiMessage::NoteOn { channel, key, velocity } => MidiEvent::NoteOn {
                channel,
                key,
                vel: velocity,
            },
            MidiMessage::NoteOff { channel, key } => MidiEvent::NoteOff { channel, key },
            MidiMessage::PolyPressure { channel, key, value } => {
                MidiEvent::PolyphonicKeyPressure { channel, key, value }
            }
            MidiMessage::ProgramChange { channel, program } => MidiEvent::ProgramChange {
                channel,
                program_id: program,
            },
            MidiMessage::ChannelPressure { channel, value } => {
                MidiEvent::ChannelPressure { channel, value }
            }
            MidiMessage::PitchBend { channel, value } => MidiEvent::PitchBend { channel, value },
            MidiMessage::SystemReset => {
                self.modulators.clear_controllers();
                MidiEvent::SystemReset
            }
        };
        self.synth.send_event(event).map_err(engine_error)
    }

    fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (sample_l, sample_r) = self.synth.read_next();
            *l = sample_l;
            *r = sample_r;
        }
    }
}

fn generator_type(generator: Generator) -> GeneratorType {
    match generator {
        Generator::FilterFc => GeneratorType::FilterFc,
        Generator::FilterQ => GeneratorType::FilterQ,
        Generator::VolEnvAttack => GeneratorType::VolEnvAttack,
        Generator::VolEnvDecay => GeneratorType::VolEnvDecay,
        Generator::VolEnvSustain => GeneratorType::VolEnvSustain,
        Generator::VolEnvRelease => GeneratorType::VolEnvRelease,
    }
}

fn engine_error(e: impl std::fmt::Debug) -> Error {
    Error::Engine(format!("{e:?}"))
}

fn saturate_u8(value: i64) -> u8 {
    u8::try_from(value).unwrap_or(u8::MAX)
}
