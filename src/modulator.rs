//! ADSR and filter modulators.
//!
//! Six MIDI controllers are bound to the volume envelope and the low-pass
//! filter of every voice, the way the sound controllers 71-79 are laid out on
//! analog-style hardware:
//!
//! | CC | controls          | curve   | amount |
//! |----|-------------------|---------|--------|
//! | 71 | filter resonance  | concave | 960    |
//! | 72 | release time      | linear  | 20000  |
//! | 73 | attack time       | linear  | 20000  |
//! | 74 | filter cutoff     | linear  | -2400  |
//! | 75 | decay time        | linear  | 20000  |
//! | 79 | sustain level     | concave | 1000   |

use std::fmt;

use crate::engine::SynthEngine;

pub const CC_FILTER_RESONANCE: u8 = 71;
pub const CC_RELEASE: u8 = 72;
pub const CC_ATTACK: u8 = 73;
pub const CC_FILTER_CUTOFF: u8 = 74;
pub const CC_DECAY: u8 = 75;
pub const CC_SUSTAIN: u8 = 79;

/// Full-scale attenuation in centibels; also the resonance amount.
pub const PEAK_ATTENUATION: f64 = 960.0;
/// Envelope time amount in timecents.
pub const ENVELOPE_AMOUNT: f64 = 20000.0;
/// Cutoff amount in cents. Negative: raising CC 74 closes the filter.
pub const FILTER_CUTOFF_AMOUNT: f64 = -2400.0;
/// Sustain amount in centibels of attenuation.
pub const SUSTAIN_AMOUNT: f64 = 1000.0;

/// Number of 7-bit controller steps; controller values are divided by this.
const CC_RANGE: f64 = 128.0;

/// Channel whose controllers are zeroed at startup.
pub const CONTROLLER_CHANNEL: u8 = 0;

/// SoundFont generators the modulators drive. Discriminants are the SF2
/// generator numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Generator {
    FilterFc = 8,
    FilterQ = 9,
    VolEnvAttack = 34,
    VolEnvDecay = 36,
    VolEnvSustain = 37,
    VolEnvRelease = 38,
}

impl Generator {
    pub const ALL: [Generator; 6] = [
        Generator::FilterFc,
        Generator::FilterQ,
        Generator::VolEnvAttack,
        Generator::VolEnvDecay,
        Generator::VolEnvSustain,
        Generator::VolEnvRelease,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Generator::FilterFc => "Filter cutoff",
            Generator::FilterQ => "Filter resonance",
            Generator::VolEnvAttack => "Attack time",
            Generator::VolEnvDecay => "Decay time",
            Generator::VolEnvSustain => "Sustain",
            Generator::VolEnvRelease => "Release time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    Linear,
    Concave,
    Convex,
    Switch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Unipolar,
    Bipolar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Positive,
    Negative,
}

/// How `add_default_mod` treats a modulator identical to one already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModMode {
    /// Sum the amounts.
    Add,
    /// Replace the amount.
    Overwrite,
}

/// One controller-to-generator rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Modulator {
    /// MIDI CC number driving the modulator.
    pub source: u8,
    pub curve: Curve,
    pub polarity: Polarity,
    pub direction: Direction,
    pub destination: Generator,
    pub amount: f64,
}

impl Modulator {
    const fn unipolar_cc(source: u8, curve: Curve, destination: Generator, amount: f64) -> Self {
        Self {
            source,
            curve,
            polarity: Polarity::Unipolar,
            direction: Direction::Positive,
            destination,
            amount,
        }
    }

    /// Same source, mapping and destination; the amount may differ.
    pub fn is_identical(&self, other: &Modulator) -> bool {
        self.source == other.source
            && self.curve == other.curve
            && self.polarity == other.polarity
            && self.direction == other.direction
            && self.destination == other.destination
    }

    /// Map a 7-bit controller value through the source curve.
    ///
    /// Values are normalised by 128, so full scale (127) lands just short of
    /// 1. Concave and convex curves are table lookups at the truncated
    /// `127 * x` index. Unipolar results lie in 0..1, bipolar in -1..1.
    pub fn transform(&self, value: u8) -> f64 {
        let raw = value.min(127) as f64 / CC_RANGE;
        let x = match self.direction {
            Direction::Positive => raw,
            Direction::Negative => 1.0 - raw,
        };
        let on = match self.direction {
            Direction::Positive => raw >= 0.5,
            Direction::Negative => raw < 0.5,
        };
        let index = |x: f64| (127.0 * x) as u8;

        match self.polarity {
            Polarity::Unipolar => match self.curve {
                Curve::Linear => x,
                Curve::Concave => concave(index(x)),
                Curve::Convex => convex(index(x)),
                Curve::Switch => {
                    if on {
                        1.0
                    } else {
                        0.0
                    }
                }
            },
            Polarity::Bipolar => {
                // Each half of the range gets its own curve, mirrored around the center
                let half = |curve: fn(u8) -> f64| {
                    if x > 0.5 {
                        curve(index(2.0 * (x - 0.5)))
                    } else {
                        -curve(index(2.0 * (0.5 - x)))
                    }
                };
                match self.curve {
                    Curve::Linear => 2.0 * x - 1.0,
                    Curve::Concave => half(concave),
                    Curve::Convex => half(convex),
                    Curve::Switch => {
                        if on {
                            1.0
                        } else {
                            -1.0
                        }
                    }
                }
            }
        }
    }

    /// Generator offset contributed by this modulator at a controller value.
    pub fn value(&self, controller_value: u8) -> f64 {
        self.amount * self.transform(controller_value)
    }
}

impl fmt::Display for Modulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CC {}: {} ({:?}, amount {})",
            self.source,
            self.destination.label(),
            self.curve,
            self.amount
        )
    }
}

fn concave(v: u8) -> f64 {
    match v {
        0 => 0.0,
        127.. => 1.0,
        v => {
            let rest = (127 - v) as f64;
            (-200.0 / PEAK_ATTENUATION) * ((rest * rest) / (127.0 * 127.0)).log10()
        }
    }
}

fn convex(v: u8) -> f64 {
    match v {
        0 => 0.0,
        127.. => 1.0,
        v => 1.0 - concave(127 - v),
    }
}

fn switch(v: u8) -> f64 {
    if v >= 64 { 1.0 } else { 0.0 }
}

/// The six bindings installed at startup, in CC order.
pub const ADSR_MODULATORS: [Modulator; 6] = [
    Modulator::unipolar_cc(CC_FILTER_RESONANCE, Curve::Concave, Generator::FilterQ, PEAK_ATTENUATION),
    Modulator::unipolar_cc(CC_RELEASE, Curve::Linear, Generator::VolEnvRelease, ENVELOPE_AMOUNT),
    Modulator::unipolar_cc(CC_ATTACK, Curve::Linear, Generator::VolEnvAttack, ENVELOPE_AMOUNT),
    Modulator::unipolar_cc(CC_FILTER_CUTOFF, Curve::Linear, Generator::FilterFc, FILTER_CUTOFF_AMOUNT),
    Modulator::unipolar_cc(CC_DECAY, Curve::Linear, Generator::VolEnvDecay, ENVELOPE_AMOUNT),
    Modulator::unipolar_cc(CC_SUSTAIN, Curve::Concave, Generator::VolEnvSustain, SUSTAIN_AMOUNT),
];

/// Register the ADSR/filter modulators with the engine.
///
/// Failures are logged and otherwise ignored.
pub fn install_modulators<E: SynthEngine + ?Sized>(engine: &mut E) {
    for modulator in &ADSR_MODULATORS {
        if let Err(e) = engine.add_default_mod(modulator, ModMode::Add) {
            log::warn!("[Modulators] {modulator} not installed: {e}");
        }
    }
    log::info!("[Modulators] Installed {} controller bindings", ADSR_MODULATORS.len());
}

/// Send value 0 on each bound controller of `channel`.
pub fn reset_controllers<E: SynthEngine + ?Sized>(engine: &mut E, channel: u8) {
    for modulator in &ADSR_MODULATORS {
        if let Err(e) = engine.cc(channel, modulator.source, 0) {
            log::warn!("[Modulators] Reset of CC {} on channel {channel} failed: {e}", modulator.source);
        }
    }
}

/// Default modulators of an engine plus the current controller values of
/// every channel, used to work out generator offsets when a CC arrives.
#[derive(Debug, Clone)]
pub struct ModulatorSet {
    modulators: Vec<Modulator>,
    controllers: Vec<[u8; 128]>,
}

impl ModulatorSet {
    pub fn new(channels: usize) -> Self {
        Self {
            modulators: Vec::new(),
            controllers: vec![[0; 128]; channels],
        }
    }

    pub fn add(&mut self, modulator: &Modulator, mode: ModMode) {
        match self.modulators.iter_mut().find(|m| m.is_identical(modulator)) {
            Some(existing) => match mode {
                ModMode::Add => existing.amount += modulator.amount,
                ModMode::Overwrite => existing.amount = modulator.amount,
            },
            None => self.modulators.push(*modulator),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Modulator> {
        self.modulators.iter()
    }

    pub fn len(&self) -> usize {
        self.modulators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modulators.is_empty()
    }

    pub fn channels(&self) -> usize {
        self.controllers.len()
    }

    /// Forget every controller value (system reset).
    pub fn clear_controllers(&mut self) {
        for values in &mut self.controllers {
            values.fill(0);
        }
    }

    /// Sum of all modulator contributions to `destination` on `channel`.
    pub fn offset(&self, channel: u8, destination: Generator) -> f64 {
        let Some(values) = self.controllers.get(channel as usize) else {
            return 0.0;
        };
        self.modulators
            .iter()
            .filter(|m| m.destination == destination)
            .map(|m| m.value(values[m.source as usize & 0x7F]))
            .sum()
    }

    /// Record a controller value and report the new offset of every
    /// generator that depends on it.
    pub fn set_cc(&mut self, channel: u8, controller: u8, value: u8, mut apply: impl FnMut(Generator, f64)) {
        let Some(values) = self.controllers.get_mut(channel as usize) else {
            return;
        };
        values[controller as usize & 0x7F] = value.min(127);

        for generator in Generator::ALL {
            let affected = self
                .modulators
                .iter()
                .any(|m| m.source == controller && m.destination == generator);
            if affected {
                apply(generator, self.offset(channel, generator));
            }
        }
    }
}
