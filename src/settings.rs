//! Typed synthesizer settings.
//!
//! Every entry of [`SCHEMA`] is always present in a [`Settings`] value; the
//! setters only replace values after checking the entry's type and range, so
//! readers never see a missing or ill-typed setting.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

pub const AUDIO_DRIVER: &str = "audio.driver";
pub const AUDIO_PERIODS: &str = "audio.periods";
pub const AUDIO_PERIOD_SIZE: &str = "audio.period-size";
pub const AUDIO_JACK_AUTOCONNECT: &str = "audio.jack.autoconnect";
pub const MIDI_DRIVER: &str = "midi.driver";
pub const MIDI_AUTOCONNECT: &str = "midi.autoconnect";
pub const MIDI_PORTNAME: &str = "midi.portname";
pub const SYNTH_SAMPLE_RATE: &str = "synth.sample-rate";
pub const SYNTH_GAIN: &str = "synth.gain";
pub const SYNTH_AUDIO_GROUPS: &str = "synth.audio-groups";
pub const SYNTH_AUDIO_CHANNELS: &str = "synth.audio-channels";
pub const SYNTH_POLYPHONY: &str = "synth.polyphony";
pub const SYNTH_MIDI_CHANNELS: &str = "synth.midi-channels";
pub const SYNTH_REVERB_ACTIVE: &str = "synth.reverb.active";
pub const SYNTH_CHORUS_ACTIVE: &str = "synth.chorus.active";
pub const SHELL_PORT: &str = "shell.port";

/// Driver name meaning "whatever the platform picks".
pub const DEFAULT_DRIVER: &str = "default";

/// Type, default and valid range of one setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingKind {
    Num { default: f64, min: f64, max: f64 },
    Int { default: i64, min: i64, max: i64 },
    /// Integer setting restricted to 0 / 1.
    Toggle { default: bool },
    Str { default: &'static str },
}

#[derive(Debug, Clone, Copy)]
pub struct SettingDef {
    pub name: &'static str,
    pub kind: SettingKind,
}

pub static SCHEMA: &[SettingDef] = &[
    SettingDef {
        name: AUDIO_DRIVER,
        kind: SettingKind::Str { default: DEFAULT_DRIVER },
    },
    SettingDef {
        name: AUDIO_PERIODS,
        kind: SettingKind::Int { default: 16, min: 2, max: 64 },
    },
    SettingDef {
        name: AUDIO_PERIOD_SIZE,
        kind: SettingKind::Int { default: 64, min: 64, max: 8192 },
    },
    SettingDef {
        name: AUDIO_JACK_AUTOCONNECT,
        kind: SettingKind::Toggle { default: false },
    },
    SettingDef {
        name: MIDI_DRIVER,
        kind: SettingKind::Str { default: DEFAULT_DRIVER },
    },
    SettingDef {
        name: MIDI_AUTOCONNECT,
        kind: SettingKind::Toggle { default: true },
    },
    SettingDef {
        name: MIDI_PORTNAME,
        kind: SettingKind::Str { default: "" },
    },
    SettingDef {
        name: SYNTH_SAMPLE_RATE,
        kind: SettingKind::Num { default: 44100.0, min: 8000.0, max: 96000.0 },
    },
    SettingDef {
        name: SYNTH_GAIN,
        kind: SettingKind::Num { default: 0.2, min: 0.0, max: 10.0 },
    },
    SettingDef {
        name: SYNTH_AUDIO_GROUPS,
        kind: SettingKind::Int { default: 1, min: 1, max: 128 },
    },
    SettingDef {
        name: SYNTH_AUDIO_CHANNELS,
        kind: SettingKind::Int { default: 1, min: 1, max: 128 },
    },
    SettingDef {
        name: SYNTH_POLYPHONY,
        kind: SettingKind::Int { default: 256, min: 1, max: 65535 },
    },
    SettingDef {
        name: SYNTH_MIDI_CHANNELS,
        kind: SettingKind::Int { default: 16, min: 16, max: 255 },
    },
    SettingDef {
        name: SYNTH_REVERB_ACTIVE,
        kind: SettingKind::Toggle { default: true },
    },
    SettingDef {
        name: SYNTH_CHORUS_ACTIVE,
        kind: SettingKind::Toggle { default: true },
    },
    SettingDef {
        name: SHELL_PORT,
        kind: SettingKind::Int { default: 9800, min: 1, max: 65535 },
    },
];

/// Look up a schema entry by name.
pub fn definition(name: &str) -> Option<&'static SettingDef> {
    SCHEMA.iter().find(|def| def.name == name)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Num(f64),
    Int(i64),
    Str(String),
}

impl SettingValue {
    fn default_for(kind: SettingKind) -> Self {
        match kind {
            SettingKind::Num { default, .. } => Self::Num(default),
            SettingKind::Int { default, .. } => Self::Int(default),
            SettingKind::Toggle { default } => Self::Int(default as i64),
            SettingKind::Str { default } => Self::Str(default.to_string()),
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "\"{v}\""),
        }
    }
}

/// The complete, validated settings table handed to the engine and drivers.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    values: BTreeMap<&'static str, SettingValue>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            values: SCHEMA
                .iter()
                .map(|def| (def.name, SettingValue::default_for(def.kind)))
                .collect(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value given as text, parsing it according to the entry's type.
    pub fn set_from_str(&mut self, name: &str, value: &str) -> Result<()> {
        let def = definition(name).ok_or_else(|| Error::invalid_setting(name, "unknown setting"))?;
        let value = value.trim();
        match def.kind {
            SettingKind::Num { .. } => {
                let v: f64 = value
                    .parse()
                    .map_err(|_| Error::invalid_setting(name, format!("'{value}' is not a number")))?;
                self.set_num(name, v)
            }
            SettingKind::Int { .. } => {
                let v: i64 = value
                    .parse()
                    .map_err(|_| Error::invalid_setting(name, format!("'{value}' is not an integer")))?;
                self.set_int(name, v)
            }
            SettingKind::Toggle { .. } => {
                let v = parse_toggle(value)
                    .ok_or_else(|| Error::invalid_setting(name, format!("'{value}' is not 0/1 or yes/no")))?;
                self.set_int(name, v as i64)
            }
            SettingKind::Str { .. } => self.set_str(name, value),
        }
    }

    pub fn set_num(&mut self, name: &str, value: f64) -> Result<()> {
        let def = definition(name).ok_or_else(|| Error::invalid_setting(name, "unknown setting"))?;
        let SettingKind::Num { min, max, .. } = def.kind else {
            return Err(Error::invalid_setting(name, "not a numeric setting"));
        };
        if !(min..=max).contains(&value) {
            return Err(Error::invalid_setting(name, format!("{value} is outside {min}..={max}")));
        }
        self.values.insert(def.name, SettingValue::Num(value));
        Ok(())
    }

    pub fn set_int(&mut self, name: &str, value: i64) -> Result<()> {
        let def = definition(name).ok_or_else(|| Error::invalid_setting(name, "unknown setting"))?;
        let (min, max) = match def.kind {
            SettingKind::Int { min, max, .. } => (min, max),
            SettingKind::Toggle { .. } => (0, 1),
            _ => return Err(Error::invalid_setting(name, "not an integer setting")),
        };
        if !(min..=max).contains(&value) {
            return Err(Error::invalid_setting(name, format!("{value} is outside {min}..={max}")));
        }
        self.values.insert(def.name, SettingValue::Int(value));
        Ok(())
    }

    pub fn set_str(&mut self, name: &str, value: &str) -> Result<()> {
        let def = definition(name).ok_or_else(|| Error::invalid_setting(name, "unknown setting"))?;
        if !matches!(def.kind, SettingKind::Str { .. }) {
            return Err(Error::invalid_setting(name, "not a string setting"));
        }
        self.values.insert(def.name, SettingValue::Str(value.to_string()));
        Ok(())
    }

    pub fn num(&self, name: &str) -> f64 {
        match self.values.get(name) {
            Some(SettingValue::Num(v)) => *v,
            _ => 0.0,
        }
    }

    pub fn int(&self, name: &str) -> i64 {
        match self.values.get(name) {
            Some(SettingValue::Int(v)) => *v,
            _ => 0,
        }
    }

    pub fn toggle(&self, name: &str) -> bool {
        self.int(name) != 0
    }

    pub fn str(&self, name: &str) -> &str {
        match self.values.get(name) {
            Some(SettingValue::Str(v)) => v,
            _ => "",
        }
    }

    /// All settings in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &SettingValue)> {
        self.values.iter().map(|(name, value)| (*name, value))
    }

    /// Apply a JSON settings file: an object of setting name to string,
    /// number or boolean.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path).map_err(|e| Error::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let entries: BTreeMap<String, FileValue> =
            serde_json::from_str(&text).map_err(|e| Error::ConfigFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        for (name, value) in entries {
            self.set_from_str(&name, &value.to_string())?;
        }
        log::info!("[Settings] Loaded {}", path.display());
        Ok(())
    }
}

/// Per-user settings file, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "fluid-adsr", "FluidADSR")
        .map(|dirs| dirs.config_dir().join("settings.json"))
}

fn parse_toggle(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Some(true),
        "0" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FileValue {
    Bool(bool),
    Int(i64),
    Num(f64),
    Text(String),
}

impl fmt::Display for FileValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => f.write_str(if *b { "yes" } else { "no" }),
            Self::Int(v) => write!(f, "{v}"),
            Self::Num(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_schema() {
        let settings = Settings::new();
        assert_eq!(settings.iter().count(), SCHEMA.len());
        assert_eq!(settings.str(AUDIO_DRIVER), DEFAULT_DRIVER);
        assert_eq!(settings.int(AUDIO_PERIOD_SIZE), 64);
        assert!((settings.num(SYNTH_GAIN) - 0.2).abs() < 1e-9);
        assert!(settings.toggle(MIDI_AUTOCONNECT));
        assert!(!settings.toggle(AUDIO_JACK_AUTOCONNECT));
    }

    #[test]
    fn test_set_from_str_detects_type() {
        let mut settings = Settings::new();
        settings.set_from_str(SYNTH_GAIN, "1.5").unwrap();
        settings.set_from_str(SYNTH_POLYPHONY, "64").unwrap();
        settings.set_from_str(MIDI_PORTNAME, "Keystation").unwrap();
        settings.set_from_str(SYNTH_REVERB_ACTIVE, "no").unwrap();

        assert!((settings.num(SYNTH_GAIN) - 1.5).abs() < 1e-9);
        assert_eq!(settings.int(SYNTH_POLYPHONY), 64);
        assert_eq!(settings.str(MIDI_PORTNAME), "Keystation");
        assert!(!settings.toggle(SYNTH_REVERB_ACTIVE));
    }

    #[test]
    fn test_set_from_str_rejects_bad_values() {
        let mut settings = Settings::new();
        assert!(settings.set_from_str(SYNTH_GAIN, "loud").is_err());
        assert!(settings.set_from_str(SYNTH_POLYPHONY, "1.5").is_err());
        assert!(settings.set_from_str(SYNTH_CHORUS_ACTIVE, "2").is_err());
        assert!(settings.set_from_str("synth.nonexistent", "1").is_err());
        // Failed sets leave the previous value in place
        assert!((settings.num(SYNTH_GAIN) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_range_checks() {
        let mut settings = Settings::new();
        assert!(settings.set_num(SYNTH_SAMPLE_RATE, 1000.0).is_err());
        assert!(settings.set_int(AUDIO_PERIOD_SIZE, 16).is_err());
        assert!(settings.set_int(SHELL_PORT, 70000).is_err());
        assert!(settings.set_int(SHELL_PORT, 9900).is_ok());
        assert_eq!(settings.int(SHELL_PORT), 9900);
    }

    #[test]
    fn test_type_mismatch() {
        let mut settings = Settings::new();
        assert!(settings.set_num(SYNTH_POLYPHONY, 12.0).is_err());
        assert!(settings.set_int(SYNTH_GAIN, 1).is_err());
        assert!(settings.set_str(SYNTH_GAIN, "1").is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = std::env::temp_dir().join(format!("fluid-adsr-settings-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");
        fs::write(
            &path,
            r#"{ "synth.gain": 0.8, "synth.polyphony": 128, "synth.chorus.active": false, "midi.portname": "nanoKEY" }"#,
        )
        .unwrap();

        let mut settings = Settings::new();
        settings.load_file(&path).unwrap();
        assert!((settings.num(SYNTH_GAIN) - 0.8).abs() < 1e-9);
        assert_eq!(settings.int(SYNTH_POLYPHONY), 128);
        assert!(!settings.toggle(SYNTH_CHORUS_ACTIVE));
        assert_eq!(settings.str(MIDI_PORTNAME), "nanoKEY");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_file_missing() {
        let mut settings = Settings::new();
        let err = settings
            .load_file(Path::new("/definitely/not/here/settings.json"))
            .unwrap_err();
        assert!(matches!(err, Error::ConfigFile { .. }));
    }
}
