//! Command-line argument parsing.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use crate::error::Result;
use crate::settings::{self, Settings};

/// Everything the command line can say about a run.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "fluid-adsr", version)]
#[command(about = "SoundFont synth with ADSR and filter controls on MIDI CC 71-75 and 79", long_about = None)]
pub struct Options {
    /// Audio driver to use, or `help` to list the available ones
    #[arg(short = 'a', long = "audio-driver", value_name = "LABEL")]
    pub audio_driver: Option<String>,

    /// MIDI driver to use, or `help` to list the available ones
    #[arg(short = 'm', long = "midi-driver", value_name = "LABEL")]
    pub midi_driver: Option<String>,

    /// Set an arbitrary setting (repeatable)
    #[arg(short = 'o', value_name = "NAME=VALUE", value_parser = parse_assignment)]
    pub settings: Vec<(String, String)>,

    /// Number of audio buffers
    #[arg(short = 'c', long = "audio-bufcount", value_name = "COUNT")]
    pub audio_bufcount: Option<i64>,

    /// Size of each audio buffer in frames
    #[arg(short = 'z', long = "audio-bufsize", value_name = "SIZE")]
    pub audio_bufsize: Option<i64>,

    /// Number of stereo output groups
    #[arg(short = 'G', long = "audio-groups", value_name = "NUM")]
    pub audio_groups: Option<i64>,

    /// Connect JACK outputs to the physical ports
    #[arg(short = 'j', long = "connect-jack-outputs")]
    pub connect_jack_outputs: bool,

    /// Start a command server on `shell.port`
    #[arg(short = 's', long = "server")]
    pub server: bool,

    /// Output sample rate in Hz
    #[arg(short = 'r', long = "sample-rate", value_name = "RATE")]
    pub sample_rate: Option<f64>,

    /// Master gain
    #[arg(short = 'g', long = "gain", value_name = "GAIN", default_value_t = 0.2)]
    pub gain: f64,

    /// JSON settings file applied before the command-line flags
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// SoundFont file to load (not needed with `-a help` / `-m help`)
    #[arg(value_name = "SOUNDFONT")]
    pub sound_bank: Option<PathBuf>,
}

impl Options {
    /// Parse an argument vector. Help and version requests come back as
    /// errors too; `clap::Error::use_stderr` tells them apart.
    pub fn try_from_args<I, T>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let options = Self::try_parse_from(args)?;
        if options.sound_bank.is_none() && !options.wants_driver_listing() {
            return Err(Self::command().error(
                ErrorKind::MissingRequiredArgument,
                "a SoundFont file is required",
            ));
        }
        Ok(options)
    }

    /// True when `-a help` or `-m help` asked for a driver listing.
    pub fn wants_driver_listing(&self) -> bool {
        self.audio_driver.as_deref() == Some("help") || self.midi_driver.as_deref() == Some("help")
    }

    /// Build the settings table: schema defaults, then the settings file,
    /// then the dedicated flags, then `-o` pairs in command-line order.
    pub fn build_settings(&self) -> Result<Settings> {
        let mut settings = Settings::new();

        match &self.config {
            Some(path) => settings.load_file(path)?,
            None => {
                if let Some(path) = settings::default_config_path().filter(|p| p.is_file()) {
                    settings.load_file(&path)?;
                }
            }
        }

        if let Some(driver) = &self.audio_driver {
            settings.set_str(settings::AUDIO_DRIVER, driver)?;
        }
        if let Some(driver) = &self.midi_driver {
            settings.set_str(settings::MIDI_DRIVER, driver)?;
        }
        if let Some(count) = self.audio_bufcount {
            settings.set_int(settings::AUDIO_PERIODS, count)?;
        }
        if let Some(size) = self.audio_bufsize {
            settings.set_int(settings::AUDIO_PERIOD_SIZE, size)?;
        }
        if let Some(groups) = self.audio_groups {
            settings.set_int(settings::SYNTH_AUDIO_GROUPS, groups)?;
        }
        if self.connect_jack_outputs {
            settings.set_int(settings::AUDIO_JACK_AUTOCONNECT, 1)?;
        }
        if let Some(rate) = self.sample_rate {
            settings.set_num(settings::SYNTH_SAMPLE_RATE, rate)?;
        }
        settings.set_num(settings::SYNTH_GAIN, self.gain)?;

        for (name, value) in &self.settings {
            settings.set_from_str(name, value)?;
        }

        Ok(settings)
    }
}

/// Split `NAME=VALUE`. Only the first `=` separates; the value may be empty.
fn parse_assignment(s: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing setting name in '{s}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Options, clap::Error> {
        Options::try_from_args(std::iter::once("fluid-adsr").chain(args.iter().copied()))
    }

    #[test]
    fn test_representative_flags() {
        let opts = parse(&[
            "-a", "alsa",
            "--midi-driver", "alsa_seq",
            "-o", "synth.polyphony=128",
            "-o", "midi.portname=nano=KEY",
            "-c", "4",
            "--audio-bufsize", "256",
            "-G", "2",
            "-j",
            "--server",
            "-r", "48000",
            "-g", "0.5",
            "piano.sf2",
        ])
        .unwrap();

        assert_eq!(opts.audio_driver.as_deref(), Some("alsa"));
        assert_eq!(opts.midi_driver.as_deref(), Some("alsa_seq"));
        assert_eq!(
            opts.settings,
            vec![
                ("synth.polyphony".to_string(), "128".to_string()),
                ("midi.portname".to_string(), "nano=KEY".to_string()),
            ]
        );
        assert_eq!(opts.audio_bufcount, Some(4));
        assert_eq!(opts.audio_bufsize, Some(256));
        assert_eq!(opts.audio_groups, Some(2));
        assert!(opts.connect_jack_outputs);
        assert!(opts.server);
        assert_eq!(opts.sample_rate, Some(48000.0));
        assert!((opts.gain - 0.5).abs() < 1e-9);
        assert_eq!(opts.sound_bank, Some(PathBuf::from("piano.sf2")));
    }

    #[test]
    fn test_defaults() {
        let opts = parse(&["piano.sf2"]).unwrap();
        assert!(opts.audio_driver.is_none());
        assert!(opts.settings.is_empty());
        assert!(!opts.server);
        assert!(!opts.connect_jack_outputs);
        assert!((opts.gain - 0.2).abs() < 1e-9, "default gain should be 0.2");
    }

    #[test]
    fn test_malformed_setting_rejected() {
        let err = parse(&["-o", "synth.gain", "piano.sf2"]).unwrap_err();
        assert!(err.use_stderr());
        assert_eq!(err.kind(), ErrorKind::ValueValidation);

        let err = parse(&["-o", "=1", "piano.sf2"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_missing_sound_bank_rejected() {
        let err = parse(&["-g", "0.3"]).unwrap_err();
        assert!(err.use_stderr());
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_invalid_number_rejected() {
        let err = parse(&["-z", "big", "piano.sf2"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_help_is_not_an_error() {
        let err = parse(&["--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        assert!(!err.use_stderr());
    }

    #[test]
    fn test_build_settings_layering() {
        let dir = std::env::temp_dir().join(format!("fluid-adsr-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");
        std::fs::write(&path, r#"{ "audio.period-size": 512, "synth.polyphony": 32 }"#).unwrap();

        let config = path.to_string_lossy().to_string();
        let opts = parse(&[
            "--config", &config,
            "-z", "128",
            "-r", "48000",
            "-o", "synth.polyphony=64",
            "-o", "synth.polyphony=96",
            "piano.sf2",
        ])
        .unwrap();
        let settings = opts.build_settings().unwrap();

        // Flags override the file, later -o pairs override earlier ones
        assert_eq!(settings.int(settings::AUDIO_PERIOD_SIZE), 128);
        assert_eq!(settings.int(settings::SYNTH_POLYPHONY), 96);
        assert!((settings.num(settings::SYNTH_SAMPLE_RATE) - 48000.0).abs() < 1e-9);
        assert!((settings.num(settings::SYNTH_GAIN) - 0.2).abs() < 1e-9);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_build_settings_rejects_bad_setting() {
        let opts = parse(&["-o", "synth.gain=loud", "piano.sf2"]).unwrap();
        assert!(opts.build_settings().is_err());

        let opts = parse(&["-o", "synth.unknown=1", "piano.sf2"]).unwrap();
        assert!(opts.build_settings().is_err());

        let opts = parse(&["--config", "/nonexistent/settings.json", "piano.sf2"]).unwrap();
        assert!(opts.build_settings().is_err());
    }

    #[test]
    fn test_driver_listing() {
        assert!(parse(&["-a", "help", "x.sf2"]).unwrap().wants_driver_listing());
        assert!(parse(&["-m", "help", "x.sf2"]).unwrap().wants_driver_listing());
        assert!(!parse(&["-a", "alsa", "x.sf2"]).unwrap().wants_driver_listing());
    }

    #[test]
    fn test_driver_listing_needs_no_sound_bank() {
        let opts = parse(&["-a", "help"]).unwrap();
        assert!(opts.wants_driver_listing());
        assert!(opts.sound_bank.is_none());
        assert!(parse(&["-m", "help"]).unwrap().wants_driver_listing());

        let err = parse(&["-a", "alsa"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }
}
