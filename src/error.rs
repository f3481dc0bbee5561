use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong. Setup failures are terminal: `main` prints
/// the message and exits with status 1.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid setting '{name}': {reason}")]
    InvalidSetting { name: String, reason: String },

    #[error("failed to read settings file {}: {reason}", .path.display())]
    ConfigFile { path: PathBuf, reason: String },

    #[error("failed to install signal handlers: {0}")]
    Signal(#[source] std::io::Error),

    #[error("failed to create synthesizer: {0}")]
    EngineConstruction(String),

    #[error("no SoundFont file given")]
    MissingSoundBank,

    #[error("failed to load SoundFont {}: {reason}", .path.display())]
    SoundBankLoad { path: PathBuf, reason: String },

    #[error("failed to create audio driver: {0}")]
    AudioDriver(String),

    #[error("failed to create MIDI driver: {0}")]
    MidiDriver(String),

    #[error("failed to start command server: {0}")]
    Server(#[source] std::io::Error),

    /// A call into a running engine was rejected (bad channel, bad value).
    #[error("synthesizer rejected request: {0}")]
    Engine(String),
}

impl Error {
    pub(crate) fn invalid_setting(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
