//! Error types for the voxstream speech core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Synthesis failed: {0}")]
    SynthesisError(String),

    #[error("Audio output error: {0}")]
    AudioError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No tokio runtime available to run synthesis tasks")]
    NoRuntime,

    #[error("Synthesis task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::TaskFailed(e.to_string())
    }
}
