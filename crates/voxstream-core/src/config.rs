//! Configuration types for the speech driver

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::synthesis::SpeakerId;

/// Speaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerConfig {
    /// Samples per device pull; also sizes the streaming clip
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Clip length as a multiple of `buffer_size`
    #[serde(default = "default_clip_length_factor")]
    pub clip_length_factor: usize,

    /// Capacity of the playback-stopped broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Speaker applied before the first synthesis pass
    #[serde(default)]
    pub default_speaker: Option<SpeakerId>,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            clip_length_factor: default_clip_length_factor(),
            event_capacity: default_event_capacity(),
            default_speaker: None,
        }
    }
}

impl SpeakerConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the driver cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::ConfigError("buffer_size must be positive".to_string()));
        }
        if self.clip_length_factor == 0 {
            return Err(Error::ConfigError(
                "clip_length_factor must be positive".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::ConfigError(
                "event_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Length of the host streaming clip in samples
    pub fn clip_samples(&self) -> usize {
        self.buffer_size * self.clip_length_factor
    }
}

fn default_buffer_size() -> usize {
    1024
}

fn default_clip_length_factor() -> usize {
    24
}

fn default_event_capacity() -> usize {
    16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SpeakerConfig::default();
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.clip_samples(), 1024 * 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = SpeakerConfig::from_toml_str("buffer_size = 512\ndefault_speaker = 3\n")
            .unwrap();
        assert_eq!(config.buffer_size, 512);
        assert_eq!(config.clip_length_factor, 24);
        assert_eq!(config.default_speaker, Some(3));
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let err = SpeakerConfig::from_toml_str("buffer_size = 0").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = SpeakerConfig::from_toml_str("buffer_size = \"big\"").unwrap_err();
        assert!(matches!(err, Error::TomlError(_)));
    }
}
