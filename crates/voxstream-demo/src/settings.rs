//! Demo settings, layered from an optional TOML file and `VOXSTREAM__*` env vars

use serde::Deserialize;
use std::path::{Path, PathBuf};
use voxstream_core::{SpeakerConfig, SpeakerId};

use crate::device::DeviceSettings;
use crate::tone::ToneSettings;

const DEFAULT_SETTINGS_FILE: &str = "voxstream.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct DemoSettings {
    #[serde(default)]
    pub speaker: SpeakerConfig,

    #[serde(default)]
    pub tone: ToneSettings,

    #[serde(default)]
    pub device: DeviceSettings,

    /// Lines spoken one after another
    #[serde(default = "default_script")]
    pub script: Vec<String>,

    /// Speaker override for the first line
    #[serde(default)]
    pub voice: Option<SpeakerId>,

    /// Replaces the first line while it is still playing
    #[serde(default)]
    pub correction: Option<String>,

    #[serde(default = "default_correction_delay_ms")]
    pub correction_delay_ms: u64,

    /// Where the simulated device writes what it played
    #[serde(default = "default_output_wav")]
    pub output_wav: PathBuf,

    /// Give up waiting for playback to finish after this long
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl DemoSettings {
    /// Load settings. An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));

        let settings: Self = config::Config::builder()
            .add_source(config::File::from(file).required(path.is_some()))
            .add_source(
                config::Environment::with_prefix("VOXSTREAM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.speaker.validate()?;
        if settings.device.period_frames == 0 {
            anyhow::bail!("device.period_frames must be positive");
        }
        Ok(settings)
    }
}

fn default_script() -> Vec<String> {
    vec![
        "Streaming speech starts playing before the sentence is done".to_string(),
        "and later text is appended without a gap".to_string(),
    ]
}

fn default_correction_delay_ms() -> u64 {
    300
}

fn default_output_wav() -> PathBuf {
    PathBuf::from("voxstream-demo.wav")
}

fn default_drain_timeout_secs() -> u64 {
    30
}
