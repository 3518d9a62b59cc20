//! Player configuration
//!
//! Settings are plain serde values so a host can embed them in its own TOML
//! configuration. Nothing here touches the filesystem.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on the physical voice pool
pub const MAX_VOICES: usize = 256;

/// Which released voice is reused first once no voice is free
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReleasedVoicePolicy {
    /// Quietest released voice, ties broken by the longest-released one
    #[default]
    Quietest,
    /// Longest-released voice, ties broken by the quietest one
    LongestReleased,
}

/// Playback configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Output sample rate in Hz (default: 44100)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Physical voice pool size (default: max(2 × channels, channels + 16), at most 256)
    #[serde(default)]
    pub voices: Option<usize>,
    /// Reuse order among released voices (default: quietest)
    #[serde(default)]
    pub released_voice_policy: ReleasedVoicePolicy,
    /// Continue at the restart position after the last order (default: false)
    #[serde(default)]
    pub loop_song: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            voices: None,
            released_voice_policy: ReleasedVoicePolicy::default(),
            loop_song: false,
        }
    }
}

fn default_sample_rate() -> u32 {
    44100
}

/// Invalid player configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid player configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("sample rate must be non-zero")]
    ZeroSampleRate,

    #[error("voice pool of {size} is outside 1..={max}")]
    VoicePool { size: usize, max: usize },
}

impl PlayerConfig {
    /// Parse a configuration from TOML text; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if let Some(size) = self.voices
            && !(1..=MAX_VOICES).contains(&size)
        {
            return Err(ConfigError::VoicePool {
                size,
                max: MAX_VOICES,
            });
        }
        Ok(())
    }

    /// Voice pool size for a module with `channels` song channels
    pub fn voice_count(&self, channels: u8) -> usize {
        let channels = channels as usize;
        self.voices
            .unwrap_or_else(|| (channels * 2).max(channels + 16))
            .clamp(1, MAX_VOICES)
    }
}
