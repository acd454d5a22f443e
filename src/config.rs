//! Application configuration loaded from TOML

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Error, Result};
use crate::protocol::SessionSetup;
use crate::transport::SendPolicy;

/// Top-level configuration for the pipeline and demo binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub live: LiveConfig,
    pub audio: AudioConfig,
    pub transport: TransportConfig,
    pub outbound: OutboundConfig,
}

/// Agent connect configuration, passed through unmodified
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub response_modalities: Vec<String>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            voice: "Zephyr".to_string(),
            system_instruction: "You are a helpful voice assistant. Keep replies brief and conversational.".to_string(),
            response_modalities: vec!["AUDIO".to_string()],
        }
    }
}

/// Audio device and format settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub capture_block: usize,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: constants::INPUT_SAMPLE_RATE,
            output_sample_rate: constants::OUTPUT_SAMPLE_RATE,
            capture_block: constants::CAPTURE_BLOCK_SIZE,
            input_device: None,
            output_device: None,
        }
    }
}

/// Remote endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub url: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/live".to_string(),
        }
    }
}

/// Outbound frame queueing settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboundConfig {
    #[serde(flatten)]
    pub policy: SendPolicy,
}

impl AppConfig {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| Error::Config(format!("parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Default config file location (`<config dir>/voicewire/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "voicewire")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Validates field ranges; called on every load.
    pub fn validate(&self) -> Result<()> {
        if self.audio.input_sample_rate == 0 || self.audio.output_sample_rate == 0 {
            return Err(Error::Config("sample rates must be non-zero".to_string()));
        }
        if self.audio.capture_block == 0 {
            return Err(Error::Config("capture_block must be non-zero".to_string()));
        }
        if self.live.model.is_empty() {
            return Err(Error::Config("live.model must not be empty".to_string()));
        }
        if self.transport.url.is_empty() {
            return Err(Error::Config("transport.url must not be empty".to_string()));
        }
        if let SendPolicy::DropOldest { capacity } = self.outbound.policy {
            if capacity == 0 {
                return Err(Error::Config(
                    "outbound.capacity must be non-zero for drop_oldest".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Connect configuration for the transport, mapped from the live section.
    pub fn setup(&self) -> SessionSetup {
        SessionSetup {
            model: self.live.model.clone(),
            voice: self.live.voice.clone(),
            system_instruction: self.live.system_instruction.clone(),
            response_modalities: self.live.response_modalities.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.audio.input_sample_rate, 16_000);
        assert_eq!(config.audio.output_sample_rate, 24_000);
        assert_eq!(config.audio.capture_block, 4096);
        assert_eq!(config.outbound.policy, SendPolicy::Unbounded);
    }

    #[test]
    fn test_parses_partial_toml() {
        let raw = r#"
            [live]
            voice = "Puck"

            [transport]
            url = "ws://10.0.0.2:9000/live"

            [outbound]
            policy = "drop_oldest"
            capacity = 64
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.live.voice, "Puck");
        assert_eq!(config.live.response_modalities, vec!["AUDIO".to_string()]);
        assert_eq!(config.transport.url, "ws://10.0.0.2:9000/live");
        assert_eq!(config.outbound.policy, SendPolicy::DropOldest { capacity: 64 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_capture_block() {
        let mut config = AppConfig::default();
        config.audio.capture_block = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_drop_oldest_capacity() {
        let mut config = AppConfig::default();
        config.outbound.policy = SendPolicy::DropOldest { capacity: 0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_setup_mirrors_live_section() {
        let config = AppConfig::default();
        let setup = config.setup();
        assert_eq!(setup.model, config.live.model);
        assert_eq!(setup.voice, "Zephyr");
        assert_eq!(setup.response_modalities, vec!["AUDIO".to_string()]);
    }
}
