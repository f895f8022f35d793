//! Runtime configuration of the negotiator.
//!
//! Loaded from a TOML file; every section falls back to its defaults when
//! missing.

use std::{collections::HashSet, fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, proto::Encoding};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub negotiation: NegotiationConfig,
    pub simulcast: SimulcastConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing-subscriber` filter directive, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Offer without receiving any media (`sendonly` media sections).
    pub force_sendonly: bool,
    /// Log generated offers and answers.
    pub log_sdp: bool,
    /// Declare simulcast reception in generated answers.
    pub simulcast_answer_workaround: bool,
    /// How long an offerer waits for the remote answer.
    pub answer_timeout_ms: u64,
}

impl NegotiationConfig {
    pub fn answer_timeout(&self) -> Duration {
        Duration::from_millis(self.answer_timeout_ms)
    }
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            force_sendonly: false,
            log_sdp: false,
            simulcast_answer_workaround: true,
            answer_timeout_ms: 10_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulcastConfig {
    pub encodings: Vec<EncodingConfig>,
}

impl SimulcastConfig {
    pub fn encodings(&self) -> Vec<Encoding> {
        self.encodings.iter().map(Encoding::from).collect()
    }
}

impl Default for SimulcastConfig {
    fn default() -> Self {
        let layer = |rid: &str, active, scale| EncodingConfig {
            rid: rid.to_string(),
            active,
            max_bitrate_bps: 2_000_000,
            scale_resolution_down_by: scale,
        };
        Self {
            encodings: vec![
                layer("r0", false, 16.0),
                layer("r1", false, 8.0),
                layer("r2", true, 1.0),
            ],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncodingConfig {
    pub rid: String,
    #[serde(default)]
    pub active: bool,
    pub max_bitrate_bps: u32,
    #[serde(default = "default_scale")]
    pub scale_resolution_down_by: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl From<&EncodingConfig> for Encoding {
    fn from(config: &EncodingConfig) -> Self {
        Encoding {
            rid: config.rid.clone(),
            active: config.active,
            max_bitrate_bps: config.max_bitrate_bps,
            scale_resolution_down_by: config.scale_resolution_down_by,
        }
    }
}

impl Config {
    pub const DEFAULT_PATH: &'static str = "peer-negotiator.toml";

    /// Loads configuration from a TOML file, using defaults if the file does
    /// not exist.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let config = Self::from_toml(&fs::read_to_string(path)?)?;
        tracing::info!(?path, "Loaded configuration");
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let encodings = &self.simulcast.encodings;
        if encodings.is_empty() {
            return Err(ConfigError::Invalid(
                "simulcast needs at least one encoding".to_string(),
            ));
        }

        let mut rids = HashSet::new();
        for encoding in encodings {
            if !rids.insert(encoding.rid.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate simulcast rid '{}'",
                    encoding.rid
                )));
            }
            if encoding.max_bitrate_bps == 0 {
                return Err(ConfigError::Invalid(format!(
                    "simulcast layer '{}' has zero bitrate",
                    encoding.rid
                )));
            }
            if !(encoding.scale_resolution_down_by >= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "simulcast layer '{}' downscale must be >= 1.0",
                    encoding.rid
                )));
            }
        }

        if self.negotiation.answer_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "answer timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
