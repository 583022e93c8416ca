//! Application configuration.
//!
//! Resolved once from the environment (after an optional `.env` load) into
//! an owned [`Config`] that is passed to whatever needs it — there is no
//! global settings store.

mod helpers;
mod service;

pub use service::ServiceConfig;

use crate::config::helpers::optional_env;
use crate::engine::EnginePreference;
use crate::error::ConfigError;

/// Engine connection configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Which backend to prefer: socket API, CLI, or automatic fallback.
    pub preference: EnginePreference,
}

impl EngineConfig {
    fn resolve() -> Result<Self, ConfigError> {
        let preference = optional_env("NEUROINSIGHT_ENGINE")?
            .map(|s| {
                s.parse().map_err(|message| ConfigError::InvalidValue {
                    key: "NEUROINSIGHT_ENGINE".to_string(),
                    message,
                })
            })
            .transpose()?
            .unwrap_or_default();
        Ok(Self { preference })
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub engine: EngineConfig,
}

impl Config {
    /// Resolve configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            service: ServiceConfig::resolve()?,
            engine: EngineConfig::resolve()?,
        })
    }
}
