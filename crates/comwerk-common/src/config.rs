//! Bridge configuration

use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `LOCALE_USER_DEFAULT`
pub const LOCALE_USER_DEFAULT: u32 = 0x0400;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid bridge configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Process-wide settings for the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// LCID passed to `IDispatch::Invoke`
    pub locale: u32,
    /// `tracing` filter used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            locale: LOCALE_USER_DEFAULT,
            log_filter: "info".to_string(),
        }
    }
}

static INSTALLED: OnceCell<BridgeConfig> = OnceCell::new();
static DEFAULT: Lazy<BridgeConfig> = Lazy::new(BridgeConfig::default);

impl BridgeConfig {
    /// Parse a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Make this the process-wide configuration.
    ///
    /// Returns `false` if a configuration was already installed; the first one wins.
    pub fn install(self) -> bool {
        INSTALLED.set(self).is_ok()
    }

    /// The installed configuration, if any.
    pub fn installed() -> Option<&'static BridgeConfig> {
        INSTALLED.get()
    }

    /// The installed configuration, or the default one.
    pub fn current() -> &'static BridgeConfig {
        INSTALLED.get().unwrap_or(&DEFAULT)
    }
}
