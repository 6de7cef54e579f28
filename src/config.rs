use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Default number of polling attempts for MPC finalization and cluster key
/// fetch; the minimum acceptable responsiveness.
const DEFAULT_ATTEMPTS: u32 = 10;
/// Default spacing between polling attempts, in milliseconds.
const DEFAULT_DELAY_MS: u64 = 500;

/// Client configuration, derived from `Csvp.toml` and `CSVP_*` environment
/// variables. Every value has a default, so a bare [`Config::default`] is a
/// fully working configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_attempts")]
    finalize_attempts: u32,
    #[serde(default = "default_delay_ms")]
    finalize_delay_ms: u64,
    #[serde(default = "default_attempts")]
    key_fetch_attempts: u32,
    #[serde(default = "default_delay_ms")]
    key_fetch_delay_ms: u64,
}

fn default_attempts() -> u32 {
    DEFAULT_ATTEMPTS
}

fn default_delay_ms() -> u64 {
    DEFAULT_DELAY_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            finalize_attempts: DEFAULT_ATTEMPTS,
            finalize_delay_ms: DEFAULT_DELAY_MS,
            key_fetch_attempts: DEFAULT_ATTEMPTS,
            key_fetch_delay_ms: DEFAULT_DELAY_MS,
        }
    }
}

impl Config {
    /// Load the configuration from `Csvp.toml`, overridden by `CSVP_*`
    /// environment variables.
    pub fn load() -> Result<Self> {
        Figment::new()
            .merge(Toml::file("Csvp.toml"))
            .merge(Env::prefixed("CSVP_"))
            .extract()
            .map_err(|e| Error::Precondition(format!("invalid configuration: {e}")))
    }

    /// Attempt ceiling when awaiting MPC finalization.
    /// Configured via `CSVP_FINALIZE_ATTEMPTS`.
    pub fn finalize_attempts(&self) -> u32 {
        self.finalize_attempts
    }

    /// Spacing between finalization polls.
    /// Configured via `CSVP_FINALIZE_DELAY_MS`.
    pub fn finalize_delay(&self) -> Duration {
        Duration::from_millis(self.finalize_delay_ms)
    }

    /// Attempt ceiling when fetching the MXE cluster public key.
    /// Configured via `CSVP_KEY_FETCH_ATTEMPTS`.
    pub fn key_fetch_attempts(&self) -> u32 {
        self.key_fetch_attempts
    }

    /// Spacing between cluster key fetch attempts.
    /// Configured via `CSVP_KEY_FETCH_DELAY_MS`.
    pub fn key_fetch_delay(&self) -> Duration {
        Duration::from_millis(self.key_fetch_delay_ms)
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Config {
        /// Tight polling budgets so failure-path tests finish quickly.
        pub fn fast_example() -> Self {
            Self {
                finalize_attempts: 3,
                finalize_delay_ms: 5,
                key_fetch_attempts: 3,
                key_fetch_delay_ms: 5,
            }
        }
    }
}
