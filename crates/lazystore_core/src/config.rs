//! Store runtime configuration.
//!
//! # Invariants
//! - `max_drain_passes` is at least 1.
//! - Defaults are safe for untrusted input: html fields escape writes.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_DRAIN_PASSES: u32 = 10_000;

/// Tunables for one `Store` instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Upper bound on drain loop passes before the drain gives up.
    pub max_drain_passes: u32,
    /// Treat inserts as trusted unless `InsertOptions` says otherwise.
    pub html_trusted_by_default: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_drain_passes: DEFAULT_MAX_DRAIN_PASSES,
            html_trusted_by_default: false,
        }
    }
}

impl StoreConfig {
    /// Parses a config from a JSON document, filling omitted keys with defaults.
    pub fn from_json(text: &str) -> StoreResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|err| StoreError::Config(format!("malformed config json: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.max_drain_passes == 0 {
            return Err(StoreError::Config(
                "max_drain_passes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
