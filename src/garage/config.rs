//! Engine tuning: storage key, timer periods and offline caps.
//!
//! Every field has a default, so an override blob only needs the keys it changes.

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// localStorage key holding the save document.
pub const DEFAULT_STORAGE_KEY: &str = "garage_tycoon_save";

/// localStorage key the host checks for a JSON override of [`EngineConfig`].
pub const CONFIG_STORAGE_KEY: &str = "garage_tycoon_config";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub storage_key: String,
    /// Passive income period. One tick credits one second of income.
    pub tick_interval_ms: f64,
    pub autosave_interval_ms: f64,
    /// Quiet period after the last balance-affecting action before saving.
    pub save_debounce_ms: f64,
    /// Interval firings processed per pump at most (backgrounded tab guard).
    pub max_catch_up_ticks: u32,
    pub max_offline_hours: f64,
    pub critical_chance: f64,
    pub critical_multiplier: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            tick_interval_ms: 1_000.0,
            autosave_interval_ms: 30_000.0,
            save_debounce_ms: 2_000.0,
            max_catch_up_ticks: 5,
            max_offline_hours: 24.0,
            critical_chance: 0.05,
            critical_multiplier: 2,
        }
    }
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON override and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_key.is_empty() {
            return Err(invalid("storageKey", "must not be empty"));
        }
        for (field, value) in [
            ("tickIntervalMs", self.tick_interval_ms),
            ("autosaveIntervalMs", self.autosave_interval_ms),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(field, format!("must be positive, got {value}")));
            }
        }
        for (field, value) in [
            ("saveDebounceMs", self.save_debounce_ms),
            ("maxOfflineHours", self.max_offline_hours),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(field, format!("must be non-negative, got {value}")));
            }
        }
        if !(0.0..=1.0).contains(&self.critical_chance) {
            return Err(invalid(
                "criticalChance",
                format!("must be within [0, 1], got {}", self.critical_chance),
            ));
        }
        if self.critical_multiplier == 0 {
            return Err(invalid("criticalMultiplier", "must be at least 1"));
        }
        if self.max_catch_up_ticks == 0 {
            return Err(invalid("maxCatchUpTicks", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
