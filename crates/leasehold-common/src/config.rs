//! Lock configuration
//!
//! Values are layered from an optional file and `LEASEHOLD_*` environment
//! variables, then checked against their lower bounds.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, Map};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{LockError, Result};

/// Section holding the lock options in a configuration source
pub const LOCK_PROPERTIES_PREFIX: &str = "lock";

const ENV_PREFIX: &str = "LEASEHOLD";

pub const MIN_KEEP_ALIVE_MS: u64 = 5_000;
pub const DEFAULT_KEEP_ALIVE_MS: u64 = 60_000;
pub const MIN_FACTOR: f64 = 1.1;
pub const DEFAULT_FACTOR: f64 = 1.5;

/// Keep-alive settings for renewable locks
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LockConfig {
    /// Renewal tick interval in milliseconds
    #[validate(range(min = 5000, message = "keep_alive_ms must be at least 5000"))]
    pub keep_alive_ms: u64,
    /// Renewable locks need a timeout of at least `keep_alive_ms * factor`
    #[validate(range(min = 1.1, message = "factor must be at least 1.1"))]
    pub factor: f64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            keep_alive_ms: DEFAULT_KEEP_ALIVE_MS,
            factor: DEFAULT_FACTOR,
        }
    }
}

impl LockConfig {
    pub fn new(keep_alive_ms: u64, factor: f64) -> Result<Self> {
        let config = Self {
            keep_alive_ms,
            factor,
        };
        config.check()?;
        Ok(config)
    }

    /// Load from an optional file plus `LEASEHOLD_LOCK__*` environment variables.
    ///
    /// A missing file or a missing `lock` section falls back to the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    pub(crate) fn load_with_env(
        path: Option<&Path>,
        env: Option<Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let settings = builder
            .build()
            .map_err(|e| LockError::Config(e.to_string()))?;

        let config = match settings.get::<LockConfig>(LOCK_PROPERTIES_PREFIX) {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => LockConfig::default(),
            Err(e) => return Err(LockError::Config(e.to_string())),
        };
        config.check()?;
        Ok(config)
    }

    /// Validate the lower bounds of every option
    pub fn check(&self) -> Result<()> {
        // NaN passes the range check
        if !self.factor.is_finite() {
            return Err(LockError::Config(format!(
                "factor must be a finite number, got {}",
                self.factor
            )));
        }
        self.validate()
            .map_err(|e| LockError::Config(e.to_string()))
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    /// Shortest timeout accepted for a renewable lock, in milliseconds
    pub fn min_renewal_timeout_ms(&self) -> f64 {
        self.keep_alive_ms as f64 * self.factor
    }
}
