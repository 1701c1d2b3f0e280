// quire/src/config.rs

//! `BuildConfig`: the orchestrator's configuration surface.

use crate::error::{QuireError, QuireResult};
use serde::{Deserialize, Serialize};
use std::env;

pub const ENV_WORKER_POOL_SIZE: &str = "QUIRE_WORKER_POOL_SIZE";
pub const ENV_UNHANDLED_FILES: &str = "QUIRE_UNHANDLED_FILES";

/// What a run does with files no handler claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnhandledPolicy {
  /// Report a warning diagnostic and skip the file.
  #[default]
  Warn,
  /// Reject the whole run before any phase begins.
  Fail,
}

impl std::str::FromStr for UnhandledPolicy {
  type Err = QuireError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "warn" | "warning" => Ok(UnhandledPolicy::Warn),
      "fail" | "error" => Ok(UnhandledPolicy::Fail),
      other => Err(QuireError::configuration(format!(
        "invalid unhandled-files policy '{}', expected 'warn' or 'fail'",
        other
      ))),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
  /// Maximum number of BUILD pipelines running at once. Must be at least 1.
  pub worker_pool_size: usize,
  pub unhandled_files: UnhandledPolicy,
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      worker_pool_size: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
      unhandled_files: UnhandledPolicy::default(),
    }
  }
}

impl BuildConfig {
  pub fn with_worker_pool_size(mut self, size: usize) -> Self {
    self.worker_pool_size = size;
    self
  }

  pub fn with_unhandled_files(mut self, policy: UnhandledPolicy) -> Self {
    self.unhandled_files = policy;
    self
  }

  /// Parses and validates a TOML document. Missing keys take their defaults.
  pub fn from_toml_str(source: &str) -> QuireResult<Self> {
    let config: BuildConfig = toml::from_str(source)
      .map_err(|e| QuireError::configuration(format!("invalid build configuration: {}", e)))?;
    config.validate()?;
    Ok(config)
  }

  /// Applies `QUIRE_WORKER_POOL_SIZE` and `QUIRE_UNHANDLED_FILES` when set.
  pub fn apply_env_overrides(mut self) -> QuireResult<Self> {
    if let Ok(raw) = env::var(ENV_WORKER_POOL_SIZE) {
      self.worker_pool_size = raw
        .trim()
        .parse::<usize>()
        .map_err(|e| QuireError::configuration(format!("Invalid {}: {}", ENV_WORKER_POOL_SIZE, e)))?;
    }
    if let Ok(raw) = env::var(ENV_UNHANDLED_FILES) {
      self.unhandled_files = raw.parse()?;
    }
    self.validate()?;
    tracing::debug!(config = ?self, "Build configuration loaded.");
    Ok(self)
  }

  pub fn validate(&self) -> QuireResult<()> {
    if self.worker_pool_size == 0 {
      return Err(QuireError::configuration("worker_pool_size must be at least 1"));
    }
    Ok(())
  }
}
