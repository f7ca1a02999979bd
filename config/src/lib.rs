//! Service limit configuration.
//!
//! Limits live in `~/.quota/limits.toml`: one `[services.NAME]` table per external
//! service plus a `[defaults]` table for the values a service may leave out. Nothing
//! in the core crates reads this file implicitly; the calling layer loads it and
//! builds its service registry from the result.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use quota_types::{LimitPolicy, Pricing};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: f64 = 120.0;
const DEFAULT_ALLOWED_TRIES: u32 = 3;
const DEFAULT_PERIOD_SECS: f64 = 60.0;

fn default_timeout_secs() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_allowed_tries() -> u32 {
    DEFAULT_ALLOWED_TRIES
}

fn default_period_secs() -> f64 {
    DEFAULT_PERIOD_SECS
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error(transparent)]
    Syntax(#[from] toml::de::Error),
    #[error("service '{service}': {reason}")]
    Invalid { service: String, reason: String },
}

impl ConfigError {
    /// The file the error came from, when there was one.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Syntax(_) | ConfigError::Invalid { .. } => None,
        }
    }

    fn invalid(service: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            service: service.to_string(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// File shape
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceLimits>,
}

/// Values applied to every service that does not set its own.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    #[serde(default = "default_allowed_tries")]
    pub allowed_tries: u32,
}

impl Defaults {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_duration("[defaults]", "timeout_secs", self.timeout_secs)?;
        if self.allowed_tries == 0 {
            return Err(ConfigError::invalid(
                "[defaults]",
                "allowed_tries must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            allowed_tries: DEFAULT_ALLOWED_TRIES,
        }
    }
}

/// Limits and prices for one external service.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceLimits {
    /// Requests allowed per `request_period_secs`, also the burst size.
    pub requests_per_period: f64,
    #[serde(default = "default_period_secs")]
    pub request_period_secs: f64,
    /// Tokens allowed per `token_period_secs`. Services without a token quota omit it.
    pub tokens_per_period: Option<f64>,
    #[serde(default = "default_period_secs")]
    pub token_period_secs: f64,
    pub timeout_secs: Option<f64>,
    pub allowed_tries: Option<u32>,
    #[serde(default)]
    pub on_limit_reached: LimitPolicy,
    #[serde(default)]
    pub price_per_request: f64,
    #[serde(default)]
    pub prompt_price_per_token: f64,
    #[serde(default)]
    pub completion_price_per_token: f64,
}

/// Converts validated seconds into a `Duration`.
///
/// Values validation rejects saturate instead of panicking: non-positive ones become
/// zero and oversized ones become `Duration::MAX`.
fn seconds(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

impl ServiceLimits {
    #[must_use]
    pub fn request_period(&self) -> Duration {
        seconds(self.request_period_secs)
    }

    #[must_use]
    pub fn token_period(&self) -> Duration {
        seconds(self.token_period_secs)
    }

    /// Per-attempt deadline, falling back to `defaults`.
    #[must_use]
    pub fn timeout(&self, defaults: &Defaults) -> Duration {
        seconds(self.timeout_secs.unwrap_or(defaults.timeout_secs))
    }

    #[must_use]
    pub fn allowed_tries(&self, defaults: &Defaults) -> u32 {
        self.allowed_tries.unwrap_or(defaults.allowed_tries)
    }

    #[must_use]
    pub fn pricing(&self) -> Pricing {
        Pricing {
            per_request: self.price_per_request,
            per_prompt_token: self.prompt_price_per_token,
            per_completion_token: self.completion_price_per_token,
        }
    }

    /// Checks the limits of the service called `service`.
    pub fn validate(&self, service: &str) -> Result<(), ConfigError> {
        require_positive(service, "requests_per_period", self.requests_per_period)?;
        require_duration(service, "request_period_secs", self.request_period_secs)?;
        if let Some(tokens) = self.tokens_per_period {
            require_positive(service, "tokens_per_period", tokens)?;
            require_duration(service, "token_period_secs", self.token_period_secs)?;
        }
        if let Some(timeout) = self.timeout_secs {
            require_duration(service, "timeout_secs", timeout)?;
        }
        if self.allowed_tries == Some(0) {
            return Err(ConfigError::invalid(service, "allowed_tries must be at least 1"));
        }
        for (field, price) in [
            ("price_per_request", self.price_per_request),
            ("prompt_price_per_token", self.prompt_price_per_token),
            ("completion_price_per_token", self.completion_price_per_token),
        ] {
            if !quota_types::is_valid_amount(price) {
                return Err(ConfigError::invalid(
                    service,
                    format!("{field} must be a finite, non-negative number (got {price})"),
                ));
            }
        }
        Ok(())
    }
}

fn require_positive(service: &str, field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            service,
            format!("{field} must be a finite number greater than 0 (got {value})"),
        ))
    }
}

fn require_duration(service: &str, field: &str, secs: f64) -> Result<(), ConfigError> {
    require_positive(service, field, secs)?;
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if duration.is_zero() => Err(ConfigError::invalid(
            service,
            format!("{field} is shorter than a nanosecond (got {secs})"),
        )),
        Ok(_) => Ok(()),
        Err(_) => Err(ConfigError::invalid(
            service,
            format!("{field} is too large to be a duration (got {secs})"),
        )),
    }
}

// ============================================================================
// Loading
// ============================================================================

impl LimitsConfig {
    /// Loads the file at [`config_path`].
    ///
    /// Returns `Ok(None)` when there is no home directory or no file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    /// Loads and validates the file at `path`; `Ok(None)` if it does not exist.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read limits config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        let config: Self = match toml::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("Failed to parse limits config at {:?}: {}", path, err);
                return Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        if let Err(err) = config.validate() {
            tracing::warn!(path = %path.display(), %err, "Rejected limits config");
            return Err(err);
        }
        Ok(Some(config))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.defaults.validate()?;
        for (name, limits) in &self.services {
            limits.validate(name)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ServiceLimits> {
        self.services.get(name)
    }
}

impl FromStr for LimitsConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".quota").join("limits.toml"))
}
