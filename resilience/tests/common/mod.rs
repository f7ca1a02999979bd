//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};

use quota_config::LimitsConfig;
use quota_resilience::{RetryConfig, ServiceRegistry};
use quota_types::{MeteredResponse, TokenUsage};

pub const LIMITS: &str = r#"
[defaults]
timeout_secs = 10
allowed_tries = 3

[services.chat]
requests_per_period = 4
request_period_secs = 4
tokens_per_period = 2000
token_period_secs = 60
prompt_price_per_token = 0.0001
completion_price_per_token = 0.0002

[services.search]
requests_per_period = 10
request_period_secs = 1
price_per_request = 0.05
"#;

/// Registry for [`LIMITS`] with millisecond backoff.
pub fn registry() -> ServiceRegistry {
    let config: LimitsConfig = LIMITS.parse().expect("valid limits");
    let mut registry = ServiceRegistry::from_config(&config).expect("valid limiters");
    for name in ["chat", "search"] {
        let mut profile = registry.get(name).expect("configured").clone();
        profile.set_retry_config(fast_retry(3));
        registry.insert(profile);
    }
    registry
}

pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: std::time::Duration::from_millis(5),
        min_delay: std::time::Duration::ZERO,
        max_delay: std::time::Duration::from_millis(20),
        jitter_factor: 0.0,
    }
}

/// A fake completion carrying the usage the service reported.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

impl MeteredResponse for Completion {
    fn token_usage(&self) -> TokenUsage {
        self.usage
    }
}

/// Counts calls so tests can assert how many attempts reached the service.
#[derive(Debug, Default)]
pub struct CallCounter(AtomicU32);

impl CallCounter {
    pub fn bump(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}
