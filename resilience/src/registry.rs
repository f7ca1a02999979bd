//! Per-service limiters, deadlines, retry policies and prices.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use quota_config::{ConfigError, Defaults, LimitsConfig, ServiceLimits};
use quota_limiter::TokenBucket;
use quota_types::{LimiterError, MeteredResponse, Pricing};

use crate::pipeline::CallPipeline;
use crate::retry::RetryConfig;

/// Everything needed to call one external service politely.
///
/// Limiters are shared: clones of a profile and every pipeline built from it draw
/// from the same buckets.
#[derive(Debug, Clone)]
pub struct ServiceProfile {
    name: String,
    limits: ServiceLimits,
    requests: Arc<TokenBucket>,
    tokens: Option<Arc<TokenBucket>>,
    deadline: Duration,
    retry: RetryConfig,
    pricing: Pricing,
}

impl ServiceProfile {
    /// Validates `limits` and `defaults`, then builds fresh limiters from them.
    pub fn from_limits(
        name: impl Into<String>,
        limits: ServiceLimits,
        defaults: &Defaults,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        defaults.validate()?;
        limits.validate(&name)?;
        let (requests, tokens) = build_limiters(&limits).map_err(|err| ConfigError::Invalid {
            service: name.clone(),
            reason: err.to_string(),
        })?;
        Ok(Self {
            name,
            deadline: limits.timeout(defaults),
            retry: RetryConfig::with_attempts(limits.allowed_tries(defaults)),
            pricing: limits.pricing(),
            limits,
            requests,
            tokens,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn limits(&self) -> &ServiceLimits {
        &self.limits
    }

    #[must_use]
    pub fn request_limiter(&self) -> &Arc<TokenBucket> {
        &self.requests
    }

    #[must_use]
    pub fn token_limiter(&self) -> Option<&Arc<TokenBucket>> {
        self.tokens.as_ref()
    }

    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    #[must_use]
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Overrides the retry policy built from the configured `allowed_tries`.
    pub fn set_retry_config(&mut self, retry: RetryConfig) {
        self.retry = retry;
    }

    #[must_use]
    pub fn pricing(&self) -> Pricing {
        self.pricing
    }

    /// A pipeline with every stage enabled, charging `pricing().cost(usage)` per call.
    ///
    /// `token_estimate` sizes the token draw for a call's arguments; it is ignored
    /// when the service has no token quota.
    pub fn pipeline<A, T>(
        &self,
        token_estimate: impl Fn(&A) -> f64 + Send + Sync + 'static,
    ) -> CallPipeline<A, T>
    where
        A: 'static,
        T: MeteredResponse + 'static,
    {
        let pricing = self.pricing;
        let mut pipeline = CallPipeline::new().request_limiter(Arc::clone(&self.requests));
        if let Some(tokens) = &self.tokens {
            pipeline = pipeline.token_limiter(Arc::clone(tokens), token_estimate);
        }
        pipeline
            .retry(self.retry.clone())
            .usage(move |response: &T| pricing.cost(&response.token_usage()))
            .deadline(self.deadline)
    }

    fn rebuild_limiters(&mut self) -> Result<(), LimiterError> {
        let (requests, tokens) = build_limiters(&self.limits)?;
        self.requests = requests;
        self.tokens = tokens;
        Ok(())
    }
}

fn build_limiters(
    limits: &ServiceLimits,
) -> Result<(Arc<TokenBucket>, Option<Arc<TokenBucket>>), LimiterError> {
    let requests = TokenBucket::per_period(limits.requests_per_period, limits.request_period())?
        .with_policy(limits.on_limit_reached);
    let tokens = match limits.tokens_per_period {
        Some(tokens) => Some(Arc::new(
            TokenBucket::per_period(tokens, limits.token_period())?
                .with_policy(limits.on_limit_reached),
        )),
        None => None,
    };
    Ok((Arc::new(requests), tokens))
}

/// Service profiles keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    defaults: Defaults,
    profiles: BTreeMap<String, ServiceProfile>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new(defaults: Defaults) -> Self {
        Self {
            defaults,
            profiles: BTreeMap::new(),
        }
    }

    /// One profile per configured service. The config is validated first.
    pub fn from_config(config: &LimitsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut registry = Self::new(config.defaults.clone());
        for (name, limits) in &config.services {
            registry.add(name.clone(), limits.clone())?;
        }
        Ok(registry)
    }

    #[must_use]
    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ServiceProfile> {
        self.profiles.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Adds or replaces a profile, returning the one it displaced.
    pub fn insert(&mut self, profile: ServiceProfile) -> Option<ServiceProfile> {
        self.profiles.insert(profile.name.clone(), profile)
    }

    /// Builds a profile from `limits` with this registry's defaults and inserts it.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        limits: ServiceLimits,
    ) -> Result<&ServiceProfile, ConfigError> {
        let name = name.into();
        let profile = ServiceProfile::from_limits(name.clone(), limits, &self.defaults)?;
        self.profiles.insert(name.clone(), profile);
        Ok(&self.profiles[&name])
    }

    /// Replaces every limiter with a full one built from its configured limits.
    ///
    /// Pipelines built before the reset keep the old limiters.
    pub fn reset(&mut self) -> Result<(), LimiterError> {
        for profile in self.profiles.values_mut() {
            profile.rebuild_limiters()?;
        }
        tracing::debug!(services = self.profiles.len(), "Reset service limiters");
        Ok(())
    }

    /// Swaps in a token limiter nothing realistic waits on. Returns `false` for
    /// unknown services.
    pub fn unthrottle(&mut self, name: &str) -> bool {
        match self.profiles.get_mut(name) {
            Some(profile) => {
                profile.tokens = Some(Arc::new(TokenBucket::unthrottled()));
                true
            }
            None => false,
        }
    }
}
