//! Token usage and pricing.
//!
//! A service is priced per request, per token, or both. [`Pricing::cost`] turns the
//! usage reported by a finished call into the amount recorded against budget scopes.

use serde::{Deserialize, Serialize};

/// Token counts reported by a metered call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    #[must_use]
    pub const fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    #[must_use]
    pub const fn total(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// A call result that can report how many tokens it consumed.
pub trait MeteredResponse {
    fn token_usage(&self) -> TokenUsage;
}

impl MeteredResponse for TokenUsage {
    fn token_usage(&self) -> TokenUsage {
        *self
    }
}

/// Price schedule for one service, in dollars.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pricing {
    #[serde(default)]
    pub per_request: f64,
    #[serde(default)]
    pub per_prompt_token: f64,
    #[serde(default)]
    pub per_completion_token: f64,
}

impl Pricing {
    pub const FREE: Pricing = Pricing {
        per_request: 0.0,
        per_prompt_token: 0.0,
        per_completion_token: 0.0,
    };

    #[must_use]
    pub const fn per_request(price: f64) -> Self {
        Self {
            per_request: price,
            per_prompt_token: 0.0,
            per_completion_token: 0.0,
        }
    }

    #[must_use]
    pub const fn per_token(prompt: f64, completion: f64) -> Self {
        Self {
            per_request: 0.0,
            per_prompt_token: prompt,
            per_completion_token: completion,
        }
    }

    /// Cost of one request that consumed `usage`.
    #[must_use]
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        self.per_request
            + usage.prompt_tokens as f64 * self.per_prompt_token
            + usage.completion_tokens as f64 * self.per_completion_token
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        *self == Self::FREE
    }
}
