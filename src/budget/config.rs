// Copyright 2026 The Palaver Project
// SPDX-License-Identifier: Apache-2.0

// Server-advertised token limits and the cached fetch around them.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// How long a fetched config stays fresh before a caller triggers a
/// re-fetch.
pub const CONFIG_TTL: Duration = Duration::from_secs(300);

const DEFAULT_MAX_MODEL_LEN: u32 = 4096;
const DEFAULT_RESERVED_OUTPUT: u32 = 512;

/// Error raised by a [`ConfigFetcher`].
///
/// Fetch failures never surface to estimation callers; they are
/// logged and the current limits stay in effect.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("token config fetch failed: {0}")]
pub struct FetchError(pub String);

/// The `/api/v1/config` response body. Every field is optional so an
/// older backend that omits some is still usable.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RemoteTokenConfig {
    pub max_model_len: Option<u32>,
    pub reserved_output_tokens: Option<u32>,
    pub max_input_tokens: Option<u32>,
}

/// Effective context-window limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLimits {
    /// Total context window of the serving model.
    pub max_model_len: u32,
    /// Tokens held back for the completion.
    pub reserved_output_tokens: u32,
    /// Budget available to the input side.
    pub max_input_tokens: u32,
}

impl Default for TokenLimits {
    fn default() -> Self {
        Self {
            max_model_len: DEFAULT_MAX_MODEL_LEN,
            reserved_output_tokens: DEFAULT_RESERVED_OUTPUT,
            max_input_tokens: DEFAULT_MAX_MODEL_LEN - DEFAULT_RESERVED_OUTPUT,
        }
    }
}

impl TokenLimits {
    /// Overlay a remote config on the defaults.
    ///
    /// When the server does not state `max_input_tokens` explicitly it
    /// is derived from the other two.
    pub fn merged(remote: &RemoteTokenConfig) -> Self {
        let defaults = Self::default();
        let max_model_len = remote.max_model_len.unwrap_or(defaults.max_model_len);
        let reserved_output_tokens = remote
            .reserved_output_tokens
            .unwrap_or(defaults.reserved_output_tokens);
        let max_input_tokens = remote
            .max_input_tokens
            .unwrap_or_else(|| max_model_len.saturating_sub(reserved_output_tokens));
        Self {
            max_model_len,
            reserved_output_tokens,
            max_input_tokens,
        }
    }

    /// Bucket an estimated total against the input budget.
    ///
    /// Comparisons are integral so the 70/90/100 percent boundaries
    /// land exactly: 70% of the limit is still `Safe`, 90% is still
    /// `Warning`, and the limit itself is still `Danger`.
    pub fn gauge(&self, total: u32) -> TokenGauge {
        let limit = u64::from(self.max_input_tokens.max(1));
        let total64 = u64::from(total);

        let status = if total64 > limit {
            TokenStatus::Over
        } else if 10 * total64 > 9 * limit {
            TokenStatus::Danger
        } else if 10 * total64 > 7 * limit {
            TokenStatus::Warning
        } else {
            TokenStatus::Safe
        };

        let percent = ((total64 * 100) as f64 / limit as f64).round() as u32;
        TokenGauge {
            total,
            percent,
            status,
        }
    }
}

/// Usage severity, ordered from comfortable to blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TokenStatus {
    Safe,
    Warning,
    Danger,
    Over,
}

/// A point-in-time usage reading against the current limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenGauge {
    pub total: u32,
    /// Rounded percentage of the input budget; may exceed 100.
    pub percent: u32,
    pub status: TokenStatus,
}

impl TokenGauge {
    /// Whether submission should be refused at this usage level.
    pub fn blocks_submission(&self) -> bool {
        self.status == TokenStatus::Over
    }
}

/// Source of the remote token config, implemented by the API client
/// and by test doubles.
#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    async fn fetch_token_config(&self) -> Result<RemoteTokenConfig, FetchError>;
}

struct CacheState {
    limits: TokenLimits,
    /// `None` until the first successful fetch. Failures never set it,
    /// so the next caller retries.
    fetched_at: Option<Instant>,
    /// Bumped after every completed fetch attempt, success or not.
    /// Lets a caller that waited on the flight lock tell whether
    /// someone else already did the work.
    attempt: u64,
}

/// Cached view of [`TokenLimits`] with deduplicated refresh.
///
/// Any number of tasks may call [`limits`](TokenBudget::limits)
/// concurrently; at most one fetch is in flight at a time and a fresh
/// result is reused for [`CONFIG_TTL`].
pub struct TokenBudget<F> {
    fetcher: F,
    ttl: Duration,
    state: Mutex<CacheState>,
    /// Held across the fetch itself; `state` is never held across an
    /// await of the fetcher.
    flight: Mutex<()>,
}

impl<F: ConfigFetcher> TokenBudget<F> {
    pub fn new(fetcher: F) -> Self {
        Self::with_ttl(fetcher, CONFIG_TTL)
    }

    pub fn with_ttl(fetcher: F, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            state: Mutex::new(CacheState {
                limits: TokenLimits::default(),
                fetched_at: None,
                attempt: 0,
            }),
            flight: Mutex::new(()),
        }
    }

    /// Current limits, fetching or refreshing the remote config as
    /// needed. Never fails: on fetch failure the current limits (the
    /// defaults, initially) are returned and the failure is only
    /// logged.
    pub async fn limits(&self) -> TokenLimits {
        let seen_attempt = {
            let state = self.state.lock().await;
            if let Some(at) = state.fetched_at {
                if at.elapsed() < self.ttl {
                    return state.limits;
                }
            }
            state.attempt
        };

        let _flight = self.flight.lock().await;

        // Someone else may have finished a fetch while we waited for
        // the flight lock.
        {
            let state = self.state.lock().await;
            if state.attempt != seen_attempt {
                return state.limits;
            }
        }

        let fetched = self.fetcher.fetch_token_config().await;

        let mut state = self.state.lock().await;
        state.attempt += 1;
        match fetched {
            Ok(remote) => {
                state.limits = TokenLimits::merged(&remote);
                state.fetched_at = Some(Instant::now());
                tracing::debug!(
                    max_model_len = state.limits.max_model_len,
                    max_input_tokens = state.limits.max_input_tokens,
                    "token config refreshed"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "token config fetch failed, keeping current limits");
            }
        }
        state.limits
    }

    /// Whether a remote config has ever been loaded successfully.
    pub async fn is_loaded(&self) -> bool {
        self.state.lock().await.fetched_at.is_some()
    }

    /// Convenience: current limits applied to an estimated total.
    pub async fn gauge(&self, total: u32) -> TokenGauge {
        self.limits().await.gauge(total)
    }
}
