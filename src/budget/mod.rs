// Copyright 2026 The Palaver Project
// SPDX-License-Identifier: Apache-2.0

// Token budgeting.
//
// Responsibilities:
// - Estimate token counts for drafts and conversations with a cheap
//   per-code-point heuristic (no tokenizer dependency)
// - Hold the server-advertised context limits, refreshed through a
//   cached, deduplicated fetch
// - Bucket usage into a status the UI can act on

mod config;
mod estimator;

pub use config::{
    ConfigFetcher, FetchError, RemoteTokenConfig, TokenBudget, TokenGauge, TokenLimits,
    TokenStatus, CONFIG_TTL,
};
pub use estimator::{EstimatorWeights, TokenEstimator};
