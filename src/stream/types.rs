// Copyright 2026 The Palaver Project
// SPDX-License-Identifier: Apache-2.0

/// Why a stream ended before the server said it was done.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("stream transport failed: {0}")]
pub struct StreamFailure(pub String);

/// One event observed on a decoded chat stream.
///
/// A well-behaved stream is zero or more `Fragment`s followed by
/// exactly one terminal event (`Done` or `Failed`). Nothing is
/// emitted after a terminal event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A piece of assistant text, in arrival order.
    Fragment(String),
    /// The server signalled end-of-stream, or the byte stream ended.
    Done,
    /// The underlying transport failed mid-stream.
    Failed(StreamFailure),
}

impl StreamEvent {
    /// True for `Done` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Fragment(_))
    }
}
