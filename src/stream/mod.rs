// Copyright 2026 The Palaver Project
// SPDX-License-Identifier: Apache-2.0

// SSE decoding for streamed chat completions.
//
// Responsibilities:
// - Reassemble lines from arbitrarily-split network chunks
// - Parse `data: ` lines and extract assistant text deltas
// - Recognize the `[DONE]` terminator
// - Skip malformed or unrecognized lines without killing the stream
// - Bridge a fallible byte stream into an event stream with
//   drop-to-cancel semantics

mod decoder;
mod reader;
mod types;

pub use decoder::{SseDecoder, DONE_SENTINEL};
pub use reader::decode_stream;
pub use types::{StreamEvent, StreamFailure};

#[cfg(test)]
mod tests;
