// Copyright 2026 The Palaver Project
// SPDX-License-Identifier: Apache-2.0

// Incremental SSE decoder.
//
// The server frames its stream as `data: <json>` lines, one chunk of
// the OpenAI-compatible completion schema per line, terminated by
// `data: [DONE]`. Network reads split that framing at arbitrary byte
// positions, so the decoder carries the partial trailing line between
// `push` calls.

use serde_json::Value;

/// Terminator payload sent by the server after the last content chunk.
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &str = "data: ";

/// Stateful line reassembler and `data:` payload parser.
///
/// Feed raw network chunks to [`push`](SseDecoder::push) in arrival
/// order; it returns the assistant text fragments completed by that
/// chunk. The decoder never fails: lines it cannot make sense of are
/// logged and skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Partial line carried over from the previous chunk.
    line_buffer: String,
    /// Set once `[DONE]` has been seen; later lines are ignored.
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the `[DONE]` terminator has been decoded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Consume one network chunk and return the fragments it completed.
    ///
    /// Only lines ending in `\n` are decoded; an unterminated tail is
    /// held until the next call. Invalid UTF-8 is replaced rather than
    /// rejected.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.line_buffer
            .push_str(&String::from_utf8_lossy(chunk));

        let mut fragments = Vec::new();
        while let Some(newline_pos) = self.line_buffer.find('\n') {
            let line = self.line_buffer[..newline_pos].to_string();
            self.line_buffer = self.line_buffer[newline_pos + 1..].to_string();

            if self.finished {
                continue;
            }
            match decode_line(line.trim()) {
                LineOutcome::Fragment(text) => fragments.push(text),
                LineOutcome::Finished => self.finished = true,
                LineOutcome::Nothing => {}
            }
        }
        fragments
    }
}

enum LineOutcome {
    Fragment(String),
    Finished,
    Nothing,
}

/// Decode one complete, trimmed line.
fn decode_line(line: &str) -> LineOutcome {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        // Blank separators, comments, and unknown fields are ignored.
        return LineOutcome::Nothing;
    };

    if payload == DONE_SENTINEL {
        return LineOutcome::Finished;
    }

    let parsed: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "skipping undecodable stream line");
            return LineOutcome::Nothing;
        }
    };

    match extract_delta_content(&parsed) {
        Some(text) if !text.is_empty() => LineOutcome::Fragment(text.to_string()),
        _ => LineOutcome::Nothing,
    }
}

/// Pull `choices[0].delta.content` out of a completion chunk.
fn extract_delta_content(data: &Value) -> Option<&str> {
    data.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
}
