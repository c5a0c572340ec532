// Heuristic token estimation.
//
// Counting real tokens would need the model's tokenizer; the client
// only needs a warning gauge, so it weighs code points instead. The
// weights approximate how BPE tokenizers behave on mixed text: CJK
// scripts run close to one token per character, ASCII words compress
// well below one, everything else lands in between.

use crate::message::{ChatMessage, ContentPart, MessageContent};

/// Per-code-point and structural weights used by the estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorWeights {
    /// CJK ideographs, Hangul, kana, CJK punctuation.
    pub cjk: f64,
    /// ASCII letters a-z / A-Z.
    pub ascii_alpha: f64,
    /// Everything else (digits, spaces, punctuation, emoji, ...).
    pub other: f64,
    /// Flat cost charged per image part.
    pub image_tokens: u32,
    /// Wrapping overhead charged per message.
    pub message_overhead: u32,
    /// Baseline for the server-side system prompt.
    pub system_prompt: u32,
    /// Overhead charged when estimating an unsent draft.
    pub draft_overhead: u32,
}

impl Default for EstimatorWeights {
    fn default() -> Self {
        Self {
            cjk: 1.4,
            ascii_alpha: 0.3,
            other: 0.5,
            image_tokens: 1225,
            message_overhead: 10,
            system_prompt: 16,
            draft_overhead: 10,
        }
    }
}

/// Estimates token usage for text, messages, and whole conversations.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEstimator {
    weights: EstimatorWeights,
}

impl TokenEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: EstimatorWeights) -> Self {
        Self { weights }
    }

    /// Estimate tokens for a run of text.
    ///
    /// Sums per-code-point weights and rounds up, so any non-empty
    /// text costs at least one token.
    pub fn estimate_text(&self, text: &str) -> u32 {
        let mut weight = 0.0_f64;
        for ch in text.chars() {
            weight += if is_cjk(ch) {
                self.weights.cjk
            } else if ch.is_ascii_alphabetic() {
                self.weights.ascii_alpha
            } else {
                self.weights.other
            };
        }
        weight.ceil() as u32
    }

    /// Estimate tokens for one part of a multimodal message.
    ///
    /// Image cost is flat regardless of the payload size. Unknown
    /// part kinds cost nothing rather than guessing.
    pub fn estimate_part(&self, part: &ContentPart) -> u32 {
        match part {
            ContentPart::Text { text } => self.estimate_text(text),
            ContentPart::ImageUrl { .. } => self.weights.image_tokens,
            ContentPart::Other => 0,
        }
    }

    /// Estimate tokens for one message including its wrapping overhead.
    pub fn estimate_message(&self, message: &ChatMessage) -> u32 {
        let content = match &message.content {
            MessageContent::Text(text) => self.estimate_text(text),
            MessageContent::Parts(parts) => {
                parts.iter().map(|p| self.estimate_part(p)).sum()
            }
        };
        content + self.weights.message_overhead
    }

    /// Estimate total input tokens for a conversation as submitted.
    ///
    /// Includes the system prompt baseline even when the caller sends
    /// no explicit system message, because the server injects one.
    pub fn estimate_messages(&self, messages: &[ChatMessage]) -> u32 {
        let body: u32 = messages.iter().map(|m| self.estimate_message(m)).sum();
        body + self.weights.system_prompt
    }

    /// Estimate a conversation plus an unsent input-box draft.
    ///
    /// The draft is charged its own wrapping overhead only when it is
    /// non-empty, since an empty input box adds no message.
    pub fn estimate_draft(&self, messages: &[ChatMessage], draft: &str) -> u32 {
        let base = self.estimate_messages(messages);
        if draft.is_empty() {
            base
        } else {
            base + self.estimate_text(draft) + self.weights.draft_overhead
        }
    }
}

/// Whether a code point falls in the heavy CJK weight class.
fn is_cjk(ch: char) -> bool {
    matches!(u32::from(ch),
        0x3000..=0x9FFF      // CJK punctuation, kana, ideographs
        | 0xAC00..=0xD7AF    // Hangul syllables
        | 0xF900..=0xFAFF    // CJK compatibility ideographs
        | 0x1100..=0x11FF    // Hangul jamo
        | 0x3130..=0x318F    // Hangul compatibility jamo
    )
}
