// Copyright 2026 The Palaver Project
// SPDX-License-Identifier: Apache-2.0

// Bridges a raw byte stream into a stream of decoded chat events.

use super::decoder::SseDecoder;
use super::types::{StreamEvent, StreamFailure};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

/// Decode a fallible byte stream into [`StreamEvent`]s.
///
/// A background task drives the input; the returned stream yields
/// fragments in arrival order followed by exactly one terminal event.
/// Dropping the returned stream stops the task on its next send,
/// which releases the input stream and aborts the transfer.
pub fn decode_stream<S, E>(mut input: S) -> ReceiverStream<StreamEvent>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<StreamEvent>(64);

    tokio::spawn(async move {
        let mut decoder = SseDecoder::new();

        while let Some(item) = input.next().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => {
                    // Best-effort: the consumer may already be gone.
                    let _ = tx
                        .send(StreamEvent::Failed(StreamFailure(e.to_string())))
                        .await;
                    return;
                }
            };

            for fragment in decoder.push(&chunk) {
                if tx.send(StreamEvent::Fragment(fragment)).await.is_err() {
                    return; // Consumer dropped the stream
                }
            }
            if decoder.is_finished() {
                break;
            }
        }

        // Either `[DONE]` arrived or the connection closed cleanly.
        let _ = tx.send(StreamEvent::Done).await;
    });

    ReceiverStream::new(rx)
}
