// Copyright 2026 The Palaver Project
// SPDX-License-Identifier: Apache-2.0

// Tests for SSE decoding.
//
// Tests cover:
//  1. Fragments extracted from data: lines in order
//  2. Chunk boundaries inside a line reassemble correctly
//  3. data: [DONE] ends the stream without producing a fragment
//  4. Malformed JSON lines are skipped, later lines still decode
//  5. Blank lines, comments, and non-data fields are ignored
//  6. Empty/missing delta content produces no fragment
//  7. Unterminated trailing line is never decoded
//  8. Transport errors surface as a Failed terminal event
//  9. Dropping the event stream cancels the background task

use super::*;
use bytes::Bytes;
use std::convert::Infallible;
use tokio::time::{timeout, Duration};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build an in-memory byte stream where each string is one network chunk.
fn byte_stream(
    chunks: Vec<&str>,
) -> impl tokio_stream::Stream<Item = Result<Bytes, Infallible>> + Unpin + Send {
    let chunks: Vec<Result<Bytes, Infallible>> = chunks
        .into_iter()
        .map(|c| Ok(Bytes::from(c.to_string())))
        .collect();
    tokio_stream::iter(chunks)
}

/// Build a stream backed by a channel, for cancellation tests.
fn channel_stream() -> (
    tokio::sync::mpsc::Sender<Result<Bytes, Infallible>>,
    ReceiverStream<Result<Bytes, Infallible>>,
) {
    let (tx, rx) = tokio::sync::mpsc::channel(16);
    (tx, ReceiverStream::new(rx))
}

/// A `data:` line carrying one content delta, with trailing newline.
fn delta_line(content: &str) -> String {
    format!(
        "data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"{content}\"}},\"finish_reason\":null}}]}}\n"
    )
}

/// Drain a decoded stream into (fragments, terminal event).
async fn collect_events(
    stream: impl tokio_stream::Stream<Item = StreamEvent> + Unpin,
) -> (Vec<String>, Option<StreamEvent>) {
    let mut fragments = Vec::new();
    let mut terminal = None;
    tokio::pin!(stream);
    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Fragment(text) => fragments.push(text),
            other => {
                terminal = Some(other);
                break;
            }
        }
    }
    (fragments, terminal)
}

// ---------------------------------------------------------------------------
// Decoder: fragment extraction
// ---------------------------------------------------------------------------

#[test]
fn fragments_extracted_in_order() {
    let mut decoder = SseDecoder::new();
    let input = format!("{}{}", delta_line("Hello"), delta_line(" world"));
    let fragments = decoder.push(input.as_bytes());
    assert_eq!(fragments, vec!["Hello", " world"]);
}

#[test]
fn chunk_boundary_inside_a_line_reassembles() {
    let mut decoder = SseDecoder::new();
    let line = delta_line("Hello");
    let (head, tail) = line.split_at(line.len() / 2);

    assert!(decoder.push(head.as_bytes()).is_empty());
    assert_eq!(decoder.push(tail.as_bytes()), vec!["Hello"]);
}

#[test]
fn content_split_across_two_deltas_stays_split() {
    let mut decoder = SseDecoder::new();
    let mut fragments = decoder.push(delta_line("He").as_bytes());
    fragments.extend(decoder.push(delta_line("llo").as_bytes()));
    assert_eq!(fragments, vec!["He", "llo"]);
    assert_eq!(fragments.concat(), "Hello");
}

#[test]
fn boundary_split_across_three_chunks() {
    let mut decoder = SseDecoder::new();
    let line = delta_line("chunked");
    let thirds = line.len() / 3;

    assert!(decoder.push(line[..thirds].as_bytes()).is_empty());
    assert!(decoder.push(line[thirds..2 * thirds].as_bytes()).is_empty());
    assert_eq!(decoder.push(line[2 * thirds..].as_bytes()), vec!["chunked"]);
}

#[test]
fn one_chunk_completing_many_lines_yields_all_fragments() {
    let mut decoder = SseDecoder::new();
    let input = format!(
        "{}{}{}",
        delta_line("a"),
        delta_line("b"),
        delta_line("c")
    );
    assert_eq!(decoder.push(input.as_bytes()), vec!["a", "b", "c"]);
}

// ---------------------------------------------------------------------------
// Decoder: terminator
// ---------------------------------------------------------------------------

#[test]
fn done_sentinel_produces_no_fragment_and_finishes() {
    let mut decoder = SseDecoder::new();
    assert!(decoder.push(b"data: [DONE]\n").is_empty());
    assert!(decoder.is_finished());
}

#[test]
fn lines_after_done_are_ignored() {
    let mut decoder = SseDecoder::new();
    let input = format!("data: [DONE]\n{}", delta_line("late"));
    assert!(decoder.push(input.as_bytes()).is_empty());
}

#[test]
fn not_finished_before_done() {
    let mut decoder = SseDecoder::new();
    decoder.push(delta_line("hi").as_bytes());
    assert!(!decoder.is_finished());
}

// ---------------------------------------------------------------------------
// Decoder: resilience
// ---------------------------------------------------------------------------

#[test]
fn malformed_json_line_is_skipped() {
    let mut decoder = SseDecoder::new();
    let input = format!("data: {{not json\n{}", delta_line("ok"));
    assert_eq!(decoder.push(input.as_bytes()), vec!["ok"]);
}

#[test]
fn blank_lines_and_comments_are_ignored() {
    let mut decoder = SseDecoder::new();
    let input = format!("\n: keep-alive\nevent: ping\n{}\n", delta_line("text"));
    assert_eq!(decoder.push(input.as_bytes()), vec!["text"]);
}

#[test]
fn empty_content_produces_no_fragment() {
    let mut decoder = SseDecoder::new();
    assert!(decoder.push(delta_line("").as_bytes()).is_empty());
}

#[test]
fn chunk_without_delta_content_produces_no_fragment() {
    let mut decoder = SseDecoder::new();
    // Role-priming chunk: delta carries a role but no content.
    let input = "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n";
    assert!(decoder.push(input.as_bytes()).is_empty());
}

#[test]
fn non_string_content_is_skipped() {
    let mut decoder = SseDecoder::new();
    let input = "data: {\"choices\":[{\"delta\":{\"content\":42}}]}\n";
    assert!(decoder.push(input.as_bytes()).is_empty());
}

#[test]
fn unterminated_trailing_line_is_held_back() {
    let mut decoder = SseDecoder::new();
    let line = delta_line("partial");
    // No trailing newline: nothing may be decoded.
    assert!(decoder.push(line.trim_end().as_bytes()).is_empty());
}

#[test]
fn crlf_line_endings_decode() {
    let mut decoder = SseDecoder::new();
    let input = delta_line("win").replace('\n', "\r\n");
    assert_eq!(decoder.push(input.as_bytes()), vec!["win"]);
}

#[test]
fn empty_chunk_is_a_no_op() {
    let mut decoder = SseDecoder::new();
    assert!(decoder.push(b"").is_empty());
    assert_eq!(decoder.push(delta_line("x").as_bytes()), vec!["x"]);
}

// ---------------------------------------------------------------------------
// Reader: event stream bridging
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reader_yields_fragments_then_done() {
    let line1 = delta_line("Hel");
    let line2 = delta_line("lo");
    let input = byte_stream(vec![
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n",
        &line1,
        &line2,
        "data: [DONE]\n\n",
    ]);

    let (fragments, terminal) = collect_events(decode_stream(input)).await;
    assert_eq!(fragments, vec!["Hel", "lo"]);
    assert_eq!(terminal, Some(StreamEvent::Done));
}

#[tokio::test]
async fn reader_emits_done_when_connection_closes_without_sentinel() {
    let line = delta_line("tail");
    let input = byte_stream(vec![&line]);

    let (fragments, terminal) = collect_events(decode_stream(input)).await;
    assert_eq!(fragments, vec!["tail"]);
    assert_eq!(terminal, Some(StreamEvent::Done));
}

#[tokio::test]
async fn reader_reassembles_split_chunks() {
    let line = delta_line("Hello");
    let (head, tail) = line.split_at(10);
    let input = byte_stream(vec![head, tail, "data: [DONE]\n"]);

    let (fragments, terminal) = collect_events(decode_stream(input)).await;
    assert_eq!(fragments, vec!["Hello"]);
    assert_eq!(terminal, Some(StreamEvent::Done));
}

#[tokio::test]
async fn transport_error_surfaces_as_failed() {
    let line = delta_line("before");
    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from(line)),
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )),
    ];
    let input = tokio_stream::iter(chunks);

    let (fragments, terminal) = collect_events(decode_stream(input)).await;
    assert_eq!(fragments, vec!["before"]);
    match terminal {
        Some(StreamEvent::Failed(StreamFailure(reason))) => {
            assert!(reason.contains("connection reset"));
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn nothing_emitted_after_terminal_event() {
    let line = delta_line("ignored");
    let input = byte_stream(vec!["data: [DONE]\n", &line]);

    let mut stream = decode_stream(input);
    assert_eq!(stream.next().await, Some(StreamEvent::Done));
    assert_eq!(stream.next().await, None);
}

#[tokio::test]
async fn dropping_the_stream_cancels_the_task() {
    let (tx, rx) = channel_stream();

    let mut stream = decode_stream(rx);
    tx.send(Ok(Bytes::from(delta_line("first"))))
        .await
        .unwrap();
    assert_eq!(
        stream.next().await,
        Some(StreamEvent::Fragment("first".to_string()))
    );

    drop(stream);

    // The task notices on its next send and releases the input
    // receiver; sends then start failing.
    let result = timeout(Duration::from_secs(5), async {
        loop {
            if tx
                .send(Ok(Bytes::from(delta_line("more"))))
                .await
                .is_err()
            {
                break;
            }
            tokio::task::yield_now().await;
        }
    })
    .await;
    assert!(result.is_ok(), "input was never released after drop");
}
