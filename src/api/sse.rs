//! SSE decoding for streamed chat completions.
//!
//! Turns the raw response byte stream into content deltas. Bytes are buffered
//! until a full line is available, so neither a JSON payload nor a multi-byte
//! UTF-8 sequence split across network chunks is ever decoded in pieces.

use crate::error::TrackerError;
use crate::utils::truncate_for_log;
use bytes::Bytes;
use futures::stream::Stream;
use serde::Deserialize;
use std::pin::Pin;
use std::task::{Context, Poll};

#[derive(Debug, Deserialize)]
struct StreamChunkRaw {
    #[serde(default)]
    choices: Vec<StreamChoiceRaw>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoiceRaw {
    #[serde(default)]
    delta: Option<DeltaRaw>,
}

#[derive(Debug, Deserialize)]
struct DeltaRaw {
    #[serde(default)]
    content: Option<String>,
}

enum SseEvent {
    Delta(String),
    Done,
}

/// Stream adapter yielding the non-empty content deltas of an SSE response.
///
/// Ends at `data: [DONE]` or when the underlying body ends, whichever comes first.
pub struct SseFragments {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    buffer: Vec<u8>,
    exhausted: bool,
    done: bool,
}

impl SseFragments {
    pub fn new(byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            buffer: Vec::new(),
            exhausted: false,
            done: false,
        }
    }
}

impl Stream for SseFragments {
    type Item = Result<String, TrackerError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.done {
                return Poll::Ready(None);
            }

            match next_event(&mut this.buffer) {
                Some(Ok(SseEvent::Delta(delta))) => return Poll::Ready(Some(Ok(delta))),
                Some(Ok(SseEvent::Done)) => {
                    this.done = true;
                    return Poll::Ready(None);
                }
                Some(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None if this.exhausted => {
                    this.done = true;
                    return Poll::Ready(None);
                }
                None => {}
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(TrackerError::Transport(e.to_string()))));
                }
                Poll::Ready(None) => {
                    this.exhausted = true;
                    // Terminate a trailing line that arrived without its newline.
                    if !this.buffer.is_empty() {
                        this.buffer.push(b'\n');
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Pull the next meaningful event out of `buffer`, consuming complete lines.
/// Returns `None` once no complete line with content is left.
fn next_event(buffer: &mut Vec<u8>) -> Option<Result<SseEvent, TrackerError>> {
    loop {
        let newline = buffer.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = buffer.drain(..=newline).collect();
        let line = match String::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                return Some(Err(TrackerError::Transport(format!(
                    "invalid UTF-8 in stream: {e}"
                ))));
            }
        };

        // Comments (":keep-alive"), "event:", "id:", "retry:" and blank separators carry no content.
        let Some(data) = line.trim().strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            return Some(Ok(SseEvent::Done));
        }

        let chunk: StreamChunkRaw = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                return Some(Err(TrackerError::Transport(format!(
                    "failed to parse stream chunk: {e} (data: {})",
                    truncate_for_log(data, 200)
                ))));
            }
        };
        if let Some(err) = chunk.error {
            return Some(Err(TrackerError::Transport(format!(
                "endpoint reported an error mid-stream: {err}"
            ))));
        }

        let delta = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .unwrap_or_default();
        if !delta.is_empty() {
            return Some(Ok(SseEvent::Delta(delta)));
        }
    }
}
