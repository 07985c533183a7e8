//! Streaming decoder (Bytes -> typed chunks)
//!
//! Decodes the upstream `data: <json>` line format into a pull-based
//! [`ChunkStream`]. Malformed events are skipped and counted rather than
//! failing the whole stream.

use crate::{BoxStream, PipeResult};
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::warn;

/// Line-oriented SSE decoder:
/// - splits on `\n` (a trailing `\r` is stripped)
/// - takes payloads from lines starting with `prefix` (default "data:"), one
///   optional space after it removed
/// - stops on `done_signal` (default "[DONE]")
#[derive(Debug, Clone)]
pub struct StreamDecoder {
    prefix: String,
    done_signal: String,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl StreamDecoder {
    pub fn new(prefix: Option<String>, done_signal: Option<String>) -> Self {
        Self {
            prefix: prefix.unwrap_or_else(|| "data:".to_string()),
            done_signal: done_signal.unwrap_or_else(|| "[DONE]".to_string()),
        }
    }

    /// Wrap a byte feed. Nothing is read until the stream is polled.
    pub fn decode<T>(&self, input: BoxStream<'static, Bytes>) -> ChunkStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let skipped = Arc::new(AtomicU64::new(0));
        let state = DecodeState {
            input: Some(input),
            buf: Vec::new(),
            prefix: self.prefix.clone(),
            done_signal: self.done_signal.clone(),
            skipped: Arc::clone(&skipped),
            _marker: PhantomData::<fn() -> T>,
        };

        let inner = stream::unfold(state, |mut state| async move {
            loop {
                // Emit complete lines already buffered.
                if let Some(idx) = state.buf.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = state.buf.drain(..=idx).collect();
                    match state.parse_line(&line[..idx]) {
                        Line::Item(v) => return Some((Ok(v), state)),
                        Line::Done => return None,
                        Line::Skip => continue,
                    }
                }

                // The feed has already ended or failed.
                let input = state.input.as_mut()?;

                match input.next().await {
                    Some(Ok(bytes)) => {
                        state.buf.extend_from_slice(&bytes);
                    }
                    Some(Err(e)) => {
                        // Terminal: drop the feed so the next pull ends the stream.
                        state.input = None;
                        state.buf.clear();
                        return Some((Err(e), state));
                    }
                    None => {
                        state.input = None;
                        let rest = std::mem::take(&mut state.buf);
                        return match state.parse_line(&rest) {
                            Line::Item(v) => Some((Ok(v), state)),
                            Line::Done | Line::Skip => None,
                        };
                    }
                }
            }
        });

        ChunkStream {
            inner: Some(Box::pin(inner)),
            skipped,
        }
    }
}

enum Line<T> {
    Item(T),
    Done,
    Skip,
}

struct DecodeState<T> {
    input: Option<BoxStream<'static, Bytes>>,
    buf: Vec<u8>,
    prefix: String,
    done_signal: String,
    skipped: Arc<AtomicU64>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> DecodeState<T> {
    fn parse_line(&self, line: &[u8]) -> Line<T> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(payload) = line.strip_prefix(self.prefix.as_bytes()) else {
            // Comments, `event:`, `id:` and blank lines carry nothing for us
            return Line::Skip;
        };
        let payload = payload.strip_prefix(b" ").unwrap_or(payload);
        if payload.is_empty() {
            return Line::Skip;
        }
        if payload == self.done_signal.as_bytes() {
            return Line::Done;
        }
        match serde_json::from_slice::<T>(payload) {
            Ok(v) => Line::Item(v),
            Err(e) => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "skipping malformed stream event"
                );
                Line::Skip
            }
        }
    }
}

/// Single-consumer, single-pass sequence of decoded chunks.
///
/// After a transport error has been yielded, after `[DONE]`, or after
/// [`close`](ChunkStream::close), every further pull yields `None`.
pub struct ChunkStream<T> {
    inner: Option<BoxStream<'static, T>>,
    skipped: Arc<AtomicU64>,
}

impl<T> ChunkStream<T> {
    /// Number of malformed events skipped so far.
    pub fn skipped_lines(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Drop the underlying feed now, cancelling the HTTP body read.
    pub fn close(&mut self) {
        self.inner = None;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl<T> Stream for ChunkStream<T> {
    type Item = PipeResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match inner.as_mut().poll_next(cx) {
            Poll::Ready(None) => {
                self.inner = None;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}
