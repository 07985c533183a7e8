//! # Streaming Pipeline
//!
//! Turns a streamed upstream body into typed chunks.
//!
//! ```text
//! HTTP body (Bytes) → StreamDecoder → ChunkStream<StreamChunk> → handler
//! ```
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`StreamDecoder`] | Line-oriented `data:` decoder with `[DONE]` handling |
//! | [`ChunkStream`] | Pull-based, single-pass chunk sequence with `close()` |
//!
//! ## Example
//!
//! ```rust
//! use bytes::Bytes;
//! use diffusion_gateway::pipeline::StreamDecoder;
//! use diffusion_gateway::BoxStream;
//! use futures::StreamExt;
//!
//! # tokio_test::block_on(async {
//! let body: BoxStream<'static, Bytes> = Box::pin(futures::stream::iter(vec![Ok(
//!     Bytes::from_static(b"data: {\"n\":1}\ndata: [DONE]\n"),
//! )]));
//! let mut chunks = StreamDecoder::default().decode::<serde_json::Value>(body);
//! assert_eq!(chunks.next().await.unwrap().unwrap()["n"], 1);
//! assert!(chunks.next().await.is_none());
//! # });
//! ```

pub mod decode;

pub use decode::{ChunkStream, StreamDecoder};
