//! Bounded streaming body accumulation.
//!
//! Turns a chunked body stream into one contiguous buffer while checking the
//! running byte count as chunks arrive, so chunked or spoofed-length payloads
//! are cut off at the ceiling instead of being materialized first.
//!
//! Every chunk that enters the joiner is dropped on exactly one path: copied
//! into the accumulator and then dropped, or dropped right here when it
//! crosses the limit. Cancelling the future (client disconnect) drops the
//! accumulator and any chunk in flight with it.

use axum::body::Body;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from joining a body stream.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("payload too large: {seen} > limit {limit}")]
    PayloadTooLarge { seen: usize, limit: usize },

    #[error("body stream failed: {0}")]
    Stream(#[source] BoxError),
}

/// Joins a body stream into one buffer of at most `limit` bytes.
#[derive(Debug, Clone, Copy)]
pub struct BoundedBodyJoiner {
    limit: usize,
}

impl BoundedBodyJoiner {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Join an arbitrary chunk stream. An empty stream yields an empty buffer.
    pub async fn join<S, B, E>(&self, stream: S) -> Result<Bytes, JoinError>
    where
        S: Stream<Item = Result<B, E>>,
        B: Buf,
        E: Into<BoxError>,
    {
        futures_util::pin_mut!(stream);

        let mut seen: usize = 0;
        let mut joined = BytesMut::new();

        while let Some(item) = stream.next().await {
            let chunk = item.map_err(|e| JoinError::Stream(e.into()))?;

            seen = seen.saturating_add(chunk.remaining());
            if seen > self.limit {
                drop(chunk);
                return Err(JoinError::PayloadTooLarge {
                    seen,
                    limit: self.limit,
                });
            }

            // put() copies and consumes the chunk.
            joined.put(chunk);
        }

        Ok(joined.freeze())
    }

    /// Join an axum body.
    pub async fn join_body(&self, body: Body) -> Result<Bytes, JoinError> {
        self.join(body.into_data_stream()).await
    }
}
