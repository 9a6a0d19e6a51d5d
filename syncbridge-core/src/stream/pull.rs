//! Pull-based, cancellable byte stream.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::{BridgeError, CancelObserver};

/// Boxed byte stream as produced by transports and body sources.
pub type BoxByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BridgeError>> + Send>>;

/// A single-consumer, single-pass byte stream.
///
/// Consumers call [`pull`](PullStream::pull) for the next chunk; `Ok(None)`
/// means EOF and stays EOF on every later pull. Chunks may be empty; an empty
/// chunk is data, not EOF.
pub struct PullStream {
    inner: BoxByteStream,
    done: bool,
}

impl PullStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, BridgeError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
            done: false,
        }
    }

    /// A stream that is at EOF from the start.
    pub fn empty() -> Self {
        Self::new(futures::stream::empty())
    }

    /// A stream yielding `data` as one chunk.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self::new(futures::stream::once(async move { Ok(data) }))
    }

    /// A stream yielding each chunk in order.
    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let chunks: Vec<Result<Bytes, BridgeError>> =
            chunks.into_iter().map(|c| Ok(c.into())).collect();
        Self::new(futures::stream::iter(chunks))
    }

    /// Pull the next chunk, giving up with [`BridgeError::Cancelled`] as soon
    /// as `cancel` is signaled.
    pub async fn pull(&mut self, cancel: &CancelObserver) -> Result<Option<Bytes>, BridgeError> {
        if self.done {
            return Ok(None);
        }

        let inner = &mut self.inner;
        let next = cancel
            .guard(async move { inner.next().await.transpose() })
            .await?;

        if next.is_none() {
            self.done = true;
        }
        if let Some(chunk) = &next {
            tracing::trace!(len = chunk.len(), "pulled chunk");
        }
        Ok(next)
    }

    /// Whether EOF has been observed.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn into_inner(self) -> BoxByteStream {
        self.inner
    }
}

impl Stream for PullStream {
    type Item = Result<Bytes, BridgeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        let polled = this.inner.as_mut().poll_next(cx);
        if let Poll::Ready(None) = polled {
            this.done = true;
        }
        polled
    }
}

impl fmt::Debug for PullStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PullStream")
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
