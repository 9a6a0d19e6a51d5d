//! Pull source backed by a buffered stream.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

use super::{PullStream, SharedStream};
use crate::{BridgeError, CancelObserver};

/// Default number of bytes requested from the buffered source per pull.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Exposes a [`BufferedStream`](super::BufferedStream) as a pull source.
///
/// The first pull rewinds a seekable source so a fresh consumer always sees
/// the full content, even if someone already read part of it. Non-seekable
/// sources are read from wherever their cursor is. A source that is not
/// readable is treated as an empty body.
#[derive(Debug)]
pub struct BufferedPushAdapter {
    source: SharedStream,
    chunk_size: usize,
    try_rewind: bool,
    finished: bool,
}

impl BufferedPushAdapter {
    /// Wrap `source` using [`DEFAULT_CHUNK_SIZE`].
    pub fn new(source: SharedStream) -> Self {
        Self {
            source,
            chunk_size: DEFAULT_CHUNK_SIZE,
            try_rewind: true,
            finished: false,
        }
    }

    /// Wrap `source`, pulling at most `chunk_size` bytes at a time.
    pub fn with_chunk_size(source: SharedStream, chunk_size: usize) -> Result<Self, BridgeError> {
        if chunk_size < 1 {
            return Err(BridgeError::InvalidConfiguration(format!(
                "invalid chunk size: {chunk_size}"
            )));
        }
        Ok(Self {
            chunk_size,
            ..Self::new(source)
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Pull the next chunk unless `cancel` has been signaled.
    ///
    /// Reading a buffered source never suspends, so cancellation is only
    /// observed before touching the source.
    pub async fn pull(&mut self, cancel: &CancelObserver) -> Result<Option<Bytes>, BridgeError> {
        cancel.check()?;
        self.next_chunk()
    }

    /// Synchronous core of [`pull`](Self::pull).
    pub fn next_chunk(&mut self) -> Result<Option<Bytes>, BridgeError> {
        if self.finished {
            return Ok(None);
        }

        let mut stream = self.source.lock();
        if !stream.is_readable() {
            self.finished = true;
            return Ok(None);
        }

        if self.try_rewind {
            self.try_rewind = false;
            if stream.is_seekable() {
                stream.rewind()?;
            }
        }

        if stream.eof() {
            self.finished = true;
            return Ok(None);
        }

        stream.read(self.chunk_size).map(Some)
    }

    /// Close the underlying buffered source. Do not pull afterwards.
    pub fn close(&mut self) {
        self.source.close();
    }

    pub fn is_readable(&self) -> bool {
        self.source.is_readable()
    }

    pub fn into_pull_stream(self) -> PullStream {
        PullStream::new(self)
    }
}

impl Stream for BufferedPushAdapter {
    type Item = Result<Bytes, BridgeError>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().next_chunk().transpose())
    }
}
