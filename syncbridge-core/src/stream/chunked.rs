//! Blocking, buffered reader over a pull source.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::runtime::Handle;

use super::{BufferedStream, PullStream};
use crate::blocking::block_on;
use crate::{BridgeError, CancelObserver};

/// Time a single pull may take before the read fails.
pub const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_secs(5);

/// A [`BufferedStream`] that fills its buffer by pulling from a [`PullStream`].
///
/// Reads block the calling thread while the pull runs on the given runtime;
/// inside a current-thread runtime they fail with
/// [`BridgeError::InvalidConfiguration`] (see
/// [`block_on`](crate::blocking::block_on)). The stream is forward-only:
/// positioning fails with [`BridgeError::NotSeekable`] and writes with
/// [`BridgeError::NotWritable`].
pub struct ChunkedPullStream {
    source: Option<PullStream>,
    handle: Handle,
    timeout: Duration,
    cancel: CancelObserver,
    buffer: BytesMut,
    eof: bool,
}

impl ChunkedPullStream {
    pub fn new(source: PullStream, handle: Handle) -> Self {
        Self {
            source: Some(source),
            handle,
            timeout: DEFAULT_PULL_TIMEOUT,
            cancel: CancelObserver::never(),
            buffer: BytesMut::new(),
            eof: false,
        }
    }

    /// Override the per-pull timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Abort pulls once `cancel` is signaled.
    pub fn with_cancel(mut self, cancel: CancelObserver) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn fill(&mut self) -> Result<(), BridgeError> {
        let source = self.source.as_mut().ok_or(BridgeError::StreamClosed)?;
        let timeout = self.timeout;
        let cancel = &self.cancel;

        let pulled = block_on(&self.handle, async {
            match tokio::time::timeout(timeout, source.pull(cancel)).await {
                Ok(result) => result,
                Err(_) => Err(BridgeError::PullTimeout(timeout)),
            }
        })??;

        match pulled {
            Some(chunk) => self.buffer.extend_from_slice(&chunk),
            None => self.eof = true,
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), BridgeError> {
        if self.source.is_none() {
            Err(BridgeError::StreamClosed)
        } else {
            Ok(())
        }
    }
}

impl BufferedStream for ChunkedPullStream {
    fn read(&mut self, len: usize) -> Result<Bytes, BridgeError> {
        self.ensure_open()?;
        while !self.eof && self.buffer.len() < len {
            self.fill()?;
        }
        let take = len.min(self.buffer.len());
        Ok(self.buffer.split_to(take).freeze())
    }

    fn contents(&mut self) -> Result<Bytes, BridgeError> {
        self.ensure_open()?;
        while !self.eof {
            self.fill()?;
        }
        Ok(self.buffer.split().freeze())
    }

    fn write(&mut self, _data: &[u8]) -> Result<usize, BridgeError> {
        Err(BridgeError::NotWritable)
    }

    fn eof(&self) -> bool {
        self.eof && self.buffer.is_empty()
    }

    fn seek(&mut self, _pos: u64) -> Result<(), BridgeError> {
        Err(BridgeError::NotSeekable)
    }

    fn rewind(&mut self) -> Result<(), BridgeError> {
        Err(BridgeError::NotSeekable)
    }

    fn tell(&self) -> Result<u64, BridgeError> {
        Err(BridgeError::NotSeekable)
    }

    fn size(&self) -> Option<u64> {
        None
    }

    fn is_readable(&self) -> bool {
        self.source.is_some()
    }

    fn is_writable(&self) -> bool {
        false
    }

    fn is_seekable(&self) -> bool {
        false
    }

    fn close(&mut self) {
        if self.source.take().is_some() {
            tracing::trace!("chunked pull stream closed");
        }
        self.buffer.clear();
    }

    fn detach(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ChunkedPullStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedPullStream")
            .field("timeout", &self.timeout)
            .field("buffered", &self.buffer.len())
            .field("eof", &self.eof)
            .field("closed", &self.source.is_none())
            .finish()
    }
}
