//! Buffered and pull-based byte streams, and the adapters between them.
//!
//! The blocking side of the bridge reads bodies through [`BufferedStream`]
//! (arbitrary-length reads, EOF flag, optional seeking and writing). The async
//! side consumes [`PullStream`]s, which deliver chunks of whatever size the
//! producer chose and observe a cancel signal on every pull.
//!
//! - [`ChunkedPullStream`]: a `BufferedStream` backed by a `PullStream`
//! - [`BufferedPushAdapter`]: a pull source backed by a `BufferedStream`
//! - [`StreamCopier`]: bulk copy from a pull source into a buffered sink

mod chunked;
mod copy;
mod memory;
mod pull;
mod push;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::BridgeError;

pub use chunked::{ChunkedPullStream, DEFAULT_PULL_TIMEOUT};
pub use copy::StreamCopier;
pub use memory::MemoryStream;
pub use pull::{BoxByteStream, PullStream};
pub use push::{BufferedPushAdapter, DEFAULT_CHUNK_SIZE};

/// A blocking, buffered byte stream.
///
/// Once [`close`](BufferedStream::close) or [`detach`](BufferedStream::detach)
/// has been called the stream is permanently unusable.
pub trait BufferedStream: Send {
    /// Read up to `len` bytes. An empty result at EOF is not an error.
    fn read(&mut self, len: usize) -> Result<Bytes, BridgeError>;

    /// Read everything that is left.
    fn contents(&mut self) -> Result<Bytes, BridgeError>;

    /// Write `data` at the current position, returning the number of bytes written.
    fn write(&mut self, data: &[u8]) -> Result<usize, BridgeError>;

    /// Whether the end of the stream has been reached.
    fn eof(&self) -> bool;

    /// Move the cursor to an absolute position.
    fn seek(&mut self, pos: u64) -> Result<(), BridgeError>;

    /// Move the cursor back to the start.
    fn rewind(&mut self) -> Result<(), BridgeError> {
        self.seek(0)
    }

    /// Current cursor position.
    fn tell(&self) -> Result<u64, BridgeError>;

    /// Total size in bytes, if known.
    fn size(&self) -> Option<u64>;

    fn is_readable(&self) -> bool;

    fn is_writable(&self) -> bool;

    fn is_seekable(&self) -> bool;

    /// Close the stream and release the underlying resource.
    fn close(&mut self);

    /// Separate the underlying resource from the stream. The stream becomes unusable.
    fn detach(&mut self);
}

/// A [`BufferedStream`] shared between a message and the adapters reading it.
///
/// External messages hand their body out as a `SharedStream` so a request
/// body can be replayed (each replay rewinds it) while the message keeps
/// ownership of the buffer.
#[derive(Clone)]
pub struct SharedStream {
    inner: Arc<Mutex<Box<dyn BufferedStream>>>,
}

impl SharedStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: BufferedStream + 'static,
    {
        Self::from_box(Box::new(stream))
    }

    pub fn from_box(stream: Box<dyn BufferedStream>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(stream)),
        }
    }

    /// An empty, seekable, writable in-memory stream.
    pub fn memory() -> Self {
        Self::new(MemoryStream::new())
    }

    /// Lock the stream for direct access.
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn BufferedStream>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read(&self, len: usize) -> Result<Bytes, BridgeError> {
        self.lock().read(len)
    }

    pub fn contents(&self) -> Result<Bytes, BridgeError> {
        self.lock().contents()
    }

    pub fn write(&self, data: &[u8]) -> Result<usize, BridgeError> {
        self.lock().write(data)
    }

    pub fn eof(&self) -> bool {
        self.lock().eof()
    }

    pub fn rewind(&self) -> Result<(), BridgeError> {
        self.lock().rewind()
    }

    pub fn size(&self) -> Option<u64> {
        self.lock().size()
    }

    pub fn is_readable(&self) -> bool {
        self.lock().is_readable()
    }

    pub fn close(&self) {
        self.lock().close()
    }

    /// Whether both handles point at the same underlying stream.
    pub fn ptr_eq(&self, other: &SharedStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for SharedStream {
    fn default() -> Self {
        Self::memory()
    }
}

impl fmt::Debug for SharedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedStream")
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

impl<S> From<S> for SharedStream
where
    S: BufferedStream + 'static,
{
    fn from(stream: S) -> Self {
        Self::new(stream)
    }
}
