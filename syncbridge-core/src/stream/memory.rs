//! In-memory seekable stream used as the default message body.

use bytes::Bytes;

use super::BufferedStream;
use crate::BridgeError;

/// A growable in-memory byte stream with a cursor.
///
/// Writes land at the cursor, overwriting existing bytes and extending the
/// buffer as needed. The cursor never moves past the end of the data.
#[derive(Debug, Default, Clone)]
pub struct MemoryStream {
    data: Vec<u8>,
    pos: usize,
    closed: bool,
}

impl MemoryStream {
    /// Create an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stream holding `data` with the cursor at the start.
    pub fn from_bytes(data: impl AsRef<[u8]>) -> Self {
        Self {
            data: data.as_ref().to_vec(),
            pos: 0,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<(), BridgeError> {
        if self.closed {
            Err(BridgeError::StreamClosed)
        } else {
            Ok(())
        }
    }
}

impl BufferedStream for MemoryStream {
    fn read(&mut self, len: usize) -> Result<Bytes, BridgeError> {
        self.ensure_open()?;
        let start = self.pos.min(self.data.len());
        let end = start.saturating_add(len).min(self.data.len());
        self.pos = end;
        Ok(Bytes::copy_from_slice(&self.data[start..end]))
    }

    fn contents(&mut self) -> Result<Bytes, BridgeError> {
        self.ensure_open()?;
        let start = self.pos.min(self.data.len());
        self.pos = self.data.len();
        Ok(Bytes::copy_from_slice(&self.data[start..]))
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, BridgeError> {
        self.ensure_open()?;
        let end = self.pos.checked_add(data.len()).ok_or_else(|| {
            BridgeError::InvalidConfiguration("write past the addressable size".into())
        })?;
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(data.len())
    }

    fn eof(&self) -> bool {
        self.closed || self.pos >= self.data.len()
    }

    fn seek(&mut self, pos: u64) -> Result<(), BridgeError> {
        self.ensure_open()?;
        match usize::try_from(pos) {
            Ok(pos) if pos <= self.data.len() => {
                self.pos = pos;
                Ok(())
            }
            _ => Err(BridgeError::InvalidConfiguration(format!(
                "seek position {pos} is past the end ({})",
                self.data.len()
            ))),
        }
    }

    fn tell(&self) -> Result<u64, BridgeError> {
        self.ensure_open()?;
        Ok(self.pos as u64)
    }

    fn size(&self) -> Option<u64> {
        if self.closed {
            None
        } else {
            Some(self.data.len() as u64)
        }
    }

    fn is_readable(&self) -> bool {
        !self.closed
    }

    fn is_writable(&self) -> bool {
        !self.closed
    }

    fn is_seekable(&self) -> bool {
        !self.closed
    }

    fn close(&mut self) {
        self.closed = true;
        self.data = Vec::new();
        self.pos = 0;
    }

    fn detach(&mut self) {
        self.close();
    }
}
