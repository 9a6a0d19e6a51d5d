//! Bulk copy from a pull source into a buffered sink.

use super::{PullStream, SharedStream};
use crate::{BridgeError, CancelObserver};

/// Pumps a [`PullStream`] into a buffered sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamCopier;

impl StreamCopier {
    /// Write every chunk of `source` into `sink` until EOF, then rewind `sink`.
    ///
    /// Empty chunks are written like any other chunk. The sink is expected to
    /// be seekable; one that cannot be rewound is reported as
    /// [`BridgeError::InvalidConfiguration`]. Returns the number of bytes copied.
    pub async fn copy(
        source: &mut PullStream,
        sink: &SharedStream,
        cancel: &CancelObserver,
    ) -> Result<u64, BridgeError> {
        let mut copied = 0u64;
        while let Some(chunk) = source.pull(cancel).await? {
            sink.write(&chunk)?;
            copied += chunk.len() as u64;
        }

        sink.rewind().map_err(|err| {
            BridgeError::InvalidConfiguration(format!("copy sink cannot be rewound: {err}"))
        })?;

        tracing::trace!(bytes = copied, "stream copied");
        Ok(copied)
    }
}
