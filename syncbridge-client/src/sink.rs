//! Download sink: copy a response body to a file while it is read.

use std::path::PathBuf;

use futures::StreamExt;
use syncbridge_core::{BridgeError, PullStream};
use tokio::io::AsyncWriteExt;

/// Wrap `body` so every chunk is also appended to the file at `path`.
///
/// The file is created (or truncated) on the first pull and flushed once
/// the body ends. Failures to open or write the file end the stream with
/// [`BridgeError::Io`].
pub fn tee_to_file(body: PullStream, path: impl Into<PathBuf>) -> PullStream {
    let path = path.into();
    PullStream::new(async_stream::try_stream! {
        let mut file = tokio::fs::File::create(&path).await.map_err(|e| sink_error(&path, e))?;
        #[cfg(feature = "tracing")]
        tracing::debug!(path = %path.display(), "writing response body to sink");

        let mut body = body;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(|e| sink_error(&path, e))?;
            yield chunk;
        }

        file.flush().await.map_err(|e| sink_error(&path, e))?;
    })
}

fn sink_error(path: &std::path::Path, err: std::io::Error) -> BridgeError {
    BridgeError::Io(format!("sink {}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use syncbridge_core::CancelObserver;

    #[tokio::test]
    async fn test_tee_writes_every_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.bin");

        let mut body = tee_to_file(PullStream::from_chunks(["ab", "cd", "ef"]), &path);
        let cancel = CancelObserver::never();
        let mut seen = Vec::new();
        while let Some(chunk) = body.pull(&cancel).await.unwrap() {
            seen.extend_from_slice(&chunk);
        }

        assert_eq!(seen, b"abcdef");
        assert_eq!(std::fs::read(&path).unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_unwritable_sink_fails_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("body.bin");

        let mut body = tee_to_file(PullStream::from_bytes(Bytes::from("x")), &path);
        let err = body.pull(&CancelObserver::never()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Io(_)));
    }

    #[tokio::test]
    async fn test_source_error_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.bin");
        let source = PullStream::new(futures::stream::iter(vec![
            Ok(Bytes::from("ok")),
            Err(BridgeError::Transport("reset".into())),
        ]));

        let mut body = tee_to_file(source, &path);
        let cancel = CancelObserver::never();
        assert_eq!(body.pull(&cancel).await.unwrap(), Some(Bytes::from("ok")));
        assert_eq!(
            body.pull(&cancel).await.unwrap_err(),
            BridgeError::Transport("reset".into())
        );
    }
}
