//! Request body handed to hyper.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use syncbridge_core::{BodySource, BridgeError};

pin_project! {
    /// Outbound request body.
    ///
    /// Bodies of known length advertise it through [`Body::size_hint`] so
    /// hyper can send a `content-length` instead of chunked encoding.
    #[project = TransportBodyProj]
    pub enum TransportBody {
        Empty,
        Streaming {
            #[pin]
            stream: Pin<Box<dyn Stream<Item = Result<Bytes, BridgeError>> + Send>>,
            length: Option<u64>,
        },
    }
}

impl TransportBody {
    pub fn empty() -> Self {
        TransportBody::Empty
    }

    /// A streaming body; `length` is the exact byte count when known.
    pub fn streaming<S>(stream: S, length: Option<u64>) -> Self
    where
        S: Stream<Item = Result<Bytes, BridgeError>> + Send + 'static,
    {
        TransportBody::Streaming {
            stream: Box::pin(stream),
            length,
        }
    }

    /// Start a fresh pass over a request body.
    pub fn from_source(source: &BodySource) -> Self {
        match source.length() {
            Some(0) => TransportBody::Empty,
            length => TransportBody::streaming(source.stream(), length),
        }
    }
}

impl Body for TransportBody {
    type Data = Bytes;
    type Error = BridgeError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            TransportBodyProj::Empty => Poll::Ready(None),
            TransportBodyProj::Streaming { stream, .. } => match stream.poll_next(cx) {
                Poll::Ready(Some(Ok(data))) => Poll::Ready(Some(Ok(Frame::data(data)))),
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            TransportBody::Empty => true,
            TransportBody::Streaming { .. } => false,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            TransportBody::Empty => SizeHint::with_exact(0),
            TransportBody::Streaming {
                length: Some(len), ..
            } => SizeHint::with_exact(*len),
            TransportBody::Streaming { .. } => SizeHint::default(),
        }
    }
}

impl Default for TransportBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for TransportBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportBody::Empty => write!(f, "TransportBody::Empty"),
            TransportBody::Streaming { length, .. } => f
                .debug_struct("TransportBody::Streaming")
                .field("length", length)
                .finish(),
        }
    }
}
