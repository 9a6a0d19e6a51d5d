//! One-shot cooperative cancellation.
//!
//! A [`CancelToken`] is owned by whoever may cancel an operation; the
//! operation itself only ever sees a [`CancelObserver`], which can check the
//! flag or wait for it but never set it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::BridgeError;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A one-shot, idempotent cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// Create a fresh, unsignaled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation.
    ///
    /// Returns `true` only for the call that actually flipped the flag.
    pub fn cancel(&self) -> bool {
        let first = !self.inner.cancelled.swap(true, Ordering::AcqRel);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Read-only view of this token.
    pub fn observer(&self) -> CancelObserver {
        CancelObserver {
            inner: Some(self.inner.clone()),
        }
    }
}

/// Read-only view of a [`CancelToken`].
///
/// Once the token is signaled every observer derived from it reports
/// cancellation permanently.
#[derive(Debug, Clone, Default)]
pub struct CancelObserver {
    inner: Option<Arc<Inner>>,
}

impl CancelObserver {
    /// An observer that is never cancelled.
    pub fn never() -> Self {
        Self { inner: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|inner| inner.cancelled.load(Ordering::Acquire))
    }

    /// Fail with [`BridgeError::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> Result<(), BridgeError> {
        if self.is_cancelled() {
            Err(BridgeError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve once cancellation is requested. Never resolves for [`never`](Self::never).
    pub async fn cancelled(&self) {
        let Some(inner) = &self.inner else {
            return futures::future::pending::<()>().await;
        };

        loop {
            let notified = inner.notify.notified();
            if inner.cancelled.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    /// Run `fut` until it completes or cancellation is requested, whichever comes first.
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, BridgeError>
    where
        F: Future<Output = Result<T, BridgeError>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(BridgeError::Cancelled),
            result = fut => result,
        }
    }
}
