//! Cancellable handle to the outcome of a bridged call.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use syncbridge_core::{BridgeError, CancelToken, ExternalResponse};
use tokio::runtime::Handle;
use tokio::sync::Notify;

/// Lifecycle of one bridged call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// Spawned, the task has not started yet.
    Pending,
    /// The task is executing.
    Running,
    /// Settled with a response.
    Resolved,
    /// Settled with an error from the task.
    Rejected,
    /// Cancelled by the caller before the task settled.
    Cancelled,
}

impl CallPhase {
    pub fn is_terminal(self) -> bool {
        !matches!(self, CallPhase::Pending | CallPhase::Running)
    }
}

type Outcome = Result<ExternalResponse, BridgeError>;

#[derive(Debug)]
struct Slot {
    phase: CallPhase,
    outcome: Option<Outcome>,
}

/// State shared between a spawned call and its [`ResponseHandle`].
#[derive(Debug)]
pub(crate) struct CallState {
    slot: Mutex<Slot>,
    settled: Notify,
}

impl CallState {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                phase: CallPhase::Pending,
                outcome: None,
            }),
            settled: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pending → Running. Returns false if the call was already cancelled.
    pub(crate) fn start(&self) -> bool {
        let mut slot = self.lock();
        if slot.phase == CallPhase::Pending {
            slot.phase = CallPhase::Running;
        }
        slot.phase == CallPhase::Running
    }

    /// Record the task outcome unless the caller cancelled first.
    pub(crate) fn settle(&self, outcome: Outcome) {
        let mut slot = self.lock();
        if slot.phase.is_terminal() {
            #[cfg(feature = "tracing")]
            tracing::debug!(phase = ?slot.phase, "dropping outcome of settled call");
            return;
        }

        slot.phase = match &outcome {
            Ok(_) => CallPhase::Resolved,
            Err(_) => CallPhase::Rejected,
        };
        slot.outcome = Some(outcome);
        drop(slot);
        self.settled.notify_waiters();
    }

    /// Mark the call cancelled if it has not settled yet.
    fn cancel(&self) -> bool {
        let mut slot = self.lock();
        if slot.phase.is_terminal() {
            return false;
        }

        slot.phase = CallPhase::Cancelled;
        slot.outcome = Some(Err(BridgeError::Cancelled));
        drop(slot);
        self.settled.notify_waiters();
        true
    }

    fn phase(&self) -> CallPhase {
        self.lock().phase
    }

    async fn wait(&self) -> Outcome {
        loop {
            let notified = self.settled.notified();
            let outcome = self.lock().outcome.clone();
            if let Some(outcome) = outcome {
                return outcome;
            }
            notified.await;
        }
    }
}

/// Promise-like handle returned by [`BridgeHandler::invoke`](crate::BridgeHandler::invoke).
///
/// Await it from async code or call [`wait`](Self::wait) from blocking code.
/// Waiting more than once returns the same outcome; responses share their body.
#[derive(Debug)]
pub struct ResponseHandle {
    state: Arc<CallState>,
    token: CancelToken,
    runtime: Handle,
}

impl ResponseHandle {
    pub(crate) fn new(state: Arc<CallState>, token: CancelToken, runtime: Handle) -> Self {
        Self {
            state,
            token,
            runtime,
        }
    }

    pub fn phase(&self) -> CallPhase {
        self.state.phase()
    }

    /// Cancel the call.
    ///
    /// The cancel token is always signaled, which also stops a streamed
    /// response body. The outcome only becomes [`BridgeError::Cancelled`] if
    /// the call had not settled yet; the return value tells whether it did.
    pub fn cancel(&self) -> bool {
        let cancelled = self.state.cancel();
        self.token.cancel();
        if cancelled {
            #[cfg(feature = "tracing")]
            tracing::debug!("call cancelled by caller");
        }
        cancelled
    }

    /// Block the current thread until the call settles.
    ///
    /// # Errors
    ///
    /// Besides the call's own outcome, fails with
    /// [`BridgeError::InvalidConfiguration`] when called from inside a
    /// current-thread tokio runtime; await the handle there instead.
    pub fn wait(&self) -> Result<ExternalResponse, BridgeError> {
        syncbridge_core::blocking::block_on(&self.runtime, self.state.wait())?
    }
}

impl IntoFuture for ResponseHandle {
    type Output = Result<ExternalResponse, BridgeError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.state.wait().await })
    }
}
