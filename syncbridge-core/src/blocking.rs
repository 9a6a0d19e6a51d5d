//! Drive a future to completion from synchronous code.

use std::future::Future;

use tokio::runtime::{Handle, RuntimeFlavor};

use crate::BridgeError;

/// Block the current thread until `fut` completes on the runtime behind `handle`.
///
/// Works from plain threads and from worker threads of a multi-thread runtime
/// (the worker is handed off with [`tokio::task::block_in_place`] first).
///
/// # Errors
///
/// Fails with [`BridgeError::InvalidConfiguration`] when called from inside a
/// current-thread runtime, because that runtime cannot make progress while
/// its only thread is blocked.
pub fn block_on<F>(handle: &Handle, fut: F) -> Result<F::Output, BridgeError>
where
    F: Future,
{
    match Handle::try_current().map(|current| current.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => {
            Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
        }
        Ok(RuntimeFlavor::CurrentThread) => Err(BridgeError::InvalidConfiguration(
            "blocking read inside a current-thread runtime".into(),
        )),
        _ => Ok(handle.block_on(fut)),
    }
}
