//! Operation-scoped execution lock for mutating fund operations.
//!
//! The lock is a flag raised for the whole of one mutating operation. Any
//! mutating call that arrives while it is raised fails with
//! [`FundError::Reentrant`], whichever thread makes it: a trade executor or
//! custody that calls back into `deposit` directly, or hands the call to a
//! worker thread, is rejected rather than left waiting on the operation that
//! is calling it. Callers sharing one fund across threads retry on
//! `Reentrant`.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{FundError, Result};

#[derive(Default)]
pub(crate) struct ExecutionLock {
    held: AtomicBool,
}

/// Held for the duration of one mutating operation. Dropping it releases the
/// lock on every exit path.
pub(crate) struct OperationGuard<'a> {
    lock: &'a ExecutionLock,
}

impl ExecutionLock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn enter(&self) -> Result<OperationGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| FundError::Reentrant)?;
        Ok(OperationGuard { lock: self })
    }

    /// Whether an operation currently holds the lock.
    pub(crate) fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}
