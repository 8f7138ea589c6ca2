//! Admission control against the hardware's pool of output buffers.
//!
//! Every submitted frame may occupy one output buffer until the display side
//! hands it back, so submission takes a credit and either the decode path
//! (no picture produced) or the display path (picture returned) gives it back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::{Error, Result};

#[derive(Debug)]
struct State {
    credits: usize,
    closed: bool,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    available: Condvar,
}

/// Counting semaphore sized to the number of hardware output buffers.
///
/// Cloning yields another handle to the same gate, so the submission thread
/// and the display thread can each hold one.
#[derive(Debug, Clone)]
pub struct CreditGate {
    inner: Arc<Inner>,
}

impl CreditGate {
    pub fn new(credits: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    credits,
                    closed: false,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// Block until a credit is free, then take it.
    ///
    /// Returns `Cancelled` if the gate is closed before or during the wait.
    pub fn acquire(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        loop {
            if state.closed {
                return Err(Error::Cancelled);
            }
            if state.credits > 0 {
                state.credits -= 1;
                trace!(remaining = state.credits, "acquired output credit");
                return Ok(());
            }
            self.inner.available.wait(&mut state);
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up with `CreditTimeout`
    /// once `timeout` has elapsed.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            if state.closed {
                return Err(Error::Cancelled);
            }
            if state.credits > 0 {
                state.credits -= 1;
                trace!(remaining = state.credits, "acquired output credit");
                return Ok(());
            }
            if self
                .inner
                .available
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                // a release may have raced the timeout
                if !state.closed && state.credits > 0 {
                    state.credits -= 1;
                    return Ok(());
                }
                return Err(if state.closed {
                    Error::Cancelled
                } else {
                    Error::CreditTimeout
                });
            }
        }
    }

    /// Take a credit if one is free without blocking.
    pub fn try_acquire(&self) -> Result<bool> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(Error::Cancelled);
        }
        if state.credits == 0 {
            return Ok(false);
        }
        state.credits -= 1;
        Ok(true)
    }

    /// Return one credit and wake a single waiter.
    pub fn release(&self) {
        let mut state = self.inner.state.lock();
        state.credits += 1;
        trace!(available = state.credits, "released output credit");
        drop(state);
        self.inner.available.notify_one();
    }

    /// Run `f` and return one credit while holding the gate lock.
    ///
    /// Fails with `Closed` without running `f` once the gate is closed, so `f`
    /// never overlaps or follows [`close`](Self::close).
    pub fn release_with(&self, f: impl FnOnce()) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(Error::Closed);
        }
        f();
        state.credits += 1;
        trace!(available = state.credits, "released output credit");
        drop(state);
        self.inner.available.notify_one();
        Ok(())
    }

    /// Fail every current and future wait with `Cancelled`.
    ///
    /// Waits for an in-flight [`release_with`](Self::release_with) to finish.
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    pub fn available(&self) -> usize {
        self.inner.state.lock().credits
    }
}
