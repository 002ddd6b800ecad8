//! Idle timers for the stream batcher.
//!
//! The batcher never talks to the tokio clock directly. It goes through
//! [`IdleTimer`] so tests can substitute [`ManualTimer`] and fire the flush
//! by hand instead of sleeping.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use tokio::time::{Instant, Sleep};

/// One-shot timer re-armed on every incoming chunk.
pub trait IdleTimer {
    /// Arm the timer to expire `period` from now.
    fn schedule(&mut self, period: Duration);

    /// Disarm any pending expiry. Calling this with nothing armed is fine.
    fn cancel(&mut self);

    /// Poll the armed timer. Returns `Ready` once and disarms itself;
    /// stays `Pending` while nothing is armed.
    fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<()>;
}

/// Default timer backed by `tokio::time::Sleep`.
#[derive(Debug, Default)]
pub struct TokioTimer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl TokioTimer {
    /// Create a disarmed timer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdleTimer for TokioTimer {
    fn schedule(&mut self, period: Duration) {
        let deadline = Instant::now() + period;
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => self.sleep = Some(Box::pin(tokio::time::sleep_until(deadline))),
        }
    }

    fn cancel(&mut self) {
        self.sleep = None;
    }

    fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let Some(sleep) = self.sleep.as_mut() else {
            return Poll::Pending;
        };
        match sleep.as_mut().poll(cx) {
            Poll::Ready(()) => {
                self.sleep = None;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[derive(Debug, Default)]
struct ManualState {
    armed: Option<Duration>,
    fired: bool,
    scheduled: Vec<Duration>,
    cancels: usize,
    waker: Option<Waker>,
}

/// Hand-driven timer for deterministic tests.
///
/// Clones share state: keep one clone in the test, hand the other to the
/// batcher, then inspect the recorded calls and call [`fire`](Self::fire)
/// to emulate the idle period elapsing.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    state: Arc<Mutex<ManualState>>,
}

impl ManualTimer {
    /// Create a disarmed timer with no recorded calls.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Expire the armed timer. Returns `false` if nothing was armed.
    pub fn fire(&self) -> bool {
        let mut state = self.state();
        if state.armed.is_none() {
            return false;
        }
        state.fired = true;
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
        true
    }

    /// Whether a timer is currently armed.
    pub fn is_armed(&self) -> bool {
        self.state().armed.is_some()
    }

    /// Periods passed to every `schedule` call so far.
    pub fn scheduled(&self) -> Vec<Duration> {
        self.state().scheduled.clone()
    }

    /// Number of `cancel` calls so far.
    pub fn cancels(&self) -> usize {
        self.state().cancels
    }

    /// Forget recorded calls, keeping the armed state.
    pub fn reset_calls(&self) {
        let mut state = self.state();
        state.scheduled.clear();
        state.cancels = 0;
    }
}

impl IdleTimer for ManualTimer {
    fn schedule(&mut self, period: Duration) {
        let mut state = self.state();
        state.armed = Some(period);
        state.fired = false;
        state.scheduled.push(period);
    }

    fn cancel(&mut self) {
        let mut state = self.state();
        state.armed = None;
        state.fired = false;
        state.cancels += 1;
    }

    fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.state();
        if state.armed.is_some() && state.fired {
            state.armed = None;
            state.fired = false;
            return Poll::Ready(());
        }
        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}
