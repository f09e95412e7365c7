use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A timer slot polled by the control loop instead of a self-rescheduling
/// callback.
#[derive(Clone, Debug)]
pub struct ScheduledTask {
    due: Instant,
    cancel: CancelToken,
}

impl ScheduledTask {
    pub fn new(due: Instant) -> Self {
        Self {
            due,
            cancel: CancelToken::new(),
        }
    }

    pub fn due(&self) -> Instant {
        self.due
    }

    pub fn is_due(&self, now: Instant) -> bool {
        !self.cancel.is_cancelled() && now >= self.due
    }

    pub fn overshoot(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.due)
    }

    pub fn reschedule(&mut self, due: Instant) {
        self.due = due;
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
