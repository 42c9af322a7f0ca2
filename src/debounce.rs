use std::time::{Duration, Instant};

struct Pending<T> {
    value: T,
    due: Instant,
}

/// Holds back a rapidly changing value until it has been quiet for `delay`.
///
/// The debouncer owns no timer thread. The caller passes the current time in
/// and polls with [`Debouncer::take_if_elapsed`] from its event loop.
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<Pending<T>>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn schedule(&mut self, value: T, now: Instant) {
        self.schedule_after(value, self.delay, now);
    }

    /// Replaces any pending value and restarts the quiet period.
    pub fn schedule_after(&mut self, value: T, delay: Duration, now: Instant) {
        self.pending = Some(Pending {
            value,
            due: now + delay,
        });
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|p| p.value)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due)
    }

    pub fn take_if_elapsed(&mut self, now: Instant) -> Option<T> {
        if self.pending.as_ref().is_some_and(|p| now >= p.due) {
            self.cancel()
        } else {
            None
        }
    }
}
