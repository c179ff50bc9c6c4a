use std::thread;
use std::time::{Duration, Instant};

/// Granularity of [Timeout::run].
const SLICE: Duration = Duration::from_millis(1);

/// A deadline for polling loops.
pub struct Timeout {
    deadline: Instant,
}

impl Timeout {
    pub fn new(duration: Duration) -> Self {
        Self {
            deadline: Instant::now() + duration,
        }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Sleeps for a short slice and returns `Ok`, or returns `Err` once the deadline has passed.
    ///
    /// Meant to be called in a loop that re-checks some condition on every iteration.
    pub fn run(&self) -> Result<(), ()> {
        let remaining = self.remaining();
        if remaining.is_zero() {
            return Err(());
        }
        thread::sleep(remaining.min(SLICE));
        Ok(())
    }
}
