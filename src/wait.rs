//! Bounded-wait polling shared by every wait in the run.
use std::{
    thread,
    time::{Duration, Instant},
};

use tracing::debug;

/// Step interval and total bound for a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poll {
    /// Delay between predicate evaluations.
    pub step: Duration,
    /// Total time after which the wait gives up.
    pub timeout: Duration,
}

impl Poll {
    pub const fn new(step: Duration, timeout: Duration) -> Self {
        Self { step, timeout }
    }

    /// Evaluates `predicate` immediately and then every `step` until it returns
    /// `true` or `timeout` elapses. Returns whether the predicate ever held.
    pub fn wait<F>(&self, text: &str, mut predicate: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + self.timeout;
        let mut attempt = 1u32;

        loop {
            if predicate() {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("{text} gave up after {attempt} attempt(s)");
                return false;
            }

            debug!("{text} (attempt {attempt}, retrying in {:?})", self.step);
            thread::sleep(self.step.min(deadline - now));
            attempt += 1;
        }
    }

    /// Same as [`Poll::wait`], but maps a timeout to the caller's named error.
    pub fn wait_or<F, E, G>(&self, text: &str, predicate: F, err: G) -> Result<(), E>
    where
        F: FnMut() -> bool,
        G: FnOnce() -> E,
    {
        if self.wait(text, predicate) {
            Ok(())
        } else {
            Err(err())
        }
    }
}
