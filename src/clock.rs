//! Where time comes from.
//!
//! The engine never asks the system for the time directly, it asks a
//! [Clock]. Tests use a [TestClock] so timestamps come out the same every run.

use crate::util::Timestamp;
use std::sync::atomic::{AtomicI64, Ordering};

/// A source of timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A deterministic clock. Starts at 1234567890000 ms and every call to
/// [now][Clock::now] moves it forward by one millisecond before returning, so
/// the first timestamp handed out is 1234567890001.
#[derive(Debug)]
pub struct TestClock {
    millis: AtomicI64,
}

impl TestClock {
    pub const START: i64 = 1234567890000;

    pub fn new() -> Self {
        Self::starting_at(Self::START)
    }

    pub fn starting_at(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    /// Jump ahead (or back) by some number of milliseconds without handing out
    /// a timestamp.
    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
