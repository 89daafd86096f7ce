//! Lock-free state shared between the engines and the controller.
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

/// How long a throttled sender sleeps between checks for a counter reset.
const THROTTLE_POLL: Duration = Duration::from_millis(1);

/// "Probes sent" and "replies received" for the current stats interval.
///
/// Engines increment, the controller drains both once per interval. Every
/// operation is a single atomic read-modify-write, so no increment is lost
/// between a concurrent add and a reset.
#[derive(Debug, Default)]
pub struct Counters {
    sent: AtomicU32,
    received: AtomicU32,
}

impl Counters {
    pub const fn new() -> Self {
        Self {
            sent: AtomicU32::new(0),
            received: AtomicU32::new(0),
        }
    }

    /// Counts one probe and returns the count after the increment.
    pub fn record_sent(&self) -> u32 {
        self.sent.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    pub fn record_received(&self) -> u32 {
        self.received.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    pub fn sent(&self) -> u32 {
        self.sent.load(Ordering::Acquire)
    }

    /// Reads and resets the sent counter in one step.
    pub fn take_sent(&self) -> u32 {
        self.sent.swap(0, Ordering::AcqRel)
    }

    /// Reads and resets the received counter in one step.
    pub fn take_received(&self) -> u32 {
        self.received.swap(0, Ordering::AcqRel)
    }
}

/// One-shot signal from the send engine that the target space is exhausted.
#[derive(Debug, Default)]
pub struct CompletionFlag(AtomicBool);

impl CompletionFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn set(&self) {
        let was_set = self.0.swap(true, Ordering::Release);
        debug_assert!(!was_set, "completion flag set twice");
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Bounds the probes sent between two resets of the shared sent counter.
///
/// The controller resets the counter once per stats interval, so a ceiling
/// of `rate × interval` yields the configured rate on average. Pacing is
/// bursty inside an interval: the sender runs flat out until it reaches the
/// ceiling, then sleeps until the next reset.
#[derive(Debug)]
pub struct RateLimiter<'a> {
    counters: &'a Counters,
    ceiling: u32,
}

impl<'a> RateLimiter<'a> {
    pub const fn new(counters: &'a Counters, ceiling: u32) -> Self {
        Self { counters, ceiling }
    }

    /// Counts one sent probe, blocking while the interval's budget is spent.
    pub fn record_send(&self) {
        if self.counters.record_sent() >= self.ceiling {
            while self.counters.sent() != 0 {
                thread::sleep(THROTTLE_POLL);
            }
        }
    }

    pub const fn ceiling(&self) -> u32 {
        self.ceiling
    }
}
