//! Time and iteration budgets for detectors
//!
//! A run has one [`CancelToken`] and one overall deadline. Each detector
//! gets its own [`Budget`]: an iteration cap plus a fixed slice of the
//! deadline, never reaching past the overall deadline. Exhausting a budget
//! is not an error; the detector stops and reports itself truncated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Wall clock is consulted once per this many ticks
const CLOCK_CHECK_INTERVAL: u64 = 256;

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create new token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every budget observing this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Deadline shared by all detectors of one run
#[derive(Debug, Clone)]
pub struct Deadline {
    started: Instant,
    total: Duration,
    cancel: CancelToken,
}

impl Deadline {
    /// Deadline `total` from now
    pub fn new(total: Duration, cancel: CancelToken) -> Self {
        Self {
            started: Instant::now(),
            total,
            cancel,
        }
    }

    /// Overall expiry instant
    pub fn expires_at(&self) -> Instant {
        self.started + self.total
    }

    /// Budget for one detector: `share` of the deadline, counted from now
    pub fn slice(&self, share: f64, max_iterations: u64) -> Budget {
        let now = Instant::now();
        let slice_end = now + self.total.mul_f64(share.clamp(0.0, 1.0));
        Budget {
            expires_at: slice_end.min(self.expires_at()),
            max_iterations,
            iterations: 0,
            exhausted: false,
            cancel: self.cancel.clone(),
        }
    }
}

/// Per-detector budget
#[derive(Debug)]
pub struct Budget {
    expires_at: Instant,
    max_iterations: u64,
    iterations: u64,
    exhausted: bool,
    cancel: CancelToken,
}

impl Budget {
    /// Budget with only an iteration cap
    pub fn iterations(max_iterations: u64) -> Self {
        Self {
            expires_at: Instant::now() + Duration::from_secs(60 * 60 * 24 * 365),
            max_iterations,
            iterations: 0,
            exhausted: false,
            cancel: CancelToken::new(),
        }
    }

    /// Unlimited budget
    pub fn unlimited() -> Self {
        Self::iterations(u64::MAX)
    }

    /// Account for one unit of work; returns `false` once the budget is spent
    ///
    /// Once spent, the budget stays spent.
    pub fn tick(&mut self) -> bool {
        if self.exhausted {
            return false;
        }

        self.iterations += 1;
        if self.iterations > self.max_iterations {
            self.exhausted = true;
            return false;
        }

        if self.iterations % CLOCK_CHECK_INTERVAL == 0
            && (self.cancel.is_cancelled() || Instant::now() >= self.expires_at)
        {
            self.exhausted = true;
            return false;
        }

        true
    }

    /// Whether the budget ran out
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Units of work consumed
    pub fn used(&self) -> u64 {
        self.iterations.min(self.max_iterations)
    }
}
