//! Ledger failure tracking
//!
//! Counts consecutive ledger failures. After `max_failures` in a row the
//! tracker enters fallback mode, which lasts until the recovery window has
//! elapsed or a write succeeds again. Exchanges keep running either way;
//! fallback mode only surfaces the durability gap through the health
//! accessors.

use crate::core::clock::{duration_millis, Timestamp};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Sentinel meaning "not in fallback"
const NOT_IN_FALLBACK: Timestamp = 0;

#[derive(Debug)]
pub struct FallbackTracker {
    max_failures: u32,
    recovery_window: u64,
    failures: AtomicU32,
    fallback_since: AtomicU64,
}

impl FallbackTracker {
    pub fn new(max_failures: u32, recovery_window: Duration) -> Self {
        FallbackTracker {
            max_failures: max_failures.max(1),
            recovery_window: duration_millis(recovery_window),
            failures: AtomicU32::new(0),
            fallback_since: AtomicU64::new(NOT_IN_FALLBACK),
        }
    }

    /// Record a failed ledger write at `now`
    pub fn record_failure(&self, now: Timestamp, reason: &str) {
        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::warn!(
            failures,
            max_failures = self.max_failures,
            reason,
            "ledger failure recorded"
        );

        if failures >= self.max_failures {
            let entered = self
                .fallback_since
                .compare_exchange(
                    NOT_IN_FALLBACK,
                    now.max(1),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok();
            if entered {
                tracing::warn!(
                    recovery_ms = self.recovery_window,
                    reason,
                    "entering ledger fallback mode"
                );
            }
        }
    }

    /// Record a successful ledger write
    pub fn record_success(&self) {
        let previous = self.failures.swap(0, Ordering::SeqCst);
        if previous > 0 {
            tracing::debug!(previous, "ledger write succeeded, failure count reset");
        }
        if self.fallback_since.swap(NOT_IN_FALLBACK, Ordering::SeqCst) != NOT_IN_FALLBACK {
            tracing::info!("ledger recovered, leaving fallback mode");
        }
    }

    /// Whether the tracker is in fallback mode at `now`
    ///
    /// Leaves fallback mode once the recovery window has elapsed.
    pub fn is_in_fallback(&self, now: Timestamp) -> bool {
        let since = self.fallback_since.load(Ordering::SeqCst);
        if since == NOT_IN_FALLBACK {
            return false;
        }

        if now.saturating_sub(since) > self.recovery_window {
            tracing::info!("fallback recovery window elapsed, resuming normal operation");
            self.reset();
            return false;
        }
        true
    }

    /// Time left in fallback mode; zero when not in fallback
    pub fn time_until_recovery(&self, now: Timestamp) -> Duration {
        let since = self.fallback_since.load(Ordering::SeqCst);
        if since == NOT_IN_FALLBACK {
            return Duration::ZERO;
        }
        let elapsed = now.saturating_sub(since);
        Duration::from_millis(self.recovery_window.saturating_sub(elapsed))
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.failures.store(0, Ordering::SeqCst);
        self.fallback_since.store(NOT_IN_FALLBACK, Ordering::SeqCst);
    }
}
