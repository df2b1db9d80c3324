//! Engine configuration

use std::time::Duration;

/// Tunables for the trade engine and its helpers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Fixed lifetime of a trade session
    pub session_timeout: Duration,

    /// Window in which repeated auto-exchange triggers for the same
    /// (party, location) pair are ignored
    pub debounce_window: Duration,

    /// Number of lock stripes for ownership transfers
    pub lock_stripes: usize,

    /// Consecutive ledger failures before entering fallback mode
    pub ledger_max_failures: u32,

    /// How long fallback mode lasts
    pub ledger_recovery_window: Duration,

    /// Interval of the expired-session sweep
    pub sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(5 * 60),
            debounce_window: Duration::from_millis(500),
            lock_stripes: 64,
            ledger_max_failures: 3,
            ledger_recovery_window: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Create an EngineConfig with custom values
    ///
    /// Zero values are invalid and fall back to the defaults with a warning.
    pub fn new(
        session_timeout: Duration,
        debounce_window: Duration,
        lock_stripes: usize,
        ledger_max_failures: u32,
        ledger_recovery_window: Duration,
        sweep_interval: Duration,
    ) -> Self {
        let default = Self::default();

        Self {
            session_timeout: non_zero("session_timeout", session_timeout, default.session_timeout),
            debounce_window: non_zero("debounce_window", debounce_window, default.debounce_window),
            lock_stripes: non_zero("lock_stripes", lock_stripes, default.lock_stripes),
            ledger_max_failures: non_zero(
                "ledger_max_failures",
                ledger_max_failures,
                default.ledger_max_failures,
            ),
            ledger_recovery_window: non_zero(
                "ledger_recovery_window",
                ledger_recovery_window,
                default.ledger_recovery_window,
            ),
            sweep_interval: non_zero("sweep_interval", sweep_interval, default.sweep_interval),
        }
    }
}

fn non_zero<T>(field: &str, value: T, default: T) -> T
where
    T: PartialEq + Default + std::fmt::Debug,
{
    if value == T::default() {
        tracing::warn!(
            "Invalid {} ({:?}), using default ({:?})",
            field,
            value,
            default
        );
        default
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.session_timeout, Duration::from_secs(300));
        assert_eq!(config.debounce_window, Duration::from_millis(500));
        assert_eq!(config.lock_stripes, 64);
        assert_eq!(config.ledger_max_failures, 3);
    }

    #[test]
    fn test_zero_values_fall_back_to_defaults() {
        let config = EngineConfig::new(
            Duration::ZERO,
            Duration::from_millis(100),
            0,
            0,
            Duration::from_secs(5),
            Duration::ZERO,
        );

        let default = EngineConfig::default();
        assert_eq!(config.session_timeout, default.session_timeout);
        assert_eq!(config.debounce_window, Duration::from_millis(100));
        assert_eq!(config.lock_stripes, default.lock_stripes);
        assert_eq!(config.ledger_max_failures, default.ledger_max_failures);
        assert_eq!(config.ledger_recovery_window, Duration::from_secs(5));
        assert_eq!(config.sweep_interval, default.sweep_interval);
    }
}
