//! In-memory trade ledger

use crate::core::traits::TradeLedger;
use crate::types::{FailedTrade, LedgerError, TradeRecord};
use futures::future::{self, BoxFuture};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Ledger that keeps every record in memory
///
/// Can be switched into a failing mode to exercise the engine's fallback
/// tracking.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<TradeRecord>>,
    failures: Mutex<Vec<FailedTrade>>,
    failing: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        MemoryLedger::default()
    }

    /// Reject every write while `failing` is set
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Completed trades, in the order they were recorded
    pub fn records(&self) -> Vec<TradeRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rejected and rolled-back attempts
    pub fn failures(&self) -> Vec<FailedTrade> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TradeLedger for MemoryLedger {
    fn record(&self, record: TradeRecord) -> BoxFuture<'_, Result<(), LedgerError>> {
        let result = if self.failing.load(Ordering::SeqCst) {
            Err(LedgerError::Unavailable("ledger offline".to_string()))
        } else {
            self.records
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(record);
            Ok(())
        };
        Box::pin(future::ready(result))
    }

    fn record_failure(&self, failure: FailedTrade) -> BoxFuture<'_, Result<(), LedgerError>> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failure);
        Box::pin(future::ready(Ok(())))
    }
}
