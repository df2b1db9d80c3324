//! Collaborator traits
//!
//! The engine consumes everything outside its own scope (location lookup,
//! durable storage, the ledger, permissions, per-party preferences) through
//! these seams. Async operations return `BoxFuture` so the traits stay
//! object-safe and can be held as `Arc<dyn ...>`.

use crate::types::{
    FailedTrade, LedgerError, Location, LocationId, PartyId, RepositoryError, TradeRecord,
};
use futures::future::{self, BoxFuture};
use std::sync::Arc;

/// Live, cached view of storage locations
pub trait LocationDirectory: Send + Sync {
    /// Current live representation of a location
    fn resolve(&self, location: LocationId) -> Option<Arc<Location>>;
}

/// Durable location records
pub trait LocationRepository: Send + Sync {
    fn find_by_id(
        &self,
        location: LocationId,
    ) -> BoxFuture<'_, Result<Option<Location>, RepositoryError>>;

    fn save(&self, location: Location) -> BoxFuture<'_, Result<(), RepositoryError>>;
}

/// Rebuilds the live representation of a location from its durable record
pub trait LocationCache: Send + Sync {
    fn reload(&self, location: LocationId) -> BoxFuture<'_, Result<Arc<Location>, RepositoryError>>;
}

/// Durable trade ledger
///
/// Writes are fire-and-forget from the engine's point of view: a failure is
/// logged and tracked, never unwound.
pub trait TradeLedger: Send + Sync {
    fn record(&self, record: TradeRecord) -> BoxFuture<'_, Result<(), LedgerError>>;

    /// Analytics hook for rejected and rolled-back attempts
    fn record_failure(&self, _failure: FailedTrade) -> BoxFuture<'_, Result<(), LedgerError>> {
        Box::pin(future::ready(Ok(())))
    }
}

/// Who asked for an administrative operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Initiator {
    /// Server console; always permitted
    Console,
    Party(PartyId),
}

/// Permission checks for administrative operations
pub trait PermissionGate: Send + Sync {
    fn can_transfer_ownership(&self, initiator: Initiator, location: LocationId) -> bool;
}

/// Per-party auto-exchange opt-out
pub trait AutoExchangePreferences: Send + Sync {
    fn is_enabled(&self, party: PartyId) -> bool;
}
