//! Error types for the trade engine
//!
//! This module defines every error that can surface from the engine's public
//! operations. Nothing else crosses the boundary: faults inside an exchange
//! are caught and reported as a rollback.
//!
//! # Error Categories
//!
//! - **Validation**: preconditions that failed before anything was mutated,
//!   reported as a list so every issue shows at once
//! - **Execution**: failures in the middle of an exchange; both inventories
//!   were restored from their snapshots
//! - **Configuration**: the location is missing required setup
//! - **Ownership**: failures of the ownership transfer protocol
//! - **Persistence**: ledger and repository failures

use super::location::{LocationId, PartyId};
use super::trade::TradeState;
use thiserror::Error;

/// Why an exchange was rolled back
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RollbackReason {
    /// The party no longer held the payment
    #[error("Failed to take payment from buyer")]
    PaymentUnavailable,

    /// The container did not hold the offered quantity
    #[error("Shop out of stock")]
    OutOfStock,

    /// The container could not take the payment
    #[error("Shop inventory full - cannot accept payment")]
    StorageFull,

    /// The party's inventory disappeared mid-exchange
    #[error("Buyer inventory unavailable")]
    PartyGone,

    /// The location's container disappeared mid-exchange
    #[error("Shop container unavailable")]
    ContainerGone,

    /// Unexpected fault while mutating inventories
    #[error("Unexpected fault: {0}")]
    Fault(String),
}

/// Illegal operations on a trade session's state machine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session already reached a terminal state
    #[error("Trade session is already {state}")]
    Terminal { state: TradeState },

    /// The requested transition is not part of the state machine
    #[error("Cannot move trade session from {from} to {to}")]
    IllegalTransition { from: TradeState, to: TradeState },

    /// Terms were already set and are immutable
    #[error("Trade terms are already set")]
    TermsAlreadySet,
}

/// Failure arm of every trade entry point
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradeError {
    #[error("Trade session not found")]
    SessionNotFound,

    #[error("Trade session expired")]
    SessionExpired,

    #[error("Trade session is no longer active")]
    SessionInactive,

    #[error("Cannot trade with own shop")]
    SelfTrade,

    #[error("Party {party} is not online")]
    PartyOffline { party: PartyId },

    #[error("Shop #{location} not found")]
    LocationNotFound { location: LocationId },

    /// One or more preconditions failed; nothing was mutated
    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    /// The location is missing required setup
    #[error("Shop not configured: {0}")]
    Configuration(String),

    /// The exchange failed part-way and both inventories were restored
    #[error("Trade failed and rolled back: {reason}")]
    RolledBack { reason: RollbackReason },

    #[error("Trade too soon")]
    Debounced,

    #[error("Auto-exchange disabled")]
    AutoExchangeDisabled,

    #[error("Must use an exact multiple of {base}")]
    NotExactMultiple { base: u32 },

    #[error("Payment not accepted")]
    PaymentRejected,

    #[error("Insufficient payment")]
    InsufficientPayment,

    #[error("Item mismatch")]
    ItemMismatch,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Internal error: {0}")]
    Dispatch(#[from] DispatchError),
}

impl TradeError {
    /// Create a RolledBack error
    pub fn rolled_back(reason: RollbackReason) -> Self {
        TradeError::RolledBack { reason }
    }

    /// Create a LocationNotFound error
    pub fn location_not_found(location: LocationId) -> Self {
        TradeError::LocationNotFound { location }
    }

    /// Create a Configuration error
    pub fn configuration(message: &str) -> Self {
        TradeError::Configuration(message.to_string())
    }

    /// Create a NotExactMultiple error
    pub fn not_exact_multiple(base: u32) -> Self {
        TradeError::NotExactMultiple { base }
    }
}

/// Failures of the main-thread task dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The main thread stopped accepting tasks
    #[error("main thread is not running")]
    Closed,

    /// The task was dropped before it produced a result
    #[error("main-thread task aborted before completing")]
    Aborted,

    /// The main thread could not be started
    #[error("failed to start main thread: {0}")]
    Spawn(String),
}

/// Failures of the durable ledger
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("ledger write failed: {0}")]
    Write(String),
}

impl From<csv::Error> for LedgerError {
    fn from(error: csv::Error) -> Self {
        LedgerError::Write(error.to_string())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::Write(error.to_string())
    }
}

/// Failures of the location repository or its live cache
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("repository error: {0}")]
    Backend(String),

    #[error("Shop #{location} not found")]
    Missing { location: LocationId },
}

/// Failures of the ownership transfer protocol
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OwnershipError {
    #[error("No permission to change ownership")]
    PermissionDenied,

    #[error("Shop #{location} not found")]
    LocationNotFound { location: LocationId },

    #[error("New owner is the same as current owner")]
    SameOwner,

    #[error("Database save failed: {0}")]
    Persistence(#[from] RepositoryError),

    /// The live cache could not be reloaded after the write
    #[error(
        "Cache reload failed - {}",
        .rolled_back.then_some("rolled back").unwrap_or("rollback also failed")
    )]
    ReloadFailed { rolled_back: bool },
}
