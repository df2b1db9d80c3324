//! Types module
//!
//! Contains the value types used throughout the engine.
//! This module organizes types into logical submodules:
//! - `item`: Item stacks and slot-based inventories
//! - `location`: Storage locations, their offerings and payment terms
//! - `trade`: Trade sources, states, payments, receipts and ledger records
//! - `error`: Error types for the trade engine

pub mod error;
pub mod item;
pub mod location;
pub mod trade;

pub use error::{
    DispatchError, LedgerError, OwnershipError, RepositoryError, RollbackReason, SessionError,
    TradeError,
};
pub use item::{Inventory, ItemStack, DEFAULT_MAX_STACK};
pub use location::{
    AcceptedPayment, Location, LocationId, PartyId, PaymentTerms, Position, Stock,
};
pub use trade::{
    FailedTrade, Payment, Settlement, TradeReceipt, TradeRecord, TradeResult, TradeSource,
    TradeState, TradeStatus, TransactionId,
};
