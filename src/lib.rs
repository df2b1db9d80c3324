//! Barter Trade Engine Library
//! # Overview
//!
//! This library executes item-for-item trades between parties and storage
//! locations ("shops") in a live, main-thread-owned world. Every trade either
//! completes fully or leaves both inventories exactly as they were.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Value types (items, inventories, locations, trade records, errors)
//! - [`core`] - Business logic components:
//!   - [`core::engine`] - Session registry and the trade pipeline
//!   - [`core::exchange`] - The atomic exchange with snapshot rollback
//!   - [`core::auto_exchange`] - Deposit and withdrawal triggers
//!   - [`core::ownership`] - Serialized ownership transfers
//!   - [`core::dispatch`] - Marshaling onto the world-owning main thread
//! - [`world`] - The live world the engine trades in, plus an in-memory one
//! - [`store`] - In-memory location registry, ledger and permissions
//! - [`io`] - Scenario reader, CSV ledger and holdings report
//! - [`replay`] - Drives a scenario file through the engine
//! - [`cli`] - CLI argument parsing
//!
//! # Entry Points
//!
//! Five kinds of trade reach the same pipeline:
//!
//! - **Confirmed dialog**: initiate a session, set and confirm terms, execute
//! - **Instant purchase**: payment in hand, no stored session
//! - **Deposit trigger**: an accepted payment placed into the container
//! - **Withdrawal trigger**: the offering taken out of the container
//! - **Admin override**: delivery without payment
//!
//! # Exchange Guarantees
//!
//! - Validation runs on the main thread before anything is mutated
//! - Payment collection, stock removal and payment deposit roll back on failure
//! - Delivery never fails: overflow is dropped at the party's position
//! - A completed trade is recorded in the ledger without waiting for it

// Module declarations
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod replay;
pub mod store;
pub mod types;
pub mod world;

pub use config::EngineConfig;
pub use core::{AutoExchangeHandler, MainThread, OwnershipCoordinator, TradeEngine, TradeRequest};
pub use io::write_holdings_csv;
pub use types::{
    ItemStack, Location, LocationId, OwnershipError, PartyId, Payment, TradeError, TradeReceipt,
    TradeResult, TradeSource, TradeState,
};
pub use world::{InMemoryWorld, World};
