//! In-memory collaborators
//!
//! - `registry` - Durable location records and their live cache
//! - `ledger` - Trade ledger kept in memory
//! - `permissions` - Static permission gate and auto-exchange opt-outs

pub mod ledger;
pub mod permissions;
pub mod registry;

pub use ledger::MemoryLedger;
pub use permissions::{AutoExchangeOptOut, StaticPermissions};
pub use registry::ShopRegistry;
