//! The live world the engine trades in
//!
//! Party inventories, location containers, ground drops and player-facing
//! messages all belong to the host's main thread. The engine never touches a
//! `World` directly: it posts closures to the
//! [`MainThread`](crate::core::dispatch::MainThread) that owns it.
//!
//! - `memory`: an in-memory world used by the replay binary and tests

pub mod memory;

pub use memory::{Holder, Holding, InMemoryWorld};

use crate::types::{
    Inventory, ItemStack, Location, LocationId, PartyId, Position, TradeSource, TransactionId,
};
use std::fmt;

/// Message delivered to a party
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    TradeCompleted {
        transaction_id: TransactionId,
        source: TradeSource,
    },

    TradeFailed {
        reason: String,
    },

    /// Delivered items did not fit and were dropped at the party's feet
    ItemsDropped {
        quantity: u32,
    },

    /// An ownership change cancelled the party's trade
    OwnershipChanged {
        location: LocationId,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::TradeCompleted { transaction_id, .. } => {
                write!(f, "Trade completed (#{})", transaction_id)
            }
            Notice::TradeFailed { reason } => write!(f, "Trade failed: {}", reason),
            Notice::ItemsDropped { quantity } => {
                write!(f, "Inventory full - {} items dropped at your feet", quantity)
            }
            Notice::OwnershipChanged { .. } => {
                f.write_str("Shop ownership changed - trade cancelled")
            }
        }
    }
}

/// Main-thread-owned live state
///
/// Implementations are moved onto the main thread once and only ever
/// accessed from there, so they need `Send` but not `Sync`.
pub trait World: Send + 'static {
    /// Whether the party is online and present
    fn is_online(&self, party: PartyId) -> bool;

    fn party_inventory(&self, party: PartyId) -> Option<&Inventory>;

    fn party_inventory_mut(&mut self, party: PartyId) -> Option<&mut Inventory>;

    /// Where overflow for this party is dropped
    fn party_position(&self, party: PartyId) -> Option<Position>;

    /// Backing container of a location, if it has one
    fn container(&self, location: LocationId) -> Option<&Inventory>;

    fn container_mut(&mut self, location: LocationId) -> Option<&mut Inventory>;

    /// Drop a stack on the ground at `at`
    fn drop_item(&mut self, at: Position, item: ItemStack);

    fn notify(&mut self, party: PartyId, notice: Notice);

    /// Redraw the location's interactive marker
    fn refresh_marker(&mut self, location: &Location);
}
