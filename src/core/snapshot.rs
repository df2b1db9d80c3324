//! Inventory snapshots
//!
//! The rollback primitive: a deep copy of every slot taken at one instant,
//! restored wholesale when an exchange has to be undone.

use crate::types::{Inventory, ItemStack};

/// Point-in-time copy of an inventory's slots
///
/// Immutable once captured. Restoring is total: whatever the inventory holds
/// at restore time is discarded, not merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventorySnapshot {
    contents: Vec<Option<ItemStack>>,
}

impl InventorySnapshot {
    /// Deep-copy every slot of `inventory`
    pub fn capture(inventory: &Inventory) -> Self {
        InventorySnapshot {
            contents: inventory.slots().to_vec(),
        }
    }

    /// Replace the contents of `inventory` with the captured slots
    pub fn restore(&self, inventory: &mut Inventory) {
        inventory.set_contents(self.contents.clone());
    }

    pub fn size(&self) -> usize {
        self.contents.len()
    }

    /// Whether `inventory` currently matches this snapshot slot for slot
    pub fn matches(&self, inventory: &Inventory) -> bool {
        self.contents.as_slice() == inventory.slots()
    }
}
