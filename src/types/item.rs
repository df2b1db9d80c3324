//! Item and inventory types
//!
//! This module defines the item descriptor (`ItemStack`) and the slot-based
//! container (`Inventory`) that both parties and storage locations hold.
//!
//! All quantity math is stack-aware: counting, free-space and removal match
//! stacks by the similarity predicate, never by slot identity.

use serde::{Deserialize, Serialize};

/// Default maximum stack size for items that do not override it
pub const DEFAULT_MAX_STACK: u32 = 64;

/// An item descriptor with a quantity
///
/// Two stacks are *similar* when they describe the same kind of item with the
/// same display name; the amount and the stack limit do not take part in the
/// comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    /// Item kind, e.g. `DIAMOND` or `OAK_LOG`
    pub kind: String,

    /// Optional custom display name
    pub display_name: Option<String>,

    /// Number of items in this stack
    pub amount: u32,

    /// Largest amount a single slot can hold for this item
    pub max_stack: u32,
}

impl ItemStack {
    /// Create a stack of `amount` items of `kind` with the default stack limit
    pub fn new(kind: impl Into<String>, amount: u32) -> Self {
        ItemStack {
            kind: kind.into(),
            display_name: None,
            amount,
            max_stack: DEFAULT_MAX_STACK,
        }
    }

    /// Override the stack limit (e.g. 16 for ender pearls, 1 for tools)
    pub fn with_max_stack(mut self, max_stack: u32) -> Self {
        self.max_stack = max_stack.max(1);
        self
    }

    /// Attach a custom display name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Copy of this descriptor carrying a different amount
    pub fn with_amount(&self, amount: u32) -> Self {
        ItemStack {
            amount,
            ..self.clone()
        }
    }

    /// Whether `other` describes the same item (amount is ignored)
    pub fn is_similar(&self, other: &ItemStack) -> bool {
        self.kind == other.kind && self.display_name == other.display_name
    }

    /// Human-readable name used in messages and reports
    pub fn label(&self) -> String {
        match &self.display_name {
            Some(name) => name.clone(),
            None => self.kind.to_lowercase().replace('_', " "),
        }
    }
}

/// Fixed-size, slot-based item container
///
/// Empty slots are `None`. A slot never holds a zero-amount stack: removal
/// clears the slot instead.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Inventory {
    slots: Vec<Option<ItemStack>>,
}

impl Inventory {
    /// Create an empty inventory with `size` slots
    pub fn new(size: usize) -> Self {
        Inventory {
            slots: vec![None; size],
        }
    }

    /// Number of slots
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Read-only view of every slot
    pub fn slots(&self) -> &[Option<ItemStack>] {
        &self.slots
    }

    /// Item in `slot`, if any
    pub fn get(&self, slot: usize) -> Option<&ItemStack> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Overwrite a single slot. Out-of-range slots are ignored.
    pub fn set(&mut self, slot: usize, item: Option<ItemStack>) {
        if let Some(target) = self.slots.get_mut(slot) {
            *target = item.filter(|stack| stack.amount > 0);
        }
    }

    /// Replace every slot with `contents`
    ///
    /// The inventory takes the length of `contents`; nothing of the previous
    /// contents survives.
    pub fn set_contents(&mut self, contents: Vec<Option<ItemStack>>) {
        self.slots = contents
            .into_iter()
            .map(|slot| slot.filter(|stack| stack.amount > 0))
            .collect();
    }

    /// Whether every slot is empty
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Total amount of items similar to `item` across all slots
    pub fn count(&self, item: &ItemStack) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|stack| stack.is_similar(item))
            .map(|stack| stack.amount)
            .sum()
    }

    /// How many more items similar to `item` would fit
    ///
    /// Empty slots contribute a full stack each; partial similar stacks
    /// contribute their remaining headroom.
    pub fn free_space(&self, item: &ItemStack) -> u32 {
        let max_stack = item.max_stack.max(1);
        self.slots
            .iter()
            .map(|slot| match slot {
                None => max_stack,
                Some(stack) if stack.is_similar(item) => max_stack.saturating_sub(stack.amount),
                Some(_) => 0,
            })
            .sum()
    }

    /// Remove up to `amount` items similar to `item`
    ///
    /// Slots are drained in order. Returns `true` only if the full amount was
    /// removed; on `false` the inventory has still been partially drained, so
    /// callers that need all-or-nothing semantics must hold a snapshot.
    pub fn remove(&mut self, item: &ItemStack, amount: u32) -> bool {
        let mut remaining = amount;

        for slot in self.slots.iter_mut() {
            if remaining == 0 {
                break;
            }
            let Some(stack) = slot else {
                continue;
            };
            if !stack.is_similar(item) {
                continue;
            }

            let take = remaining.min(stack.amount);
            stack.amount -= take;
            remaining -= take;
            if stack.amount == 0 {
                *slot = None;
            }
        }

        remaining == 0
    }

    /// Add up to `amount` items similar to `item`, returning how many were placed
    ///
    /// Partial similar stacks are topped up first, then empty slots are filled
    /// one full stack at a time.
    pub fn add(&mut self, item: &ItemStack, amount: u32) -> u32 {
        let max_stack = item.max_stack.max(1);
        let mut remaining = amount;

        for stack in self.slots.iter_mut().flatten() {
            if remaining == 0 {
                break;
            }
            if stack.is_similar(item) && stack.amount < max_stack {
                let put = remaining.min(max_stack - stack.amount);
                stack.amount += put;
                remaining -= put;
            }
        }

        for slot in self.slots.iter_mut() {
            if remaining == 0 {
                break;
            }
            if slot.is_none() {
                let put = remaining.min(max_stack);
                *slot = Some(item.with_amount(put));
                remaining -= put;
            }
        }

        amount - remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn diamond(amount: u32) -> ItemStack {
        ItemStack::new("DIAMOND", amount)
    }

    #[test]
    fn test_similarity_ignores_amount_but_not_name() {
        let plain = diamond(1);
        assert!(plain.is_similar(&diamond(40)));
        assert!(!plain.is_similar(&diamond(1).named("Shiny")));
        assert!(!plain.is_similar(&ItemStack::new("EMERALD", 1)));
    }

    #[rstest]
    #[case::plain(ItemStack::new("OAK_LOG", 1), "oak log")]
    #[case::named(ItemStack::new("OAK_LOG", 1).named("Lumber"), "Lumber")]
    fn test_label(#[case] item: ItemStack, #[case] expected: &str) {
        assert_eq!(item.label(), expected);
    }

    #[test]
    fn test_count_spans_slots() {
        let mut inventory = Inventory::new(4);
        inventory.set(0, Some(diamond(10)));
        inventory.set(2, Some(diamond(5)));
        inventory.set(3, Some(ItemStack::new("EMERALD", 7)));

        assert_eq!(inventory.count(&diamond(1)), 15);
    }

    #[test]
    fn test_free_space_counts_empty_slots_and_headroom() {
        let mut inventory = Inventory::new(3);
        inventory.set(0, Some(diamond(60)));
        inventory.set(1, Some(ItemStack::new("EMERALD", 1)));

        // 4 headroom in slot 0, a full stack in slot 2, nothing in slot 1
        assert_eq!(inventory.free_space(&diamond(1)), 68);
    }

    #[test]
    fn test_remove_drains_across_slots_and_clears_empty_ones() {
        let mut inventory = Inventory::new(3);
        inventory.set(0, Some(diamond(3)));
        inventory.set(1, Some(diamond(5)));

        assert!(inventory.remove(&diamond(1), 4));
        assert_eq!(inventory.get(0), None);
        assert_eq!(inventory.get(1).map(|s| s.amount), Some(4));
    }

    #[test]
    fn test_remove_reports_shortfall() {
        let mut inventory = Inventory::new(2);
        inventory.set(0, Some(diamond(3)));

        assert!(!inventory.remove(&diamond(1), 5));
        assert!(inventory.is_empty());
    }

    #[test]
    fn test_add_tops_up_then_fills_empty_slots() {
        let mut inventory = Inventory::new(3);
        inventory.set(1, Some(diamond(60)));

        let placed = inventory.add(&diamond(1), 70);

        assert_eq!(placed, 70);
        assert_eq!(inventory.get(1).map(|s| s.amount), Some(64));
        assert_eq!(inventory.get(0).map(|s| s.amount), Some(64));
        assert_eq!(inventory.get(2).map(|s| s.amount), Some(2));
    }

    #[test]
    fn test_add_returns_partial_amount_when_full() {
        let mut inventory = Inventory::new(1);
        let pearl = ItemStack::new("ENDER_PEARL", 1).with_max_stack(16);

        assert_eq!(inventory.add(&pearl, 20), 16);
        assert_eq!(inventory.count(&pearl), 16);
    }

    #[test]
    fn test_set_contents_replaces_everything() {
        let mut inventory = Inventory::new(2);
        inventory.set(0, Some(diamond(1)));

        inventory.set_contents(vec![None, None, Some(diamond(0)), Some(diamond(2))]);

        assert_eq!(inventory.size(), 4);
        assert_eq!(inventory.get(0), None);
        assert_eq!(inventory.get(2), None);
        assert_eq!(inventory.count(&diamond(1)), 2);
    }
}
