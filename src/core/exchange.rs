//! The atomic exchange routine
//!
//! Runs on the main thread against a session that already passed validation.
//! Both inventories are snapshotted first; any failure while mutating them,
//! including a panic, restores both snapshots in full before returning.
//!
//! # Steps
//!
//! 1. Snapshot the party inventory and the location's container (if any)
//! 2. Take the payment from the party
//! 3. Take the offered quantity from the container
//! 4. Deposit the payment into the container; a full container is fatal
//! 5. Deliver the offering to the party; overflow is dropped at the party's
//!    position and never fails the trade

use crate::core::snapshot::InventorySnapshot;
use crate::types::{ItemStack, LocationId, PartyId, Payment, RollbackReason, Settlement};
use crate::world::{Notice, World};
use std::panic::{self, AssertUnwindSafe};

/// Everything the exchange routine needs, resolved ahead of time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangePlan {
    pub party: PartyId,
    pub location: LocationId,

    /// Whether the location draws from a physical container
    pub has_container: bool,

    pub offered: ItemStack,
    pub offered_quantity: u32,
    pub payment: Payment,
    pub settlement: Settlement,
}

impl ExchangePlan {
    fn delivers(&self) -> bool {
        self.settlement == Settlement::Full
    }
}

/// Where the offered items ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delivery {
    /// Placed into the party's inventory
    pub delivered: u32,

    /// Dropped at the party's position
    pub dropped: u32,
}

/// Apply `plan` to the world atomically
///
/// # Returns
///
/// * `Ok(Delivery)` if every step up to delivery succeeded
/// * `Err(RollbackReason)` if a step failed; both inventories are then
///   item-for-item identical to their state before the call
pub fn apply_exchange<W: World>(world: &mut W, plan: &ExchangePlan) -> Result<Delivery, RollbackReason> {
    let party_snapshot = world
        .party_inventory(plan.party)
        .map(InventorySnapshot::capture)
        .ok_or(RollbackReason::PartyGone)?;

    let container_snapshot = if plan.has_container {
        let snapshot = world
            .container(plan.location)
            .map(InventorySnapshot::capture)
            .ok_or(RollbackReason::ContainerGone)?;
        Some(snapshot)
    } else {
        None
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_steps(world, plan)));

    let reason = match outcome {
        Ok(Ok(delivery)) => return Ok(delivery),
        Ok(Err(reason)) => reason,
        Err(payload) => RollbackReason::Fault(panic_message(payload.as_ref())),
    };

    if let Some(inventory) = world.party_inventory_mut(plan.party) {
        party_snapshot.restore(inventory);
    }
    if let (Some(snapshot), Some(container)) =
        (&container_snapshot, world.container_mut(plan.location))
    {
        snapshot.restore(container);
    }

    tracing::warn!(
        party = plan.party,
        location = plan.location,
        %reason,
        "exchange rolled back"
    );
    Err(reason)
}

fn run_steps<W: World>(world: &mut W, plan: &ExchangePlan) -> Result<Delivery, RollbackReason> {
    let collected = plan.payment.collectable();

    if let Some((item, quantity)) = collected {
        let inventory = world
            .party_inventory_mut(plan.party)
            .ok_or(RollbackReason::PartyGone)?;
        if !inventory.remove(item, quantity) {
            return Err(RollbackReason::PaymentUnavailable);
        }
    }

    if plan.delivers() && plan.has_container {
        let container = world
            .container_mut(plan.location)
            .ok_or(RollbackReason::ContainerGone)?;
        if !container.remove(&plan.offered, plan.offered_quantity) {
            return Err(RollbackReason::OutOfStock);
        }
    }

    if let (Some((item, quantity)), true) = (collected, plan.has_container) {
        let container = world
            .container_mut(plan.location)
            .ok_or(RollbackReason::ContainerGone)?;
        if container.add(item, quantity) < quantity {
            return Err(RollbackReason::StorageFull);
        }
    }

    if !plan.delivers() {
        return Ok(Delivery::default());
    }

    let inventory = world
        .party_inventory_mut(plan.party)
        .ok_or(RollbackReason::PartyGone)?;
    let delivered = inventory.add(&plan.offered, plan.offered_quantity);
    let dropped = plan.offered_quantity - delivered;

    if dropped > 0 {
        drop_overflow(world, plan, dropped);
    }

    Ok(Delivery { delivered, dropped })
}

/// Drop `amount` of the offering at the party's position, one stack at a time
fn drop_overflow<W: World>(world: &mut W, plan: &ExchangePlan, amount: u32) {
    let position = world.party_position(plan.party).unwrap_or_default();
    let max_stack = plan.offered.max_stack.max(1);

    let mut remaining = amount;
    while remaining > 0 {
        let chunk = remaining.min(max_stack);
        world.drop_item(position, plan.offered.with_amount(chunk));
        remaining -= chunk;
    }

    world.notify(plan.party, Notice::ItemsDropped { quantity: amount });
    tracing::info!(
        party = plan.party,
        location = plan.location,
        dropped = amount,
        "delivery overflow dropped"
    );
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic during exchange".to_string()
    }
}
