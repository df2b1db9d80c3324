//! In-memory world
//!
//! Parties, containers and the ground live in plain maps. Every notice,
//! drop and marker refresh is recorded so callers can inspect what the
//! engine did.

use super::{Notice, World};
use crate::types::{Inventory, ItemStack, Location, LocationId, PartyId, Position};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Default slot count of a party inventory
pub const PARTY_INVENTORY_SIZE: usize = 36;

/// Default slot count of a location container
pub const CONTAINER_SIZE: usize = 27;

#[derive(Debug, Clone)]
struct Party {
    online: bool,
    position: Position,
    inventory: Inventory,
}

/// Who holds a quantity of items, for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Holder {
    Party(PartyId),
    Container(LocationId),
    Ground,
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Holder::Party(id) => write!(f, "party:{}", id),
            Holder::Container(id) => write!(f, "shop:{}", id),
            Holder::Ground => f.write_str("ground"),
        }
    }
}

/// Total quantity of one item kind held by one holder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub holder: Holder,
    pub item: String,
    pub quantity: u32,
}

/// World backed by in-memory maps
#[derive(Debug, Default)]
pub struct InMemoryWorld {
    parties: HashMap<PartyId, Party>,
    containers: HashMap<LocationId, Inventory>,
    dropped: Vec<(Position, ItemStack)>,
    notices: Vec<(PartyId, Notice)>,
    marker_refreshes: Vec<LocationId>,
}

impl InMemoryWorld {
    pub fn new() -> Self {
        InMemoryWorld::default()
    }

    /// Add an online party with an empty inventory of `slots` slots
    pub fn add_party(&mut self, party: PartyId, slots: usize, position: Position) {
        self.parties.insert(
            party,
            Party {
                online: true,
                position,
                inventory: Inventory::new(slots),
            },
        );
    }

    pub fn set_online(&mut self, party: PartyId, online: bool) {
        if let Some(state) = self.parties.get_mut(&party) {
            state.online = online;
        }
    }

    /// Put items into a party's inventory, returning how many fit
    pub fn give(&mut self, party: PartyId, item: &ItemStack, amount: u32) -> u32 {
        self.parties
            .get_mut(&party)
            .map_or(0, |state| state.inventory.add(item, amount))
    }

    /// Link an empty container of `slots` slots to a location
    pub fn add_container(&mut self, location: LocationId, slots: usize) {
        self.containers.insert(location, Inventory::new(slots));
    }

    pub fn remove_container(&mut self, location: LocationId) -> Option<Inventory> {
        self.containers.remove(&location)
    }

    /// Put items into a location's container, returning how many fit
    pub fn stock(&mut self, location: LocationId, item: &ItemStack, amount: u32) -> u32 {
        self.containers
            .get_mut(&location)
            .map_or(0, |container| container.add(item, amount))
    }

    /// Take items out of a location's container by hand
    pub fn take_from_container(
        &mut self,
        location: LocationId,
        item: &ItemStack,
        amount: u32,
    ) -> bool {
        self.containers
            .get_mut(&location)
            .is_some_and(|container| container.remove(item, amount))
    }

    pub fn dropped(&self) -> &[(Position, ItemStack)] {
        &self.dropped
    }

    pub fn notices_for(&self, party: PartyId) -> Vec<&Notice> {
        self.notices
            .iter()
            .filter(|(to, _)| *to == party)
            .map(|(_, notice)| notice)
            .collect()
    }

    pub fn marker_refreshes(&self) -> &[LocationId] {
        &self.marker_refreshes
    }

    /// Every non-empty holding, sorted by holder then item
    pub fn holdings(&self) -> Vec<Holding> {
        let mut totals: BTreeMap<(Holder, String), u32> = BTreeMap::new();

        let mut tally = |holder: Holder, stack: &ItemStack| {
            *totals.entry((holder, stack.kind.clone())).or_default() += stack.amount;
        };

        for (id, party) in &self.parties {
            for stack in party.inventory.slots().iter().flatten() {
                tally(Holder::Party(*id), stack);
            }
        }
        for (id, container) in &self.containers {
            for stack in container.slots().iter().flatten() {
                tally(Holder::Container(*id), stack);
            }
        }
        for (_, stack) in &self.dropped {
            tally(Holder::Ground, stack);
        }

        totals
            .into_iter()
            .filter(|(_, quantity)| *quantity > 0)
            .map(|((holder, item), quantity)| Holding {
                holder,
                item,
                quantity,
            })
            .collect()
    }
}

impl World for InMemoryWorld {
    fn is_online(&self, party: PartyId) -> bool {
        self.parties.get(&party).is_some_and(|state| state.online)
    }

    fn party_inventory(&self, party: PartyId) -> Option<&Inventory> {
        self.parties.get(&party).map(|state| &state.inventory)
    }

    fn party_inventory_mut(&mut self, party: PartyId) -> Option<&mut Inventory> {
        self.parties.get_mut(&party).map(|state| &mut state.inventory)
    }

    fn party_position(&self, party: PartyId) -> Option<Position> {
        self.parties.get(&party).map(|state| state.position)
    }

    fn container(&self, location: LocationId) -> Option<&Inventory> {
        self.containers.get(&location)
    }

    fn container_mut(&mut self, location: LocationId) -> Option<&mut Inventory> {
        self.containers.get_mut(&location)
    }

    fn drop_item(&mut self, at: Position, item: ItemStack) {
        self.dropped.push((at, item));
    }

    fn notify(&mut self, party: PartyId, notice: Notice) {
        tracing::debug!(party, %notice, "notice");
        self.notices.push((party, notice));
    }

    fn refresh_marker(&mut self, location: &Location) {
        self.marker_refreshes.push(location.id);
    }
}
