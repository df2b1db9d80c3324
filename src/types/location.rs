//! Storage location types
//!
//! A storage location (a "shop") is owned by one party, offers one item and
//! accepts one or more payment items. Its stock either lives in a linked
//! container or is infinite (administrative locations).

use super::item::ItemStack;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Party identifier
pub type PartyId = u32;

/// Storage location identifier
pub type LocationId = u32;

/// A point in the world, used for dropping overflow items and for markers
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Position { x, y, z }
    }
}

/// One payment item a barter location accepts, with its base quantity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedPayment {
    /// Item descriptor; its amount is not significant
    pub item: ItemStack,

    /// Quantity of `item` required per base unit of the offering
    pub quantity: u32,
}

/// What a location wants in exchange for its offering
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaymentTerms {
    /// Buy/sell location: a single configured price
    Fixed { item: ItemStack, quantity: u32 },

    /// Barter location: any one of several accepted payments
    Barter(Vec<AcceptedPayment>),

    /// Payment not set up yet
    #[default]
    Unconfigured,
}

/// Where a location's offering comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Stock {
    /// Backed by a physical container
    #[default]
    Container,

    /// No container: unlimited stock
    Infinite,
}

/// Storage location record
///
/// The same value is used for the durable record and for the live, cached
/// representation; the live copy is shared as `Arc<Location>` and replaced
/// wholesale on reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub owner: PartyId,
    pub name: String,

    /// Offered item; its amount is the base offered quantity
    pub offering: Option<ItemStack>,

    pub terms: PaymentTerms,
    pub stock: Stock,

    /// Where the location's interactive marker sits
    pub marker: Position,

    pub last_modified: DateTime<Utc>,
}

impl Location {
    /// Create an unconfigured, container-backed location
    pub fn new(id: LocationId, owner: PartyId, name: impl Into<String>) -> Self {
        Location {
            id,
            owner,
            name: name.into(),
            offering: None,
            terms: PaymentTerms::Unconfigured,
            stock: Stock::Container,
            marker: Position::default(),
            last_modified: Utc::now(),
        }
    }

    pub fn with_offering(mut self, offering: ItemStack) -> Self {
        self.offering = Some(offering);
        self
    }

    pub fn with_terms(mut self, terms: PaymentTerms) -> Self {
        self.terms = terms;
        self
    }

    pub fn with_stock(mut self, stock: Stock) -> Self {
        self.stock = stock;
        self
    }

    pub fn with_marker(mut self, marker: Position) -> Self {
        self.marker = marker;
        self
    }

    /// Whether the offering is drawn from a physical container
    pub fn has_container(&self) -> bool {
        self.stock == Stock::Container
    }

    /// Base quantity of the offering per trade unit
    pub fn base_offered_quantity(&self) -> Option<u32> {
        self.offering.as_ref().map(|item| item.amount)
    }

    /// Every payment this location accepts, in configuration order
    pub fn accepted_payments(&self) -> Vec<AcceptedPayment> {
        match &self.terms {
            PaymentTerms::Fixed { item, quantity } => vec![AcceptedPayment {
                item: item.clone(),
                quantity: *quantity,
            }],
            PaymentTerms::Barter(accepted) => accepted.clone(),
            PaymentTerms::Unconfigured => Vec::new(),
        }
    }

    /// Whether `item` is one of the accepted payments
    pub fn accepts(&self, item: &ItemStack) -> bool {
        self.accepted_payments()
            .iter()
            .any(|accepted| accepted.item.is_similar(item))
    }

    /// Base payment quantity configured for `item`; `None` when not accepted
    /// or configured as zero
    pub fn payment_amount(&self, item: &ItemStack) -> Option<u32> {
        self.accepted_payments()
            .into_iter()
            .find(|accepted| accepted.item.is_similar(item))
            .map(|accepted| accepted.quantity)
            .filter(|quantity| *quantity > 0)
    }

    /// Copy of this record with a new owner and a fresh modification stamp
    pub fn with_owner(&self, owner: PartyId) -> Location {
        Location {
            owner,
            last_modified: Utc::now(),
            ..self.clone()
        }
    }
}
