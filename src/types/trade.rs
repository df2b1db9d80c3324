//! Trade-related types
//!
//! This module defines the values that cross the engine boundary: where a
//! trade came from, how payment is settled, what a caller gets back, and the
//! record handed to the ledger.

use super::error::TradeError;
use super::item::ItemStack;
use super::location::{LocationId, PartyId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Transaction identifier assigned to every completed exchange
pub type TransactionId = Uuid;

/// Entry point a trade came through
///
/// Carried through to logging and the ledger only; it never changes how the
/// exchange itself behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSource {
    /// Confirmed through the trade dialog
    ConfirmedDialog,

    /// Instant purchase with payment in hand
    InstantPurchase,

    /// Payment placed into the location's container
    DepositTriggered,

    /// Offering taken out of the location's container
    WithdrawalTriggered,

    /// Administrative override
    AdminOverride,
}

impl fmt::Display for TradeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TradeSource::ConfirmedDialog => "confirmed_dialog",
            TradeSource::InstantPurchase => "instant_purchase",
            TradeSource::DepositTriggered => "deposit_triggered",
            TradeSource::WithdrawalTriggered => "withdrawal_triggered",
            TradeSource::AdminOverride => "admin_override",
        };
        f.write_str(name)
    }
}

/// Trade session state
///
/// `Completed`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeState {
    /// Session just created
    Initiated,

    /// Waiting for the party to confirm the terms
    AwaitingBuyerConfirm,

    /// Preconditions are being checked
    Validating,

    /// Waiting for the final confirmation
    AwaitingFinalConfirm,

    /// The exchange is running; cannot be cancelled
    Processing,

    Completed,
    Failed,
    Cancelled,
}

impl TradeState {
    /// Whether no further transition is permitted
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TradeState::Completed | TradeState::Failed | TradeState::Cancelled
        )
    }
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TradeState::Initiated => "initiated",
            TradeState::AwaitingBuyerConfirm => "awaiting buyer confirmation",
            TradeState::Validating => "validating",
            TradeState::AwaitingFinalConfirm => "awaiting final confirmation",
            TradeState::Processing => "processing",
            TradeState::Completed => "completed",
            TradeState::Failed => "failed",
            TradeState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// How the payment side of a trade is settled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payment {
    /// Taken from the party's inventory and deposited into the container
    Collect { item: ItemStack, quantity: u32 },

    /// Already sitting in the container; recorded but not moved
    Prepaid { item: ItemStack, quantity: u32 },

    /// No payment at all
    Bypassed,
}

impl Payment {
    /// Payment item, if any
    pub fn item(&self) -> Option<&ItemStack> {
        match self {
            Payment::Collect { item, .. } | Payment::Prepaid { item, .. } => Some(item),
            Payment::Bypassed => None,
        }
    }

    /// Payment quantity; zero when bypassed
    pub fn quantity(&self) -> u32 {
        match self {
            Payment::Collect { quantity, .. } | Payment::Prepaid { quantity, .. } => *quantity,
            Payment::Bypassed => 0,
        }
    }

    /// The item and quantity to move out of the party's inventory, if any
    pub fn collectable(&self) -> Option<(&ItemStack, u32)> {
        match self {
            Payment::Collect { item, quantity } if *quantity > 0 => Some((item, *quantity)),
            _ => None,
        }
    }
}

/// Which halves of the exchange the engine performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Settlement {
    /// Take stock from the container and deliver it to the party
    #[default]
    Full,

    /// The offering already left the container; settle payment only
    PaymentOnly,
}

/// Successful outcome of a trade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeReceipt {
    pub transaction_id: TransactionId,
    pub source: TradeSource,

    /// Items placed into the party's inventory
    pub delivered: u32,

    /// Items that did not fit and were dropped at the party's position
    pub dropped: u32,
}

/// Result of every trade entry point
pub type TradeResult = Result<TradeReceipt, TradeError>;

/// Lifecycle status stored with a trade record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Completed,
    Failed,
}

/// Record of a completed trade, handed to the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub transaction_id: TransactionId,
    pub location_id: LocationId,
    pub buyer: PartyId,
    pub seller: PartyId,

    /// Kind of the offered item
    pub item: Option<String>,

    /// Offered quantity
    pub quantity: u32,

    /// Kind of the payment item
    pub currency: Option<String>,

    /// Payment quantity
    pub price_paid: u32,

    pub source: TradeSource,
    pub status: TradeStatus,
    pub completed_at: DateTime<Utc>,
}

/// A trade attempt that was rejected or rolled back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTrade {
    pub party: PartyId,
    pub location_id: LocationId,
    pub reason: String,
    pub source: TradeSource,
    pub failed_at: DateTime<Utc>,
}
