//! Auto-exchange triggers
//!
//! Turns two physical actions on a location's container into trades:
//!
//! - **Deposit**: the party puts an accepted payment into the container. The
//!   payment is already where it belongs, so the engine only delivers the
//!   offering, scaled by the number of bundles deposited.
//! - **Withdrawal**: the party takes the offering out of the container. The
//!   offering is already gone, so the engine only settles payment.
//!
//! Both triggers are debounced per (party, location) pair, since one physical
//! action may be reported more than once.

use crate::core::clock::{duration_millis, Timestamp};
use crate::core::engine::{TradeEngine, TradeRequest};
use crate::core::traits::{AutoExchangePreferences, LocationDirectory};
use crate::types::{
    AcceptedPayment, ItemStack, LocationId, PartyId, Payment, PaymentTerms, TradeError,
    TradeResult, TradeSource,
};
use crate::world::World;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Number of whole bundles in `quantity`
///
/// # Returns
///
/// `None` if `base` is zero, `quantity` is zero, or `quantity` is not an
/// exact multiple of `base`.
pub fn bundle_increments(quantity: u32, base: u32) -> Option<u32> {
    if base == 0 || quantity == 0 || quantity % base != 0 {
        return None;
    }
    Some(quantity / base)
}

pub struct AutoExchangeHandler<W: World> {
    engine: Arc<TradeEngine<W>>,
    directory: Arc<dyn LocationDirectory>,
    preferences: Arc<dyn AutoExchangePreferences>,
    debounce_window: u64,
    last_trade: DashMap<(PartyId, LocationId), Timestamp>,
}

impl<W: World> AutoExchangeHandler<W> {
    /// Create a handler using the engine's configured debounce window
    pub fn new(
        engine: Arc<TradeEngine<W>>,
        directory: Arc<dyn LocationDirectory>,
        preferences: Arc<dyn AutoExchangePreferences>,
    ) -> Self {
        let debounce_window = duration_millis(engine.config().debounce_window);
        AutoExchangeHandler {
            engine,
            directory,
            preferences,
            debounce_window,
            last_trade: DashMap::new(),
        }
    }

    /// Handle an accepted payment placed into a location's container
    ///
    /// `deposited.amount` is the deposited quantity; it must be an exact
    /// multiple of the location's base payment for that item.
    ///
    /// # Errors
    ///
    /// Rejections (`AutoExchangeDisabled`, `Debounced`, `PaymentRejected`,
    /// `NotExactMultiple`, `Configuration`) happen before anything is touched.
    pub async fn on_payment_deposit(
        &self,
        party: PartyId,
        location: LocationId,
        deposited: &ItemStack,
    ) -> TradeResult {
        self.precheck(party, location)?;

        let shop = self
            .directory
            .resolve(location)
            .ok_or_else(|| TradeError::location_not_found(location))?;

        if !shop.accepts(deposited) {
            return Err(TradeError::PaymentRejected);
        }
        let offering = shop
            .offering
            .clone()
            .ok_or_else(|| TradeError::configuration("Shop not fully configured"))?;
        let base_payment = shop
            .payment_amount(deposited)
            .ok_or_else(|| TradeError::configuration("Payment amount not configured"))?;

        let increments = bundle_increments(deposited.amount, base_payment)
            .ok_or_else(|| TradeError::not_exact_multiple(base_payment))?;
        let offered_quantity = offering
            .amount
            .checked_mul(increments)
            .ok_or_else(|| TradeError::configuration("Trade quantity too large"))?;

        tracing::debug!(
            party,
            location,
            deposited = deposited.amount,
            increments,
            "payment deposit trigger"
        );

        self.claim(party, location)?;
        self.engine
            .execute_direct_trade(TradeRequest {
                party,
                location,
                offered: offering,
                offered_quantity,
                payment: Payment::Prepaid {
                    item: deposited.with_amount(1),
                    quantity: deposited.amount,
                },
                source: TradeSource::DepositTriggered,
            })
            .await
    }

    /// Handle the offering being taken out of a location's container
    ///
    /// Picks the payment the party can cover: for barter locations the first
    /// accepted payment held in sufficient quantity, for fixed-price locations
    /// the configured price.
    ///
    /// # Errors
    ///
    /// Rejections (`AutoExchangeDisabled`, `Debounced`, `ItemMismatch`,
    /// `NotExactMultiple`, `InsufficientPayment`, `Configuration`) happen
    /// before anything is touched.
    pub async fn on_offering_withdrawal(
        &self,
        party: PartyId,
        location: LocationId,
        taken: &ItemStack,
        taken_quantity: u32,
    ) -> TradeResult {
        self.precheck(party, location)?;

        let shop = self
            .directory
            .resolve(location)
            .ok_or_else(|| TradeError::location_not_found(location))?;

        let offering = shop
            .offering
            .clone()
            .ok_or_else(|| TradeError::configuration("Shop not fully configured"))?;
        if !taken.is_similar(&offering) {
            return Err(TradeError::ItemMismatch);
        }

        let increments = bundle_increments(taken_quantity, offering.amount)
            .ok_or_else(|| TradeError::not_exact_multiple(offering.amount))?;

        let accepted = match &shop.terms {
            PaymentTerms::Unconfigured => {
                return Err(TradeError::configuration("Shop not configured"));
            }
            PaymentTerms::Fixed { quantity: 0, .. } => {
                return Err(TradeError::configuration("Shop not configured"));
            }
            _ => shop.accepted_payments(),
        };
        let (item, total) = self.select_payment(party, accepted, increments).await?;

        tracing::debug!(
            party,
            location,
            taken = taken_quantity,
            increments,
            payment = %item.kind,
            total,
            "offering withdrawal trigger"
        );

        self.claim(party, location)?;
        self.engine
            .execute_withdrawal_trade(TradeRequest {
                party,
                location,
                offered: offering,
                offered_quantity: taken_quantity,
                payment: Payment::Collect {
                    item,
                    quantity: total,
                },
                source: TradeSource::WithdrawalTriggered,
            })
            .await
    }

    /// First accepted payment the party holds enough of for `increments` bundles
    async fn select_payment(
        &self,
        party: PartyId,
        accepted: Vec<AcceptedPayment>,
        increments: u32,
    ) -> Result<(ItemStack, u32), TradeError> {
        self.engine
            .main_thread()
            .run(move |world| {
                let inventory = world.party_inventory(party)?;
                accepted.into_iter().find_map(|payment| {
                    let total = payment.quantity.checked_mul(increments)?;
                    (total > 0 && inventory.count(&payment.item) >= total)
                        .then(|| (payment.item.with_amount(1), total))
                })
            })
            .await?
            .ok_or(TradeError::InsufficientPayment)
    }

    fn precheck(&self, party: PartyId, location: LocationId) -> Result<(), TradeError> {
        if !self.preferences.is_enabled(party) {
            return Err(TradeError::AutoExchangeDisabled);
        }
        if self.is_debounced(party, location) {
            tracing::debug!(party, location, "debounce active, skipping duplicate trigger");
            return Err(TradeError::Debounced);
        }
        Ok(())
    }

    /// Whether a trade for this pair was dispatched within the debounce window
    pub fn is_debounced(&self, party: PartyId, location: LocationId) -> bool {
        let now = self.engine.clock().now();
        self.last_trade
            .get(&(party, location))
            .is_some_and(|last| now.saturating_sub(*last) < self.debounce_window)
    }

    /// Record a dispatch for this pair, unless another one beat us to it
    fn claim(&self, party: PartyId, location: LocationId) -> Result<(), TradeError> {
        let now = self.engine.clock().now();
        match self.last_trade.entry((party, location)) {
            Entry::Occupied(mut last) => {
                if now.saturating_sub(*last.get()) < self.debounce_window {
                    return Err(TradeError::Debounced);
                }
                last.insert(now);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now);
            }
        }
        // The entry guard is released; retain locks every shard
        self.forget_stale(now);
        Ok(())
    }

    /// Drop timestamps whose debounce window has closed
    fn forget_stale(&self, now: Timestamp) {
        self.last_trade
            .retain(|_, last| now.saturating_sub(*last) < self.debounce_window);
    }

    /// Number of (party, location) pairs still holding a timestamp
    pub fn tracked_pairs(&self) -> usize {
        self.last_trade.len()
    }

    /// Forget every debounce timestamp
    pub fn clear_debounce(&self) {
        self.last_trade.clear();
    }
}
