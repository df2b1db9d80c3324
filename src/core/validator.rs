//! Pre-execution trade validation
//!
//! The validator is stateless: it looks at a session and a view of the live
//! world and reports every failed precondition it can find. Checks never
//! short-circuit each other, except where a later check has nothing to look
//! at (no session, no location, no terms).

use crate::core::clock::Timestamp;
use crate::core::session::TradeSession;
use crate::types::{Inventory, ItemStack, Location, PartyId, Settlement};

/// Live state a session is validated against
///
/// Built on the main thread, since it borrows live inventories.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub now: Timestamp,

    /// Party attempting to execute the trade
    pub acting_party: PartyId,

    pub party_online: bool,
    pub party_inventory: Option<&'a Inventory>,

    /// Target location, resolved at validation time
    pub location: Option<&'a Location>,

    /// The location's backing container, if it has one and it still exists
    pub container: Option<&'a Inventory>,
}

/// Outcome of a validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// Failed preconditions, in check order
    pub errors: Vec<String>,

    /// Non-blocking findings (e.g. delivery will overflow)
    pub advisories: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Stateless precondition checks
#[derive(Debug, Clone, Copy, Default)]
pub struct TradeValidator;

impl TradeValidator {
    pub fn new() -> Self {
        TradeValidator
    }

    /// Validate `session` against the live world
    ///
    /// # Arguments
    ///
    /// * `session` - The session to validate; `None` when it could not be found
    /// * `ctx` - Live party, location and container state
    ///
    /// # Returns
    ///
    /// A `ValidationResult` listing every applicable failure. Insufficient
    /// receiving space is reported as an advisory only, because delivery
    /// overflow is dropped at the party's position rather than rejected.
    pub fn validate(
        &self,
        session: Option<&TradeSession>,
        ctx: &ValidationContext<'_>,
    ) -> ValidationResult {
        let mut result = ValidationResult::default();

        let Some(session) = session else {
            result.errors.push("Invalid trade session".to_string());
            return result;
        };

        if session.is_expired(ctx.now) {
            result.errors.push("Trade session has expired".to_string());
        } else if !session.is_active(ctx.now) {
            result
                .errors
                .push("Trade session is no longer active".to_string());
        }

        if !ctx.party_online {
            result.errors.push("Buyer is not online".to_string());
        }
        if ctx.acting_party != session.party {
            result
                .errors
                .push("Player does not match trade session".to_string());
        }

        if ctx.location.is_none() {
            result.errors.push("Shop no longer exists".to_string());
        }

        let Some(terms) = session.terms() else {
            result
                .errors
                .push("No item configured for trade".to_string());
            return result;
        };

        if let (Some((payment, quantity)), Some(inventory)) =
            (terms.payment.collectable(), ctx.party_inventory)
        {
            let available = inventory.count(payment);
            if available < quantity {
                result.errors.push(format!(
                    "Insufficient payment: need {} {}, have {}",
                    quantity,
                    payment.label(),
                    available
                ));
            }
        }

        if terms.settlement == Settlement::PaymentOnly {
            return result;
        }

        if terms.offered_quantity == 0 {
            result
                .errors
                .push("Invalid trade configuration".to_string());
            return result;
        }

        if let Some(location) = ctx.location {
            if location.has_container() {
                let error = match ctx.container {
                    Some(container) => {
                        Self::check_stock(container, &terms.offered, terms.offered_quantity)
                    }
                    None => Some("Shop container no longer exists".to_string()),
                };
                result.errors.extend(error);
            }
        }

        if let Some(inventory) = ctx.party_inventory {
            let free = inventory.free_space(&terms.offered);
            if free < terms.offered_quantity {
                result.advisories.push(format!(
                    "Not enough inventory space: need {}, have {}; the rest will be dropped",
                    terms.offered_quantity, free
                ));
            }
        }

        result
    }

    fn check_stock(container: &Inventory, offered: &ItemStack, quantity: u32) -> Option<String> {
        let stock = container.count(offered);
        (stock < quantity).then(|| {
            format!(
                "Shop out of stock: need {} {}, have {}",
                quantity,
                offered.label(),
                stock
            )
        })
    }
}
