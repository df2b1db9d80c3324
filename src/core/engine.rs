//! Trade execution engine
//!
//! This module provides the `TradeEngine`, the single place where trades are
//! executed. It owns the session map, runs validation and the atomic exchange
//! on the main thread, and hands completed trades to the ledger.
//!
//! # Architecture
//!
//! ```text
//! TradeEngine<W>
//!     ├── MainThread<W>                 (every inventory touch)
//!     ├── Arc<dyn LocationDirectory>    (live locations, resolved per use)
//!     ├── Arc<dyn TradeLedger>          (fire-and-forget records)
//!     ├── DashMap<SessionId, TradeSession>
//!     └── DashMap<PartyId, SessionId>   (at most one active session per party)
//! ```
//!
//! # Entry Points
//!
//! - `execute_trade`: a stored session confirmed through the dialog
//! - `execute_direct_trade`: instant, deposit-triggered and admin trades,
//!   through an ephemeral session that never enters the map
//! - `execute_withdrawal_trade`: like a direct trade, but the offering has
//!   already left the container, so only payment is settled
//!
//! All three end in the same pipeline: validate, move to `Processing`, run
//! the exchange, then complete or fail.
//!
//! # Lock Order
//!
//! A `party_sessions` guard may be held while touching `sessions`, never the
//! other way round.

use crate::config::EngineConfig;
use crate::core::clock::{SystemTimeSource, TimeSource};
use crate::core::dispatch::MainThread;
use crate::core::exchange::{apply_exchange, ExchangePlan};
use crate::core::fallback::FallbackTracker;
use crate::core::session::{SessionId, SessionTerms, TradeSession};
use crate::core::traits::{LocationDirectory, TradeLedger};
use crate::core::validator::{TradeValidator, ValidationContext};
use crate::types::{
    DispatchError, FailedTrade, ItemStack, Location, LocationId, PartyId, Payment, PaymentTerms,
    Settlement, TradeError, TradeReceipt, TradeRecord, TradeResult, TradeSource, TradeState,
    TradeStatus,
};
use crate::world::{Notice, World};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

/// Parameters of a trade executed without a stored session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeRequest {
    pub party: PartyId,
    pub location: LocationId,

    /// Offered item descriptor
    pub offered: ItemStack,

    /// Total offered quantity
    pub offered_quantity: u32,

    pub payment: Payment,
    pub source: TradeSource,
}

/// Ledger writes that have been handed off but not finished yet
#[derive(Debug, Default)]
struct LedgerWrites {
    in_flight: AtomicUsize,
    idle: Notify,
}

impl LedgerWrites {
    fn start(self: &Arc<Self>) -> LedgerWriteGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        LedgerWriteGuard(Arc::clone(self))
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            let mut notified = std::pin::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Marks a ledger write finished when dropped, even if the write panicked
struct LedgerWriteGuard(Arc<LedgerWrites>);

impl Drop for LedgerWriteGuard {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Trade execution engine
///
/// Shared as `Arc<TradeEngine<W>>` between the auto-exchange handler, the
/// ownership coordinator and the session sweeper. Every method takes `&self`.
pub struct TradeEngine<W: World> {
    main: MainThread<W>,
    directory: Arc<dyn LocationDirectory>,
    ledger: Arc<dyn TradeLedger>,
    clock: Arc<dyn TimeSource>,
    validator: TradeValidator,
    fallback: Arc<FallbackTracker>,
    config: EngineConfig,
    sessions: DashMap<SessionId, TradeSession>,
    party_sessions: DashMap<PartyId, SessionId>,
    ledger_writes: Arc<LedgerWrites>,
    closed: AtomicBool,
}

impl<W: World> TradeEngine<W> {
    /// Create a new TradeEngine
    ///
    /// # Arguments
    ///
    /// * `main` - Handle to the thread that owns the world
    /// * `directory` - Live location lookup
    /// * `ledger` - Durable trade ledger
    /// * `config` - Session timeout and ledger fallback settings
    pub fn new(
        main: MainThread<W>,
        directory: Arc<dyn LocationDirectory>,
        ledger: Arc<dyn TradeLedger>,
        config: EngineConfig,
    ) -> Self {
        TradeEngine {
            main,
            directory,
            ledger,
            clock: Arc::new(SystemTimeSource),
            validator: TradeValidator::new(),
            fallback: Arc::new(FallbackTracker::new(
                config.ledger_max_failures,
                config.ledger_recovery_window,
            )),
            config,
            sessions: DashMap::new(),
            party_sessions: DashMap::new(),
            ledger_writes: Arc::new(LedgerWrites::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Replace the time source used for expiry
    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn main_thread(&self) -> &MainThread<W> {
        &self.main
    }

    pub fn clock(&self) -> &Arc<dyn TimeSource> {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a dialog trade between `party` and `location`
    ///
    /// If the party already holds an active session it is returned as is; an
    /// expired or finished one is replaced. Sessions against fixed-price
    /// locations start with their terms already filled in.
    ///
    /// # Errors
    ///
    /// * `TradeError::LocationNotFound` if the location does not resolve
    /// * `TradeError::SelfTrade` if `party` owns the location
    pub fn initiate_trade(
        &self,
        party: PartyId,
        location: LocationId,
    ) -> Result<TradeSession, TradeError> {
        self.ensure_open()?;

        let shop = self
            .directory
            .resolve(location)
            .ok_or_else(|| TradeError::location_not_found(location))?;
        if shop.owner == party {
            tracing::debug!(party, location, "owner cannot trade with own shop");
            return Err(TradeError::SelfTrade);
        }

        let now = self.clock.now();
        let mut session = TradeSession::new(
            party,
            location,
            TradeSource::ConfirmedDialog,
            now,
            self.config.session_timeout,
        );
        if let Some(terms) = fixed_terms(&shop) {
            session = session.with_terms(terms);
        }

        match self.party_sessions.entry(party) {
            Entry::Occupied(mut existing) => {
                let previous = *existing.get();
                if let Some(current) = self.sessions.get(&previous) {
                    if current.is_active(now) {
                        return Ok(current.value().clone());
                    }
                }
                self.sessions
                    .remove_if(&previous, |_, s| s.state() != TradeState::Processing);
                self.sessions.insert(session.id, session.clone());
                existing.insert(session.id);
            }
            Entry::Vacant(vacant) => {
                self.sessions.insert(session.id, session.clone());
                vacant.insert(session.id);
            }
        }

        tracing::debug!(session_id = %session.id, party, location, "trade session created");
        Ok(session)
    }

    /// Look up a session, discarding it if it has expired
    pub fn get_session(&self, id: SessionId) -> Option<TradeSession> {
        let now = self.clock.now();
        {
            let session = self.sessions.get(&id)?;
            if !session.is_expired(now) {
                return Some(session.value().clone());
            }
        }

        tracing::debug!(session_id = %id, "expired session discarded on access");
        self.cancel_session(id);
        None
    }

    /// The party's current session, if any
    pub fn get_player_session(&self, party: PartyId) -> Option<TradeSession> {
        let id = *self.party_sessions.get(&party)?;
        self.get_session(id)
    }

    /// Set the terms of a dialog session and await the party's confirmation
    ///
    /// # Errors
    ///
    /// * `TradeError::SessionNotFound` / `TradeError::SessionExpired`
    /// * `TradeError::Session` if terms were already set or the session
    ///   cannot move to `AwaitingBuyerConfirm`
    pub fn set_session_terms(
        &self,
        id: SessionId,
        terms: SessionTerms,
    ) -> Result<TradeSession, TradeError> {
        self.update_live(id, |session| {
            session.set_terms(terms)?;
            session.transition(TradeState::AwaitingBuyerConfirm)?;
            Ok(())
        })
    }

    /// Record the party's confirmation of the terms
    ///
    /// # Errors
    ///
    /// * `TradeError::Configuration` if the session has no terms yet
    /// * `TradeError::Session` if the session cannot await final confirmation
    pub fn confirm_session(&self, id: SessionId) -> Result<TradeSession, TradeError> {
        self.update_live(id, |session| {
            if session.terms().is_none() {
                return Err(TradeError::configuration("Trade terms not set"));
            }
            if session.state() == TradeState::Initiated {
                session.transition(TradeState::AwaitingBuyerConfirm)?;
            }
            session.transition(TradeState::AwaitingFinalConfirm)?;
            Ok(())
        })
    }

    /// Apply `update` to a copy of a live session and store it only if it succeeds
    fn update_live<F>(&self, id: SessionId, update: F) -> Result<TradeSession, TradeError>
    where
        F: FnOnce(&mut TradeSession) -> Result<(), TradeError>,
    {
        let now = self.clock.now();
        {
            let mut live = self.sessions.get_mut(&id).ok_or(TradeError::SessionNotFound)?;
            if !live.is_expired(now) {
                let mut updated = live.value().clone();
                update(&mut updated)?;
                *live = updated.clone();
                return Ok(updated);
            }
        }

        self.cancel_session(id);
        Err(TradeError::SessionExpired)
    }

    /// Execute a stored session
    ///
    /// An expired session is removed and reported as `SessionExpired`. A
    /// session another call is already executing is left alone and reported
    /// as `SessionInactive`.
    pub async fn execute_trade(&self, id: SessionId) -> TradeResult {
        self.ensure_open()?;

        let now = self.clock.now();
        let claimed = {
            let mut live = self
                .sessions
                .get_mut(&id)
                .ok_or(TradeError::SessionNotFound)?;
            if live.is_expired(now) {
                None
            } else {
                let awaiting = matches!(
                    live.state(),
                    TradeState::Initiated
                        | TradeState::AwaitingBuyerConfirm
                        | TradeState::AwaitingFinalConfirm
                );
                if !awaiting {
                    tracing::debug!(
                        session_id = %id,
                        state = %live.state(),
                        "session already executing"
                    );
                    return Err(TradeError::SessionInactive);
                }
                live.transition(TradeState::Validating)?;
                Some(live.value().clone())
            }
        };

        let Some(session) = claimed else {
            tracing::debug!(session_id = %id, "trade attempted on expired session");
            self.cancel_session(id);
            return Err(TradeError::SessionExpired);
        };

        self.run(session, true).await
    }

    /// Execute a trade through an ephemeral session
    ///
    /// Used by instant purchases, deposit triggers and administrative
    /// overrides. A `Payment::Bypassed` (or zero-quantity) payment skips
    /// payment collection entirely.
    pub async fn execute_direct_trade(&self, request: TradeRequest) -> TradeResult {
        self.execute_ephemeral(request, Settlement::Full).await
    }

    /// Settle payment for an offering the party already took out of the container
    ///
    /// Never removes stock and never delivers the offering again.
    pub async fn execute_withdrawal_trade(&self, request: TradeRequest) -> TradeResult {
        self.execute_ephemeral(request, Settlement::PaymentOnly).await
    }

    async fn execute_ephemeral(&self, request: TradeRequest, settlement: Settlement) -> TradeResult {
        self.ensure_open()?;

        let shop = self
            .directory
            .resolve(request.location)
            .ok_or_else(|| TradeError::location_not_found(request.location))?;
        if shop.owner == request.party {
            return Err(TradeError::SelfTrade);
        }

        let mut session = TradeSession::new(
            request.party,
            request.location,
            request.source,
            self.clock.now(),
            self.config.session_timeout,
        )
        .with_terms(SessionTerms {
            offered: request.offered,
            offered_quantity: request.offered_quantity,
            payment: request.payment,
            settlement,
        });
        session.transition(TradeState::Validating)?;

        self.run(session, false).await
    }

    /// Validate, process and settle a session already moved to `Validating`
    ///
    /// `stored` sessions have every transition mirrored into the session map,
    /// so a concurrent cancellation is noticed before processing starts.
    async fn run(&self, mut session: TradeSession, stored: bool) -> TradeResult {
        let source = session.source;
        let result = self.run_inner(&mut session, stored).await;

        if let Err(error) = &result {
            if stored {
                if let Some(mut live) = self.sessions.get_mut(&session.id) {
                    let _ = live.transition(TradeState::Failed);
                }
                self.discard(&session);
            }
            self.report_failure(&session, source, error);
        }

        result
    }

    async fn run_inner(&self, session: &mut TradeSession, stored: bool) -> TradeResult {
        let location = self.directory.resolve(session.location);

        let validator = self.validator;
        let now = self.clock.now();
        let snapshot = session.clone();
        let shop = location.clone();
        let (online, validation) = self
            .main
            .run(move |world| {
                let container = shop
                    .as_deref()
                    .filter(|l| l.has_container())
                    .and_then(|l| world.container(l.id));
                let ctx = ValidationContext {
                    now,
                    acting_party: snapshot.party,
                    party_online: world.is_online(snapshot.party),
                    party_inventory: world.party_inventory(snapshot.party),
                    location: shop.as_deref(),
                    container,
                };
                (ctx.party_online, validator.validate(Some(&snapshot), &ctx))
            })
            .await?;

        if !online {
            return Err(TradeError::PartyOffline {
                party: session.party,
            });
        }
        if !validation.is_valid() {
            tracing::debug!(
                session_id = %session.id,
                errors = ?validation.errors,
                "trade validation failed"
            );
            return Err(TradeError::Validation(validation.errors));
        }
        for advisory in &validation.advisories {
            tracing::debug!(session_id = %session.id, advisory, "trade validation advisory");
        }

        let (Some(location), Some(terms)) = (location, session.terms().cloned()) else {
            return Err(TradeError::configuration("No item configured for trade"));
        };

        self.advance(session, stored, TradeState::Processing)?;

        let plan = ExchangePlan {
            party: session.party,
            location: location.id,
            has_container: location.has_container(),
            offered: terms.offered.clone(),
            offered_quantity: terms.offered_quantity,
            payment: terms.payment.clone(),
            settlement: terms.settlement,
        };
        let delivery = self
            .main
            .run(move |world| apply_exchange(world, &plan))
            .await?
            .map_err(TradeError::rolled_back)?;

        // The exchange is applied; from here on nothing may fail the trade
        if let Err(e) = self.advance(session, stored, TradeState::Completed) {
            tracing::warn!(session_id = %session.id, error = %e, "session vanished while processing");
        }
        if stored {
            self.discard(session);
        }

        let transaction_id = Uuid::new_v4();
        self.hand_to_ledger(TradeRecord {
            transaction_id,
            location_id: location.id,
            buyer: session.party,
            seller: location.owner,
            item: Some(terms.offered.kind.clone()),
            quantity: terms.offered_quantity,
            currency: terms.payment.item().map(|item| item.kind.clone()),
            price_paid: terms.payment.quantity(),
            source: session.source,
            status: TradeStatus::Completed,
            completed_at: Utc::now(),
        });

        self.notify(
            session.party,
            Notice::TradeCompleted {
                transaction_id,
                source: session.source,
            },
        );
        tracing::info!(
            %transaction_id,
            session_id = %session.id,
            party = session.party,
            location = location.id,
            source = %session.source,
            delivered = delivery.delivered,
            dropped = delivery.dropped,
            "trade completed"
        );

        Ok(TradeReceipt {
            transaction_id,
            source: session.source,
            delivered: delivery.delivered,
            dropped: delivery.dropped,
        })
    }

    /// Move `session` to `to`, through the map for stored sessions
    fn advance(
        &self,
        session: &mut TradeSession,
        stored: bool,
        to: TradeState,
    ) -> Result<(), TradeError> {
        if stored {
            let mut live = self
                .sessions
                .get_mut(&session.id)
                .ok_or(TradeError::SessionInactive)?;
            live.transition(to)?;
            *session = live.value().clone();
        } else {
            session.transition(to)?;
        }
        Ok(())
    }

    /// Hand a completed trade to the ledger without waiting for it
    fn hand_to_ledger(&self, record: TradeRecord) {
        let ledger = Arc::clone(&self.ledger);
        let fallback = Arc::clone(&self.fallback);
        let clock = Arc::clone(&self.clock);
        let guard = self.ledger_writes.start();

        tokio::spawn(async move {
            let _guard = guard;
            let transaction_id = record.transaction_id;
            match ledger.record(record).await {
                Ok(()) => fallback.record_success(),
                Err(e) => {
                    // The exchange already happened; only the record is lost
                    tracing::error!(%transaction_id, error = %e, "failed to persist trade record");
                    fallback.record_failure(clock.now(), &e.to_string());
                }
            }
        });
    }

    fn report_failure(&self, session: &TradeSession, source: TradeSource, error: &TradeError) {
        tracing::warn!(
            session_id = %session.id,
            party = session.party,
            location = session.location,
            %source,
            %error,
            "trade failed"
        );

        self.notify(
            session.party,
            Notice::TradeFailed {
                reason: error.to_string(),
            },
        );

        let failure = FailedTrade {
            party: session.party,
            location_id: session.location,
            reason: error.to_string(),
            source,
            failed_at: Utc::now(),
        };
        let ledger = Arc::clone(&self.ledger);
        let guard = self.ledger_writes.start();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = ledger.record_failure(failure).await {
                tracing::debug!(error = %e, "failed to record failed trade");
            }
        });
    }

    /// Post a notice to the main thread
    pub(crate) fn notify(&self, party: PartyId, notice: Notice) {
        if let Err(e) = self.main.post(move |world| world.notify(party, notice)) {
            tracing::warn!(party, error = %e, "could not deliver notice");
        }
    }

    /// Remove a finished session from both maps
    fn discard(&self, session: &TradeSession) {
        self.sessions.remove(&session.id);
        self.party_sessions
            .remove_if(&session.party, |_, id| *id == session.id);
    }

    /// Cancel a session that has not started processing
    ///
    /// # Returns
    ///
    /// `true` if the session existed and was cancelled; `false` if it was not
    /// found or is mid-exchange.
    pub fn cancel_session(&self, id: SessionId) -> bool {
        let Some((_, mut session)) = self
            .sessions
            .remove_if(&id, |_, s| s.state() != TradeState::Processing)
        else {
            return false;
        };

        let _ = session.transition(TradeState::Cancelled);
        self.party_sessions
            .remove_if(&session.party, |_, current| *current == id);
        tracing::debug!(session_id = %id, party = session.party, "trade session cancelled");
        true
    }

    /// Cancel every session held by `party`
    pub fn cancel_player_sessions(&self, party: PartyId) -> usize {
        let ids: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.party == party)
            .map(|entry| entry.id)
            .collect();

        ids.into_iter().filter(|id| self.cancel_session(*id)).count()
    }

    /// Remove every expired session that is not mid-exchange
    pub fn cleanup_expired_sessions(&self) -> usize {
        let now = self.clock.now();
        let ids: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.id)
            .collect();

        let removed = ids.into_iter().filter(|id| self.cancel_session(*id)).count();
        if removed > 0 {
            tracing::debug!(removed, "expired trade sessions cleaned up");
        }
        removed
    }

    /// Cancel every session targeting `location`
    ///
    /// Used by the ownership coordinator after a transfer.
    pub fn invalidate_sessions_for_shop(&self, location: LocationId) -> usize {
        self.invalidate_affected(location).len()
    }

    /// Cancel every session targeting `location`, returning the affected parties
    pub(crate) fn invalidate_affected(&self, location: LocationId) -> Vec<PartyId> {
        let targets: Vec<(SessionId, PartyId)> = self
            .sessions
            .iter()
            .filter(|entry| entry.location == location)
            .map(|entry| (entry.id, entry.party))
            .collect();

        let parties: Vec<PartyId> = targets
            .into_iter()
            .filter(|(id, _)| self.cancel_session(*id))
            .map(|(_, party)| party)
            .collect();

        if !parties.is_empty() {
            tracing::info!(
                location,
                invalidated = parties.len(),
                "trade sessions invalidated"
            );
        }
        parties
    }

    /// Number of sessions that are neither expired nor terminal
    pub fn active_session_count(&self) -> usize {
        let now = self.clock.now();
        self.sessions
            .iter()
            .filter(|entry| entry.is_active(now))
            .count()
    }

    /// Whether ledger writes are currently failing
    pub fn is_in_fallback_mode(&self) -> bool {
        self.fallback.is_in_fallback(self.clock.now())
    }

    pub fn consecutive_ledger_failures(&self) -> u32 {
        self.fallback.failure_count()
    }

    /// Time left before the ledger fallback window closes
    pub fn time_until_ledger_recovery(&self) -> Duration {
        self.fallback.time_until_recovery(self.clock.now())
    }

    /// Wait until every handed-off ledger write has finished
    pub async fn flush_ledger(&self) {
        self.ledger_writes.wait_idle().await;
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop accepting trades, cancel every idle session and wait for the ledger
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let ids: Vec<SessionId> = self.sessions.iter().map(|entry| entry.id).collect();
        let cancelled = ids.into_iter().filter(|id| self.cancel_session(*id)).count();

        self.flush_ledger().await;
        tracing::info!(cancelled, "trade engine shut down");
    }

    fn ensure_open(&self) -> Result<(), TradeError> {
        if self.is_shut_down() {
            return Err(DispatchError::Closed.into());
        }
        Ok(())
    }
}

/// Terms implied by a fixed-price location
fn fixed_terms(location: &Location) -> Option<SessionTerms> {
    let offered = location.offering.as_ref()?;
    let PaymentTerms::Fixed { item, quantity } = &location.terms else {
        return None;
    };

    Some(SessionTerms {
        offered: offered.clone(),
        offered_quantity: offered.amount,
        payment: Payment::Collect {
            item: item.clone(),
            quantity: *quantity,
        },
        settlement: Settlement::Full,
    })
}
