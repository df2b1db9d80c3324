//! Trade sessions
//!
//! A session is the bounded-lifetime record of one prospective trade. It
//! refers to its storage location by id only: the live location is resolved
//! again every time the session is used, since an ownership transfer may have
//! replaced it in the meantime.
//!
//! # State Machine
//!
//! ```text
//! Initiated ──► AwaitingBuyerConfirm ──► AwaitingFinalConfirm
//!     │                 │                        │
//!     └─────────────────┴──────► Validating ◄────┘
//!                                    │
//!                                    ▼
//!                               Processing ──► Completed | Failed
//! ```
//!
//! Every non-terminal state except `Processing` may also move to `Cancelled`
//! or `Failed`. Terminal states never change.

use crate::core::clock::{duration_millis, Timestamp};
use crate::types::{
    ItemStack, LocationId, PartyId, Payment, SessionError, Settlement, TradeSource, TradeState,
};
use std::time::Duration;
use uuid::Uuid;

/// Session identifier
pub type SessionId = Uuid;

/// What is being exchanged, fixed once set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTerms {
    /// Offered item descriptor
    pub offered: ItemStack,

    /// Total offered quantity
    pub offered_quantity: u32,

    /// What the party pays, if anything
    pub payment: Payment,

    pub settlement: Settlement,
}

/// One prospective trade between a party and a storage location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeSession {
    pub id: SessionId,

    /// The initiating party
    pub party: PartyId,

    /// Target storage location, resolved at use time
    pub location: LocationId,

    pub source: TradeSource,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    state: TradeState,
    terms: Option<SessionTerms>,
}

impl TradeSession {
    /// Create a new session in the `Initiated` state
    ///
    /// # Arguments
    ///
    /// * `party` - The initiating party
    /// * `location` - Target storage location id
    /// * `source` - Entry point the trade came through
    /// * `now` - Creation timestamp
    /// * `timeout` - Fixed lifetime; the expiry never moves afterwards
    pub fn new(
        party: PartyId,
        location: LocationId,
        source: TradeSource,
        now: Timestamp,
        timeout: Duration,
    ) -> Self {
        TradeSession {
            id: Uuid::new_v4(),
            party,
            location,
            source,
            created_at: now,
            expires_at: now.saturating_add(duration_millis(timeout)),
            state: TradeState::Initiated,
            terms: None,
        }
    }

    /// Attach terms at construction (used for ephemeral sessions)
    pub fn with_terms(mut self, terms: SessionTerms) -> Self {
        self.terms = Some(terms);
        self
    }

    pub fn state(&self) -> TradeState {
        self.state
    }

    pub fn terms(&self) -> Option<&SessionTerms> {
        self.terms.as_ref()
    }

    /// Whether `now` is past the fixed expiry
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }

    /// Not expired and not terminal
    pub fn is_active(&self, now: Timestamp) -> bool {
        !self.is_expired(now) && !self.state.is_terminal()
    }

    /// Time left before expiry; zero once expired
    pub fn remaining(&self, now: Timestamp) -> Duration {
        Duration::from_millis(self.expires_at.saturating_sub(now))
    }

    /// Whether the state machine permits `from -> to`
    pub fn can_transition(from: TradeState, to: TradeState) -> bool {
        use TradeState::*;

        match from {
            Initiated => matches!(
                to,
                AwaitingBuyerConfirm | Validating | Cancelled | Failed
            ),
            AwaitingBuyerConfirm => matches!(
                to,
                AwaitingFinalConfirm | Validating | Cancelled | Failed
            ),
            AwaitingFinalConfirm => matches!(to, Validating | Cancelled | Failed),
            Validating => matches!(to, Processing | Cancelled | Failed),
            // Once processing, the exchange runs to completion
            Processing => matches!(to, Completed | Failed),
            Completed | Failed | Cancelled => false,
        }
    }

    /// Move the session to `to`
    ///
    /// # Errors
    ///
    /// * `SessionError::Terminal` if the session already reached a terminal state
    /// * `SessionError::IllegalTransition` if the move is not part of the state machine
    pub fn transition(&mut self, to: TradeState) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::Terminal { state: self.state });
        }
        if !Self::can_transition(self.state, to) {
            return Err(SessionError::IllegalTransition {
                from: self.state,
                to,
            });
        }

        self.state = to;
        Ok(())
    }

    /// Set the terms of the trade
    ///
    /// Terms can be set exactly once per session.
    pub fn set_terms(&mut self, terms: SessionTerms) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::Terminal { state: self.state });
        }
        if self.terms.is_some() {
            return Err(SessionError::TermsAlreadySet);
        }

        self.terms = Some(terms);
        Ok(())
    }
}
