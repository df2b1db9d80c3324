//! Periodic expired-session sweep
//!
//! Expired sessions are also removed lazily on access; the sweeper keeps the
//! map from growing when parties walk away without touching their session
//! again.

use crate::core::engine::TradeEngine;
use crate::world::World;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Run `cleanup_expired_sessions` every `interval`
///
/// The task holds only a weak reference and stops once the engine is dropped
/// or shut down.
pub fn spawn_session_sweeper<W: World>(
    engine: Weak<TradeEngine<W>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(engine) = engine.upgrade() else {
                break;
            };
            if engine.is_shut_down() {
                break;
            }
            engine.cleanup_expired_sessions();
        }

        tracing::debug!("session sweeper stopped");
    })
}
