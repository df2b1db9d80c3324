//! Ownership transfer coordination
//!
//! Ownership changes for one location are serialized behind a lock; changes
//! for different locations proceed in parallel. Locks are striped by
//! location id, so the lock table has a fixed size no matter how many
//! locations exist.
//!
//! # Protocol
//!
//! While holding the location's stripe:
//!
//! 1. Check the initiator's permission
//! 2. Load the durable record; reject a transfer to the current owner
//! 3. Persist the record with the new owner
//! 4. Reload the live representation from the durable record
//! 5. If the reload fails, write the previous record back and report failure
//! 6. Cancel every session against the location and tell the affected parties
//! 7. Refresh the location's marker

use crate::core::engine::TradeEngine;
use crate::core::traits::{Initiator, LocationCache, LocationRepository, PermissionGate};
use crate::types::{Location, LocationId, OwnershipError, PartyId, RepositoryError};
use crate::world::{Notice, World};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Upper bound on any single repository or cache call
const STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Successful ownership transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipChange {
    pub location_id: LocationId,
    pub previous_owner: PartyId,
    pub new_owner: PartyId,

    /// Sessions cancelled because of the transfer
    pub sessions_invalidated: usize,
}

pub struct OwnershipCoordinator<W: World> {
    engine: Arc<TradeEngine<W>>,
    repository: Arc<dyn LocationRepository>,
    cache: Arc<dyn LocationCache>,
    permissions: Arc<dyn PermissionGate>,
    stripes: Vec<Mutex<()>>,
}

impl<W: World> OwnershipCoordinator<W> {
    /// Create a coordinator with the engine's configured number of lock stripes
    pub fn new(
        engine: Arc<TradeEngine<W>>,
        repository: Arc<dyn LocationRepository>,
        cache: Arc<dyn LocationCache>,
        permissions: Arc<dyn PermissionGate>,
    ) -> Self {
        let stripes = engine.config().lock_stripes.max(1);
        OwnershipCoordinator {
            engine,
            repository,
            cache,
            permissions,
            stripes: (0..stripes).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe(&self, location: LocationId) -> &Mutex<()> {
        &self.stripes[location as usize % self.stripes.len()]
    }

    pub fn can_transfer_ownership(&self, initiator: Initiator, location: LocationId) -> bool {
        self.permissions.can_transfer_ownership(initiator, location)
    }

    /// Transfer `location` to `new_owner`
    ///
    /// # Returns
    ///
    /// * `Ok(OwnershipChange)` with the previous owner and the number of
    ///   sessions invalidated
    /// * `Err(OwnershipError)` if any protocol step failed; the durable record
    ///   and the live cache agree in every case except a failed compensating
    ///   write (`ReloadFailed { rolled_back: false }`)
    pub async fn transfer_ownership(
        &self,
        location: LocationId,
        new_owner: PartyId,
        initiator: Initiator,
    ) -> Result<OwnershipChange, OwnershipError> {
        let _guard = self.stripe(location).lock().await;

        if !self.can_transfer_ownership(initiator, location) {
            tracing::debug!(location, ?initiator, "ownership change permission denied");
            return Err(OwnershipError::PermissionDenied);
        }

        let existing = with_timeout(self.repository.find_by_id(location))
            .await?
            .ok_or(OwnershipError::LocationNotFound { location })?;

        let previous_owner = existing.owner;
        if previous_owner == new_owner {
            return Err(OwnershipError::SameOwner);
        }

        with_timeout(self.repository.save(existing.with_owner(new_owner))).await?;

        let reloaded = match with_timeout(self.cache.reload(location)).await {
            Ok(reloaded) => reloaded,
            Err(reload_error) => {
                return Err(self.compensate(existing, reload_error).await);
            }
        };

        let affected = self.engine.invalidate_affected(location);
        for party in &affected {
            self.engine
                .notify(*party, Notice::OwnershipChanged { location });
        }
        self.refresh_marker(reloaded);

        tracing::info!(
            location,
            previous_owner,
            new_owner,
            sessions_invalidated = affected.len(),
            "shop ownership changed"
        );

        Ok(OwnershipChange {
            location_id: location,
            previous_owner,
            new_owner,
            sessions_invalidated: affected.len(),
        })
    }

    /// Write the previous record back after a failed reload
    async fn compensate(&self, previous: Location, reload_error: RepositoryError) -> OwnershipError {
        let location = previous.id;
        tracing::error!(location, error = %reload_error, "cache reload failed, rolling back ownership change");

        match with_timeout(self.repository.save(previous)).await {
            Ok(()) => OwnershipError::ReloadFailed { rolled_back: true },
            Err(e) => {
                tracing::error!(location, error = %e, "failed to roll back ownership change");
                OwnershipError::ReloadFailed { rolled_back: false }
            }
        }
    }

    fn refresh_marker(&self, location: Arc<Location>) {
        let id = location.id;
        let posted = self
            .engine
            .main_thread()
            .post(move |world| world.refresh_marker(&location));
        if let Err(e) = posted {
            tracing::warn!(location = id, error = %e, "could not refresh marker");
        }
    }
}

async fn with_timeout<T, F>(call: F) -> Result<T, RepositoryError>
where
    F: Future<Output = Result<T, RepositoryError>>,
{
    tokio::time::timeout(STORAGE_TIMEOUT, call)
        .await
        .map_err(|_| RepositoryError::Backend("timed out".to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::dispatch::MainThread;
    use crate::store::{MemoryLedger, ShopRegistry, StaticPermissions};
    use crate::types::{ItemStack, PaymentTerms, Position};
    use crate::world::InMemoryWorld;

    const SHOP: LocationId = 4;
    const OWNER: PartyId = 1;
    const BUYER: PartyId = 2;
    const ADMIN: PartyId = 99;

    struct Harness {
        coordinator: OwnershipCoordinator<InMemoryWorld>,
        engine: Arc<TradeEngine<InMemoryWorld>>,
        registry: Arc<ShopRegistry>,
    }

    fn harness() -> Harness {
        let mut world = InMemoryWorld::new();
        world.add_party(BUYER, 9, Position::default());
        world.add_container(SHOP, 9);

        let registry = Arc::new(ShopRegistry::new());
        registry.insert(
            Location::new(SHOP, OWNER, "Gems")
                .with_offering(ItemStack::new("DIAMOND", 1))
                .with_terms(PaymentTerms::Fixed {
                    item: ItemStack::new("EMERALD", 1),
                    quantity: 2,
                }),
        );

        let engine = Arc::new(TradeEngine::new(
            MainThread::spawn(world).unwrap(),
            registry.clone(),
            Arc::new(MemoryLedger::new()),
            EngineConfig::default(),
        ));
        let coordinator = OwnershipCoordinator::new(
            engine.clone(),
            registry.clone(),
            registry.clone(),
            Arc::new(StaticPermissions::new([ADMIN])),
        );

        Harness {
            coordinator,
            engine,
            registry,
        }
    }

    #[tokio::test]
    async fn test_transfer_invalidates_sessions_and_notifies() {
        let h = harness();
        h.engine.initiate_trade(BUYER, SHOP).unwrap();

        let change = h
            .coordinator
            .transfer_ownership(SHOP, 7, Initiator::Party(ADMIN))
            .await
            .unwrap();

        assert_eq!(change.previous_owner, OWNER);
        assert_eq!(change.new_owner, 7);
        assert_eq!(change.sessions_invalidated, 1);
        assert_eq!(h.registry.durable(SHOP).map(|l| l.owner), Some(7));
        assert_eq!(h.registry.live(SHOP).map(|l| l.owner), Some(7));

        let (notices, refreshes) = h
            .engine
            .main_thread()
            .run(|world| {
                (
                    world.notices_for(BUYER).into_iter().cloned().collect::<Vec<_>>(),
                    world.marker_refreshes().to_vec(),
                )
            })
            .await
            .unwrap();
        assert_eq!(notices, vec![Notice::OwnershipChanged { location: SHOP }]);
        assert_eq!(refreshes, vec![SHOP]);
    }

    #[tokio::test]
    async fn test_permission_and_same_owner() {
        let h = harness();

        assert_eq!(
            h.coordinator
                .transfer_ownership(SHOP, 7, Initiator::Party(BUYER))
                .await,
            Err(OwnershipError::PermissionDenied)
        );
        assert_eq!(
            h.coordinator
                .transfer_ownership(SHOP, OWNER, Initiator::Console)
                .await,
            Err(OwnershipError::SameOwner)
        );
        assert_eq!(
            h.coordinator
                .transfer_ownership(404, 7, Initiator::Console)
                .await,
            Err(OwnershipError::LocationNotFound { location: 404 })
        );
    }

    #[tokio::test]
    async fn test_reload_failure_rolls_back_durable_record() {
        let h = harness();
        h.registry.fail_next_reload();

        let result = h
            .coordinator
            .transfer_ownership(SHOP, 7, Initiator::Console)
            .await;

        assert_eq!(result, Err(OwnershipError::ReloadFailed { rolled_back: true }));
        assert_eq!(h.registry.durable(SHOP).map(|l| l.owner), Some(OWNER));
        assert_eq!(h.registry.live(SHOP).map(|l| l.owner), Some(OWNER));
    }
}
