//! In-memory location registry
//!
//! Holds two copies of every location: the durable record, and the live
//! representation the engine resolves on every trade. They only diverge
//! between a `save` and the following `reload`.

use crate::core::traits::{LocationCache, LocationDirectory, LocationRepository};
use crate::types::{Location, LocationId, RepositoryError};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::{self, BoxFuture};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Location records plus their live cache, backed by `DashMap`
#[derive(Debug, Default)]
pub struct ShopRegistry {
    durable: DashMap<LocationId, Location>,
    live: DashMap<LocationId, Arc<Location>>,

    /// Number of upcoming reloads that should fail
    failing_reloads: AtomicU32,

    /// Number of upcoming saves that should fail
    failing_saves: AtomicU32,
}

impl ShopRegistry {
    pub fn new() -> Self {
        ShopRegistry::default()
    }

    /// Register a location in both the durable store and the live cache
    pub fn insert(&self, location: Location) {
        self.live.insert(location.id, Arc::new(location.clone()));
        self.durable.insert(location.id, location);
    }

    /// Remove a location from both copies
    pub fn remove(&self, location: LocationId) -> Option<Location> {
        self.live.remove(&location);
        self.durable.remove(&location).map(|(_, record)| record)
    }

    /// Durable record of a location
    pub fn durable(&self, location: LocationId) -> Option<Location> {
        self.durable.get(&location).map(|record| record.value().clone())
    }

    /// Live representation of a location
    pub fn live(&self, location: LocationId) -> Option<Arc<Location>> {
        self.live.get(&location).map(|shop| Arc::clone(shop.value()))
    }

    /// Make the next reload fail
    pub fn fail_next_reload(&self) {
        self.failing_reloads.fetch_add(1, Ordering::SeqCst);
    }

    /// Make the next `count` saves fail
    pub fn fail_next_saves(&self, count: u32) {
        self.failing_saves.fetch_add(count, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.durable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durable.is_empty()
    }

    fn take_injected(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn save_now(&self, mut location: Location) -> Result<(), RepositoryError> {
        if Self::take_injected(&self.failing_saves) {
            return Err(RepositoryError::Backend("injected save failure".to_string()));
        }
        location.last_modified = Utc::now();
        self.durable.insert(location.id, location);
        Ok(())
    }

    fn reload_now(&self, location: LocationId) -> Result<Arc<Location>, RepositoryError> {
        if Self::take_injected(&self.failing_reloads) {
            return Err(RepositoryError::Backend(
                "injected reload failure".to_string(),
            ));
        }
        let record = self
            .durable(location)
            .ok_or(RepositoryError::Missing { location })?;

        let shop = Arc::new(record);
        self.live.insert(location, Arc::clone(&shop));
        Ok(shop)
    }
}

impl LocationDirectory for ShopRegistry {
    fn resolve(&self, location: LocationId) -> Option<Arc<Location>> {
        self.live(location)
    }
}

impl LocationRepository for ShopRegistry {
    fn find_by_id(
        &self,
        location: LocationId,
    ) -> BoxFuture<'_, Result<Option<Location>, RepositoryError>> {
        Box::pin(future::ready(Ok(self.durable(location))))
    }

    fn save(&self, location: Location) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(future::ready(self.save_now(location)))
    }
}

impl LocationCache for ShopRegistry {
    fn reload(&self, location: LocationId) -> BoxFuture<'_, Result<Arc<Location>, RepositoryError>> {
        Box::pin(future::ready(self.reload_now(location)))
    }
}
