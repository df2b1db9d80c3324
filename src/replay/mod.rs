//! Scenario replay
//!
//! Drives a scenario file through the engine end to end and reports the
//! final holdings of every party, container and the ground.
//!
//! # Architecture
//!
//! ```text
//! replay_file
//!     ├── tokio multi-thread runtime (`workers` threads)
//!     ├── ScenarioReader (streaming steps)
//!     └── ScenarioRunner
//!         ├── TradeEngine<InMemoryWorld>   (+ session sweeper)
//!         ├── AutoExchangeHandler          (deposit / withdraw steps)
//!         ├── OwnershipCoordinator         (transfer steps)
//!         └── ShopRegistry, ManualClock, ledger
//! ```
//!
//! Steps run strictly in file order. The replay clock only moves on `wait`
//! steps, so expiry and debouncing are deterministic.
//!
//! The runner also plays the host's part around the auto-exchange triggers:
//! a deposit moves the items into the container before the trigger runs, and
//! a withdrawal moves the offering out of it. A rejected withdrawal is put
//! back; a rejected deposit stays in the container.

use crate::config::EngineConfig;
use crate::core::auto_exchange::AutoExchangeHandler;
use crate::core::clock::ManualClock;
use crate::core::dispatch::MainThread;
use crate::core::engine::{TradeEngine, TradeRequest};
use crate::core::ownership::OwnershipCoordinator;
use crate::core::session::SessionTerms;
use crate::core::sweeper::spawn_session_sweeper;
use crate::core::traits::TradeLedger;
use crate::io::csv_format::write_holdings_csv;
use crate::io::csv_ledger::CsvTradeLedger;
use crate::io::scenario::{ScenarioReader, Step};
use crate::store::{AutoExchangeOptOut, MemoryLedger, ShopRegistry, StaticPermissions};
use crate::types::{
    AcceptedPayment, ItemStack, Location, LocationId, PartyId, Payment, PaymentTerms, Settlement,
    Stock, TradeError, TradeResult, TradeSource,
};
use crate::world::memory::{CONTAINER_SIZE, PARTY_INVENTORY_SIZE};
use crate::world::{Holding, InMemoryWorld, World};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Replay settings
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub config: EngineConfig,

    /// Runtime worker threads
    pub workers: usize,

    /// Append completed trades to this CSV file instead of keeping them in memory
    pub ledger: Option<PathBuf>,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        ReplayOptions {
            config: EngineConfig::default(),
            workers: num_cpus::get(),
            ledger: None,
        }
    }
}

/// Counts of what happened during a replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Rows applied
    pub steps: usize,

    pub trades_completed: usize,
    pub trades_failed: usize,

    /// Rows that could not be parsed or referred to something missing
    pub skipped: usize,
}

/// Outcome of a single step
#[derive(Debug)]
enum StepOutcome {
    Applied,
    Trade(TradeResult),
    Skipped(String),
}

/// Replay a scenario file and write the final holdings to `output`
///
/// # Errors
///
/// Fatal problems only: the scenario cannot be opened, the runtime or main
/// thread cannot start, the ledger file cannot be created, or the report
/// cannot be written. Bad rows and failed trades are logged and counted.
pub fn replay_file(
    path: &Path,
    options: &ReplayOptions,
    output: &mut dyn Write,
) -> Result<ReplaySummary, String> {
    let steps = ScenarioReader::open(path)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(options.workers.max(1))
        .enable_time()
        .build()
        .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

    runtime.block_on(async {
        let ledger: Arc<dyn TradeLedger> = match &options.ledger {
            Some(path) => Arc::new(CsvTradeLedger::create(path).map_err(|e| e.to_string())?),
            None => Arc::new(MemoryLedger::new()),
        };
        let runner = ScenarioRunner::start(options.config.clone(), ledger)?;

        let mut summary = ReplaySummary::default();
        for (index, step) in steps.enumerate() {
            let outcome = match step {
                Ok(step) => runner.apply(step).await,
                Err(e) => StepOutcome::Skipped(e),
            };
            summary.record(index + 1, &outcome);
        }

        let holdings = runner.finish().await?;
        write_holdings_csv(&holdings, output)?;

        tracing::info!(
            steps = summary.steps,
            completed = summary.trades_completed,
            failed = summary.trades_failed,
            skipped = summary.skipped,
            "scenario replayed"
        );
        Ok(summary)
    })
}

impl ReplaySummary {
    fn record(&mut self, row: usize, outcome: &StepOutcome) {
        match outcome {
            StepOutcome::Applied => self.steps += 1,
            StepOutcome::Trade(Ok(receipt)) => {
                self.steps += 1;
                self.trades_completed += 1;
                tracing::debug!(row, transaction_id = %receipt.transaction_id, "trade step completed");
            }
            StepOutcome::Trade(Err(e)) => {
                self.steps += 1;
                self.trades_failed += 1;
                tracing::debug!(row, error = %e, "trade step failed");
            }
            StepOutcome::Skipped(reason) => {
                self.skipped += 1;
                tracing::warn!(row, %reason, "scenario row skipped");
            }
        }
    }
}

/// Every component of a running engine, wired the way a host would
pub struct ScenarioRunner {
    engine: Arc<TradeEngine<InMemoryWorld>>,
    auto_exchange: AutoExchangeHandler<InMemoryWorld>,
    ownership: OwnershipCoordinator<InMemoryWorld>,
    registry: Arc<ShopRegistry>,
    permissions: Arc<StaticPermissions>,
    preferences: Arc<AutoExchangeOptOut>,
    clock: Arc<ManualClock>,
    sweeper: tokio::task::JoinHandle<()>,
}

impl ScenarioRunner {
    /// Start the main thread and the engine; must be called inside a runtime
    pub fn start(config: EngineConfig, ledger: Arc<dyn TradeLedger>) -> Result<Self, String> {
        let main = MainThread::spawn(InMemoryWorld::new()).map_err(|e| e.to_string())?;
        let registry = Arc::new(ShopRegistry::new());
        let permissions = Arc::new(StaticPermissions::default());
        let preferences = Arc::new(AutoExchangeOptOut::new());
        let clock = Arc::new(ManualClock::new(0));
        let sweep_interval = config.sweep_interval;

        let engine = Arc::new(
            TradeEngine::new(main, registry.clone(), ledger, config).with_clock(clock.clone()),
        );
        let auto_exchange =
            AutoExchangeHandler::new(engine.clone(), registry.clone(), preferences.clone());
        let ownership = OwnershipCoordinator::new(
            engine.clone(),
            registry.clone(),
            registry.clone(),
            permissions.clone(),
        );
        let sweeper = spawn_session_sweeper(Arc::downgrade(&engine), sweep_interval);

        Ok(ScenarioRunner {
            engine,
            auto_exchange,
            ownership,
            registry,
            permissions,
            preferences,
            clock,
            sweeper,
        })
    }

    pub fn engine(&self) -> &Arc<TradeEngine<InMemoryWorld>> {
        &self.engine
    }

    async fn apply(&self, step: Step) -> StepOutcome {
        match step {
            Step::AddParty { party, slots } => {
                let slots = slots.unwrap_or(PARTY_INVENTORY_SIZE);
                self.on_world(move |world| {
                    world.add_party(party, slots, Default::default());
                })
                .await
            }
            Step::Give {
                party,
                item,
                quantity,
            } => {
                self.on_world(move |world| {
                    let placed = world.give(party, &item, quantity);
                    if placed < quantity {
                        tracing::warn!(party, placed, quantity, "inventory full while giving items");
                    }
                })
                .await
            }
            Step::OpenShop {
                owner,
                location,
                offering,
                price,
                infinite,
            } => self.open_shop(owner, location, offering, price, infinite).await,
            Step::Accept {
                location,
                item,
                quantity,
            } => self.accept(location, item, quantity),
            Step::Stock {
                location,
                item,
                quantity,
            } => {
                self.on_world(move |world| {
                    world.stock(location, &item, quantity);
                })
                .await
            }
            Step::Trade {
                party,
                location,
                payment,
            } => StepOutcome::Trade(self.dialog_trade(party, location, payment).await),
            Step::Instant { party, location } => {
                StepOutcome::Trade(self.instant_trade(party, location).await)
            }
            Step::Deposit {
                party,
                location,
                item,
                quantity,
            } => self.deposit(party, location, item, quantity).await,
            Step::Withdraw {
                party,
                location,
                quantity,
            } => self.withdraw(party, location, quantity).await,
            Step::Admin {
                party,
                location,
                quantity,
            } => StepOutcome::Trade(self.admin_trade(party, location, quantity).await),
            Step::Transfer {
                initiator,
                location,
                new_owner,
            } => match self
                .ownership
                .transfer_ownership(location, new_owner, initiator)
                .await
            {
                Ok(_) => StepOutcome::Applied,
                Err(e) => {
                    tracing::info!(location, new_owner, error = %e, "ownership transfer rejected");
                    StepOutcome::Applied
                }
            },
            Step::Grant { party } => {
                self.permissions.grant(party);
                StepOutcome::Applied
            }
            Step::Logout { party } => {
                let outcome = self
                    .on_world(move |world| world.set_online(party, false))
                    .await;
                self.engine.cancel_player_sessions(party);
                outcome
            }
            Step::SetAutoExchange { party, enabled } => {
                self.preferences.set_enabled(party, enabled);
                StepOutcome::Applied
            }
            Step::Wait { millis } => {
                self.clock.advance(Duration::from_millis(millis));
                StepOutcome::Applied
            }
        }
    }

    async fn on_world<F>(&self, task: F) -> StepOutcome
    where
        F: FnOnce(&mut InMemoryWorld) + Send + 'static,
    {
        match self.engine.main_thread().run(task).await {
            Ok(()) => StepOutcome::Applied,
            Err(e) => StepOutcome::Skipped(e.to_string()),
        }
    }

    async fn open_shop(
        &self,
        owner: PartyId,
        location: LocationId,
        offering: ItemStack,
        price: Option<(ItemStack, u32)>,
        infinite: bool,
    ) -> StepOutcome {
        let terms = match price {
            Some((item, quantity)) => PaymentTerms::Fixed { item, quantity },
            None => PaymentTerms::Unconfigured,
        };
        let stock = if infinite {
            Stock::Infinite
        } else {
            Stock::Container
        };

        self.registry.insert(
            Location::new(location, owner, format!("Shop #{}", location))
                .with_offering(offering)
                .with_terms(terms)
                .with_stock(stock),
        );
        if infinite {
            return StepOutcome::Applied;
        }
        self.on_world(move |world| world.add_container(location, CONTAINER_SIZE))
            .await
    }

    /// Add an accepted payment, turning the location into a barter location
    fn accept(&self, location: LocationId, item: ItemStack, quantity: u32) -> StepOutcome {
        let Some(mut shop) = self.registry.durable(location) else {
            return StepOutcome::Skipped(format!("Shop #{} not found", location));
        };

        let mut accepted = shop.accepted_payments();
        accepted.push(AcceptedPayment { item, quantity });
        shop.terms = PaymentTerms::Barter(accepted);
        self.registry.insert(shop);
        StepOutcome::Applied
    }

    async fn dialog_trade(
        &self,
        party: PartyId,
        location: LocationId,
        payment: Option<(ItemStack, u32)>,
    ) -> TradeResult {
        let session = self.engine.initiate_trade(party, location)?;

        if session.terms().is_none() {
            let shop = self.shop(location)?;
            let offered = shop
                .offering
                .clone()
                .ok_or_else(|| TradeError::configuration("No item configured for trade"))?;
            let (item, quantity) = payment
                .or_else(|| {
                    shop.accepted_payments()
                        .into_iter()
                        .next()
                        .map(|accepted| (accepted.item, accepted.quantity))
                })
                .ok_or_else(|| TradeError::configuration("Shop not configured"))?;

            self.engine.set_session_terms(
                session.id,
                SessionTerms {
                    offered_quantity: offered.amount,
                    offered,
                    payment: Payment::Collect { item, quantity },
                    settlement: Settlement::Full,
                },
            )?;
        }

        self.engine.confirm_session(session.id)?;
        self.engine.execute_trade(session.id).await
    }

    async fn instant_trade(&self, party: PartyId, location: LocationId) -> TradeResult {
        let shop = self.shop(location)?;
        let offered = shop
            .offering
            .clone()
            .ok_or_else(|| TradeError::configuration("No item configured for trade"))?;
        let price = shop
            .accepted_payments()
            .into_iter()
            .next()
            .ok_or_else(|| TradeError::configuration("Shop not configured"))?;

        self.engine
            .execute_direct_trade(TradeRequest {
                party,
                location,
                offered_quantity: offered.amount,
                offered,
                payment: Payment::Collect {
                    item: price.item,
                    quantity: price.quantity,
                },
                source: TradeSource::InstantPurchase,
            })
            .await
    }

    async fn admin_trade(&self, party: PartyId, location: LocationId, quantity: u32) -> TradeResult {
        let shop = self.shop(location)?;
        let offered = shop
            .offering
            .clone()
            .ok_or_else(|| TradeError::configuration("No item configured for trade"))?;

        self.engine
            .execute_direct_trade(TradeRequest {
                party,
                location,
                offered,
                offered_quantity: quantity,
                payment: Payment::Bypassed,
                source: TradeSource::AdminOverride,
            })
            .await
    }

    async fn deposit(
        &self,
        party: PartyId,
        location: LocationId,
        item: ItemStack,
        quantity: u32,
    ) -> StepOutcome {
        let moved = {
            let item = item.clone();
            self.engine
                .main_thread()
                .run(move |world| move_items(world, party, location, &item, quantity, true))
                .await
        };
        match moved {
            Ok(true) => {}
            Ok(false) => {
                return StepOutcome::Skipped(format!(
                    "party {} cannot deposit {} {}",
                    party, quantity, item.kind
                ))
            }
            Err(e) => return StepOutcome::Skipped(e.to_string()),
        }

        StepOutcome::Trade(
            self.auto_exchange
                .on_payment_deposit(party, location, &item.with_amount(quantity))
                .await,
        )
    }

    async fn withdraw(&self, party: PartyId, location: LocationId, quantity: u32) -> StepOutcome {
        let offering = match self.shop(location).map(|shop| shop.offering.clone()) {
            Ok(Some(offering)) => offering,
            Ok(None) => return StepOutcome::Skipped(format!("Shop #{} has no offering", location)),
            Err(e) => return StepOutcome::Skipped(e.to_string()),
        };

        let moved = {
            let offering = offering.clone();
            self.engine
                .main_thread()
                .run(move |world| move_items(world, party, location, &offering, quantity, false))
                .await
        };
        match moved {
            Ok(true) => {}
            Ok(false) => {
                return StepOutcome::Skipped(format!(
                    "party {} cannot take {} {} from shop #{}",
                    party, quantity, offering.kind, location
                ))
            }
            Err(e) => return StepOutcome::Skipped(e.to_string()),
        }

        let result = self
            .auto_exchange
            .on_offering_withdrawal(party, location, &offering, quantity)
            .await;

        if result.is_err() {
            // The take is cancelled: the offering goes back into the container
            let returned = self
                .engine
                .main_thread()
                .run(move |world| move_items(world, party, location, &offering, quantity, true))
                .await;
            if !matches!(returned, Ok(true)) {
                tracing::warn!(party, location, quantity, "could not return withdrawn offering");
            }
        }
        StepOutcome::Trade(result)
    }

    fn shop(&self, location: LocationId) -> Result<Arc<Location>, TradeError> {
        self.registry
            .live(location)
            .ok_or_else(|| TradeError::location_not_found(location))
    }

    /// Shut the engine down and collect the final holdings
    pub async fn finish(self) -> Result<Vec<Holding>, String> {
        self.engine.shutdown().await;
        self.sweeper.abort();

        self.engine
            .main_thread()
            .run(|world| world.holdings())
            .await
            .map_err(|e| e.to_string())
    }
}

/// Move items between a party and a location's container, all or nothing
///
/// `to_container` picks the direction.
fn move_items(
    world: &mut InMemoryWorld,
    party: PartyId,
    location: LocationId,
    item: &ItemStack,
    quantity: u32,
    to_container: bool,
) -> bool {
    let fits = if to_container {
        world
            .container(location)
            .is_some_and(|container| container.free_space(item) >= quantity)
            && world
                .party_inventory(party)
                .is_some_and(|inventory| inventory.count(item) >= quantity)
    } else {
        world
            .party_inventory(party)
            .is_some_and(|inventory| inventory.free_space(item) >= quantity)
            && world
                .container(location)
                .is_some_and(|container| container.count(item) >= quantity)
    };
    if !fits {
        return false;
    }

    let (removed, added) = if to_container {
        let removed = world
            .party_inventory_mut(party)
            .is_some_and(|inventory| inventory.remove(item, quantity));
        (removed, world.stock(location, item, quantity))
    } else {
        let removed = world.take_from_container(location, item, quantity);
        (removed, world.give(party, item, quantity))
    };
    removed && added == quantity
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn scenario(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "op,party,location,item,qty,price_item,price_qty\n{}", body).unwrap();
        file.flush().unwrap();
        file
    }

    fn replay(body: &str, options: &ReplayOptions) -> (ReplaySummary, String) {
        let file = scenario(body);
        let mut output = Vec::new();
        let summary = replay_file(file.path(), options, &mut output).unwrap();
        (summary, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_instant_purchase() {
        let (summary, output) = replay(
            "party,1,,,,,\n\
             party,2,,,,,\n\
             give,1,,EMERALD,10,,\n\
             shop,2,10,DIAMOND,3,EMERALD,5\n\
             stock,,10,DIAMOND,9,,\n\
             instant,1,10,,,,\n",
            &ReplayOptions::default(),
        );

        assert_eq!(summary.trades_completed, 1);
        assert_eq!(
            output,
            "holder,item,quantity\n\
             party:1,DIAMOND,3\n\
             party:1,EMERALD,5\n\
             shop:10,DIAMOND,6\n\
             shop:10,EMERALD,5\n"
        );
    }

    #[test]
    fn test_ledger_file_is_written() {
        let ledger = NamedTempFile::new().unwrap();
        let options = ReplayOptions {
            ledger: Some(ledger.path().to_path_buf()),
            workers: 2,
            ..ReplayOptions::default()
        };

        let (summary, _) = replay(
            "party,1,,,,,\n\
             admin_shop,2,10,DIAMOND,1,,\n\
             admin,1,10,,4,,\n",
            &options,
        );

        assert_eq!(summary.trades_completed, 1);
        let written = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(written.lines().count(), 2);
        assert!(written.contains(",DIAMOND,4,,0,admin_override,completed,"));
    }

    #[test]
    fn test_bad_rows_are_skipped() {
        let (summary, output) = replay(
            "party,1,,,,,\nexplode,1,,,,,\naccept,,99,,,EMERALD,1\n",
            &ReplayOptions::default(),
        );

        assert_eq!(summary.steps, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(output, "holder,item,quantity\n");
    }

    #[test]
    fn test_missing_scenario() {
        let mut output = Vec::new();
        let result = replay_file(
            Path::new("nonexistent.csv"),
            &ReplayOptions::default(),
            &mut output,
        );
        assert!(result.unwrap_err().contains("Failed to open file"));
    }
}
