//! Engine-level integration tests
//!
//! Each test wires a full engine (main thread, in-memory world, registry,
//! ledger, auto-exchange handler) and drives it through the public API only.

#[cfg(test)]
mod tests {
    use barter_trade_engine::core::{
        AutoExchangeHandler, MainThread, ManualClock, TradeEngine, TradeRequest,
    };
    use barter_trade_engine::store::{AutoExchangeOptOut, MemoryLedger, ShopRegistry};
    use barter_trade_engine::types::{
        AcceptedPayment, ItemStack, Location, LocationId, PartyId, Payment, PaymentTerms,
        RollbackReason, Stock, TradeError, TradeSource, TradeState,
    };
    use barter_trade_engine::world::{Holder, Holding, InMemoryWorld, Notice};
    use barter_trade_engine::EngineConfig;
    use rstest::rstest;
    use std::sync::Arc;
    use std::task::Poll;
    use std::time::Duration;

    const BUYER: PartyId = 1;
    const OWNER: PartyId = 2;
    const SHOP: LocationId = 10;

    struct Setup {
        engine: Arc<TradeEngine<InMemoryWorld>>,
        handler: AutoExchangeHandler<InMemoryWorld>,
        ledger: Arc<MemoryLedger>,
        clock: Arc<ManualClock>,
        preferences: Arc<AutoExchangeOptOut>,
    }

    fn emerald() -> ItemStack {
        ItemStack::new("EMERALD", 1)
    }

    fn diamond() -> ItemStack {
        ItemStack::new("DIAMOND", 1)
    }

    /// Barter shop: 1 diamond per 3 emeralds, 64 diamonds in stock
    fn barter_shop() -> Location {
        Location::new(SHOP, OWNER, "Gems")
            .with_offering(diamond())
            .with_terms(PaymentTerms::Barter(vec![AcceptedPayment {
                item: emerald(),
                quantity: 3,
            }]))
    }

    fn setup(location: Location, configure: impl FnOnce(&mut InMemoryWorld)) -> Setup {
        let mut world = InMemoryWorld::new();
        world.add_party(BUYER, 36, Default::default());
        world.add_container(SHOP, 27);
        world.give(BUYER, &emerald(), 30);
        world.stock(SHOP, &diamond(), 64);
        configure(&mut world);

        let registry = Arc::new(ShopRegistry::new());
        registry.insert(location);
        let ledger = Arc::new(MemoryLedger::new());
        let clock = Arc::new(ManualClock::new(50_000));
        let preferences = Arc::new(AutoExchangeOptOut::new());

        let engine = Arc::new(
            TradeEngine::new(
                MainThread::spawn(world).unwrap(),
                registry.clone(),
                ledger.clone(),
                EngineConfig::default(),
            )
            .with_clock(clock.clone()),
        );
        let handler = AutoExchangeHandler::new(engine.clone(), registry, preferences.clone());

        Setup {
            engine,
            handler,
            ledger,
            clock,
            preferences,
        }
    }

    async fn holdings(engine: &TradeEngine<InMemoryWorld>) -> Vec<Holding> {
        engine
            .main_thread()
            .run(|world| world.holdings())
            .await
            .unwrap()
    }

    fn holding(holder: Holder, item: &str, quantity: u32) -> Holding {
        Holding {
            holder,
            item: item.to_string(),
            quantity,
        }
    }

    /// Simulate the host moving a deposit into the container
    async fn put_in_container(engine: &TradeEngine<InMemoryWorld>, item: ItemStack, quantity: u32) {
        engine
            .main_thread()
            .run(move |world| {
                use barter_trade_engine::World;
                assert!(world
                    .party_inventory_mut(BUYER)
                    .unwrap()
                    .remove(&item, quantity));
                assert_eq!(world.stock(SHOP, &item, quantity), quantity);
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deposit_of_three_bundles_delivers_three_units_once() {
        let s = setup(barter_shop(), |_| {});
        put_in_container(&s.engine, emerald(), 9).await;

        let receipt = s
            .handler
            .on_payment_deposit(BUYER, SHOP, &emerald().with_amount(9))
            .await
            .unwrap();
        s.engine.flush_ledger().await;

        assert_eq!(receipt.source, TradeSource::DepositTriggered);
        assert_eq!(receipt.delivered, 3);
        assert_eq!(
            holdings(&s.engine).await,
            vec![
                holding(Holder::Party(BUYER), "DIAMOND", 3),
                holding(Holder::Party(BUYER), "EMERALD", 21),
                holding(Holder::Container(SHOP), "DIAMOND", 61),
                holding(Holder::Container(SHOP), "EMERALD", 9),
            ]
        );

        let records = s.ledger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].quantity, 3);
        assert_eq!(records[0].price_paid, 9);
        assert_eq!(records[0].currency.as_deref(), Some("EMERALD"));
        assert_eq!(records[0].source, TradeSource::DepositTriggered);
    }

    #[tokio::test]
    async fn test_deposit_not_a_multiple_is_rejected_without_trading() {
        let s = setup(barter_shop(), |_| {});
        let before = holdings(&s.engine).await;

        let result = s
            .handler
            .on_payment_deposit(BUYER, SHOP, &emerald().with_amount(7))
            .await;
        s.engine.flush_ledger().await;

        assert_eq!(result, Err(TradeError::NotExactMultiple { base: 3 }));
        assert_eq!(holdings(&s.engine).await, before);
        assert!(s.ledger.records().is_empty());
        // Not dispatched, so not debounced either
        assert!(!s.handler.is_debounced(BUYER, SHOP));
    }

    #[tokio::test]
    async fn test_repeated_trigger_inside_debounce_window() {
        let s = setup(barter_shop(), |_| {});
        put_in_container(&s.engine, emerald(), 6).await;

        s.handler
            .on_payment_deposit(BUYER, SHOP, &emerald().with_amount(3))
            .await
            .unwrap();
        let repeated = s
            .handler
            .on_payment_deposit(BUYER, SHOP, &emerald().with_amount(3))
            .await;
        assert_eq!(repeated, Err(TradeError::Debounced));

        s.clock.advance(Duration::from_millis(500));
        s.handler
            .on_payment_deposit(BUYER, SHOP, &emerald().with_amount(3))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stale_debounce_entries_are_forgotten() {
        let s = setup(barter_shop(), |world| {
            world.add_party(3, 36, Default::default());
            world.give(3, &emerald(), 3);
        });
        put_in_container(&s.engine, emerald(), 3).await;

        s.handler
            .on_payment_deposit(BUYER, SHOP, &emerald().with_amount(3))
            .await
            .unwrap();
        assert_eq!(s.handler.tracked_pairs(), 1);

        s.clock.advance(Duration::from_millis(600));
        s.handler
            .on_payment_deposit(3, SHOP, &emerald().with_amount(3))
            .await
            .unwrap();

        // Only the fresh pair is left; the buyer's window has closed
        assert_eq!(s.handler.tracked_pairs(), 1);
        assert!(!s.handler.is_debounced(BUYER, SHOP));
        assert!(s.handler.is_debounced(3, SHOP));
    }

    #[tokio::test]
    async fn test_opted_out_party_is_not_traded_for() {
        let s = setup(barter_shop(), |_| {});
        s.preferences.set_enabled(BUYER, false);

        assert_eq!(
            s.handler
                .on_payment_deposit(BUYER, SHOP, &emerald().with_amount(3))
                .await,
            Err(TradeError::AutoExchangeDisabled)
        );
    }

    #[rstest]
    #[case::not_accepted(ItemStack::new("GOLD_INGOT", 1), 3, TradeError::PaymentRejected)]
    #[case::below_base(emerald(), 2, TradeError::NotExactMultiple { base: 3 })]
    #[tokio::test]
    async fn test_deposit_rejections(
        #[case] item: ItemStack,
        #[case] quantity: u32,
        #[case] expected: TradeError,
    ) {
        let s = setup(barter_shop(), |_| {});
        let result = s
            .handler
            .on_payment_deposit(BUYER, SHOP, &item.with_amount(quantity))
            .await;
        assert_eq!(result, Err(expected));
    }

    #[tokio::test]
    async fn test_withdrawal_settles_payment_only() {
        let s = setup(barter_shop(), |world| {
            // The party already took 2 diamonds out of the container
            assert!(world.take_from_container(SHOP, &diamond(), 2));
            world.give(BUYER, &diamond(), 2);
        });

        let receipt = s
            .handler
            .on_offering_withdrawal(BUYER, SHOP, &diamond(), 2)
            .await
            .unwrap();

        assert_eq!(receipt.source, TradeSource::WithdrawalTriggered);
        assert_eq!(receipt.delivered, 0);
        assert_eq!(
            holdings(&s.engine).await,
            vec![
                holding(Holder::Party(BUYER), "DIAMOND", 2),
                holding(Holder::Party(BUYER), "EMERALD", 24),
                holding(Holder::Container(SHOP), "DIAMOND", 62),
                holding(Holder::Container(SHOP), "EMERALD", 6),
            ]
        );
    }

    #[tokio::test]
    async fn test_withdrawal_without_enough_payment() {
        let s = setup(barter_shop(), |_| {});

        assert_eq!(
            s.handler
                .on_offering_withdrawal(BUYER, SHOP, &diamond(), 11)
                .await,
            Err(TradeError::InsufficientPayment)
        );
        assert_eq!(
            s.handler
                .on_offering_withdrawal(BUYER, SHOP, &emerald(), 1)
                .await,
            Err(TradeError::ItemMismatch)
        );
    }

    #[tokio::test]
    async fn test_expired_session_cannot_execute() {
        let s = setup(barter_shop(), |_| {});
        let session = s.engine.initiate_trade(BUYER, SHOP).unwrap();

        s.clock.advance(Duration::from_secs(5 * 60) + Duration::from_millis(1));

        assert_eq!(
            s.engine.execute_trade(session.id).await,
            Err(TradeError::SessionExpired)
        );
        assert!(s.engine.get_player_session(BUYER).is_none());
    }

    #[tokio::test]
    async fn test_session_at_exact_expiry_is_still_usable() {
        let s = setup(barter_shop(), |_| {});
        let session = s.engine.initiate_trade(BUYER, SHOP).unwrap();

        s.clock.advance(Duration::from_secs(5 * 60));

        let live = s.engine.get_session(session.id).unwrap();
        assert_eq!(live.state(), TradeState::Initiated);
    }

    #[tokio::test]
    async fn test_owner_cannot_trade_with_own_shop() {
        let s = setup(barter_shop(), |world| {
            world.add_party(OWNER, 36, Default::default());
        });

        assert_eq!(
            s.engine.initiate_trade(OWNER, SHOP).unwrap_err(),
            TradeError::SelfTrade
        );
        let direct = s
            .engine
            .execute_direct_trade(TradeRequest {
                party: OWNER,
                location: SHOP,
                offered: diamond(),
                offered_quantity: 1,
                payment: Payment::Bypassed,
                source: TradeSource::AdminOverride,
            })
            .await;
        assert_eq!(direct, Err(TradeError::SelfTrade));
    }

    #[tokio::test]
    async fn test_delivery_overflow_is_dropped_and_trade_succeeds() {
        let location = barter_shop().with_stock(Stock::Infinite);
        let s = setup(location, |world| {
            world.add_party(3, 2, Default::default());
            world.give(3, &emerald(), 5);
        });

        let receipt = s
            .engine
            .execute_direct_trade(TradeRequest {
                party: 3,
                location: SHOP,
                offered: diamond(),
                offered_quantity: 100,
                payment: Payment::Bypassed,
                source: TradeSource::AdminOverride,
            })
            .await
            .unwrap();

        assert_eq!((receipt.delivered, receipt.dropped), (64, 36));

        let (held, notices) = s
            .engine
            .main_thread()
            .run(|world| {
                (
                    world.holdings(),
                    world.notices_for(3).into_iter().cloned().collect::<Vec<_>>(),
                )
            })
            .await
            .unwrap();
        assert!(held.contains(&holding(Holder::Party(3), "DIAMOND", 64)));
        assert!(held.contains(&holding(Holder::Party(3), "EMERALD", 5)));
        assert!(held.contains(&holding(Holder::Ground, "DIAMOND", 36)));
        assert_eq!(notices[0], Notice::ItemsDropped { quantity: 36 });
        assert!(matches!(notices[1], Notice::TradeCompleted { .. }));
    }

    #[tokio::test]
    async fn test_storage_full_rolls_back_to_snapshots() {
        let fixed = Location::new(SHOP, OWNER, "Gems")
            .with_offering(ItemStack::new("DIAMOND", 3))
            .with_terms(PaymentTerms::Fixed {
                item: emerald(),
                quantity: 5,
            });
        let s = setup(fixed, |world| {
            // One slot, holding the stock; no room for the payment
            world.add_container(SHOP, 1);
            world.stock(SHOP, &diamond(), 10);
        });
        let before = holdings(&s.engine).await;

        let session = s.engine.initiate_trade(BUYER, SHOP).unwrap();
        s.engine.confirm_session(session.id).unwrap();
        let result = s.engine.execute_trade(session.id).await;
        s.engine.flush_ledger().await;

        assert_eq!(
            result,
            Err(TradeError::RolledBack {
                reason: RollbackReason::StorageFull
            })
        );
        assert_eq!(holdings(&s.engine).await, before);
        assert!(s.ledger.records().is_empty());
        assert_eq!(s.ledger.failures().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_execute_leaves_running_trade_alone() {
        let fixed = Location::new(SHOP, OWNER, "Gems")
            .with_offering(ItemStack::new("DIAMOND", 3))
            .with_terms(PaymentTerms::Fixed {
                item: emerald(),
                quantity: 5,
            });
        let s = setup(fixed, |_| {});

        let session = s.engine.initiate_trade(BUYER, SHOP).unwrap();
        s.engine.confirm_session(session.id).unwrap();

        // Drive the first execution until it waits on the main thread
        let mut first = Box::pin(s.engine.execute_trade(session.id));
        let early = futures::poll!(&mut first);
        let second = s.engine.execute_trade(session.id).await;
        let first = match early {
            Poll::Ready(result) => result,
            Poll::Pending => first.await,
        };
        s.engine.flush_ledger().await;

        let receipt = first.unwrap();
        assert_eq!(receipt.delivered, 3);
        assert!(matches!(
            second,
            Err(TradeError::SessionInactive) | Err(TradeError::SessionNotFound)
        ));

        let held = holdings(&s.engine).await;
        assert!(held.contains(&holding(Holder::Party(BUYER), "DIAMOND", 3)));
        assert!(held.contains(&holding(Holder::Party(BUYER), "EMERALD", 25)));
        assert_eq!(s.ledger.records().len(), 1);
        assert!(s.ledger.failures().is_empty());

        let notices = s
            .engine
            .main_thread()
            .run(|world| {
                world
                    .notices_for(BUYER)
                    .into_iter()
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await
            .unwrap();
        assert!(!notices
            .iter()
            .any(|notice| matches!(notice, Notice::TradeFailed { .. })));
        assert!(s.engine.get_player_session(BUYER).is_none());
    }

    #[tokio::test]
    async fn test_cancelled_session_cannot_execute() {
        let s = setup(barter_shop(), |_| {});
        let session = s.engine.initiate_trade(BUYER, SHOP).unwrap();

        assert!(s.engine.cancel_session(session.id));
        assert_eq!(
            s.engine.execute_trade(session.id).await,
            Err(TradeError::SessionNotFound)
        );
    }
}
