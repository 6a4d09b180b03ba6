//! Integration tests for the full ledger pipeline.
//!
//! Tests: Command → StockEngine → ProductScope → LedgerStore → derived balance
//!
//! Verifies:
//! - Concurrent withdrawals on one product never overdraw it
//! - Products do not contend with each other
//! - Snapshots and audits agree with the log under load

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use proptest::prelude::*;

    use stockledger_catalog::{CreateProduct, ProductFilter};
    use stockledger_core::{LedgerError, ProductId};
    use stockledger_ledger::{AppendMovement, MovementKind, SnapshotFilter};

    use crate::config::LedgerConfig;
    use crate::engine::StockEngine;
    use crate::store::{ConfiguredStore, InMemoryLedgerStore, LedgerStore};

    fn setup() -> Arc<StockEngine<InMemoryLedgerStore>> {
        stockledger_observability::init_for_tests();
        Arc::new(StockEngine::new(InMemoryLedgerStore::new()))
    }

    fn stocked_product(engine: &StockEngine<InMemoryLedgerStore>, sku: &str, quantity: i64) -> ProductId {
        let product = engine
            .create_product(CreateProduct::new(sku, format!("Item {sku}")).with_min_stock(1))
            .unwrap();
        if quantity > 0 {
            engine
                .append_movement(AppendMovement::stock_in(product.id, quantity))
                .unwrap();
        }
        product.id
    }

    #[test]
    fn concurrent_withdrawals_admit_exactly_one() {
        let engine = setup();
        let threads = 16;

        for round in 0..10 {
            let id = stocked_product(&engine, &format!("RACE-{round}"), 5);

            let barrier = Arc::new(Barrier::new(threads));
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    let engine = engine.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        engine.append_movement(AppendMovement::stock_out(id, 5))
                    })
                })
                .collect();

            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            let rejected = results
                .iter()
                .filter(|r| {
                    matches!(
                        r,
                        Err(LedgerError::InsufficientStock {
                            requested: 5,
                            available: 0
                        })
                    )
                })
                .count();
            assert_eq!(rejected, threads - 1);
            assert_eq!(engine.balance(id), Ok(0));
        }
    }

    #[test]
    fn many_threads_never_overdraw() {
        let engine = setup();
        let id = stocked_product(&engine, "DRAIN-1", 100);

        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let engine = engine.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    (0..20)
                        .filter(|_| engine.append_movement(AppendMovement::stock_out(id, 1)).is_ok())
                        .count()
                })
            })
            .collect();

        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(accepted, 100);
        assert_eq!(engine.balance(id), Ok(0));
        assert!(engine.audit_balance(id).unwrap().consistent);
    }

    #[test]
    fn products_progress_independently() {
        let engine = setup();
        let ids: Vec<ProductId> = (0..4)
            .map(|i| stocked_product(&engine, &format!("P-{i}"), 0))
            .collect();

        let handles: Vec<_> = ids
            .iter()
            .copied()
            .map(|id| {
                let engine = engine.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        engine.append_movement(AppendMovement::stock_in(id, 2)).unwrap();
                        engine.append_movement(AppendMovement::stock_out(id, 1)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for id in ids {
            assert_eq!(engine.balance(id), Ok(50));
            assert_eq!(engine.list_movements(id).unwrap().len(), 100);
        }
    }

    #[test]
    fn delete_racing_appends_leaves_no_orphans() {
        let engine = setup();
        let id = stocked_product(&engine, "DEL-1", 10);

        let writer = {
            let engine = engine.clone();
            thread::spawn(move || {
                (0..50)
                    .map(|_| engine.append_movement(AppendMovement::stock_in(id, 1)))
                    .filter(|r| matches!(r, Err(LedgerError::NotFound)))
                    .count()
            })
        };
        engine.delete_product(id).unwrap();
        writer.join().unwrap();

        assert_eq!(engine.list_movements(id), Err(LedgerError::NotFound));
        assert!(engine.store().load_movements(id).is_err());
        assert!(engine.list_products(&ProductFilter::all()).unwrap().is_empty());
    }

    #[test]
    fn engine_runs_over_configured_store() {
        stockledger_observability::init_for_tests();
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let store = rt.block_on(ConfiguredStore::open(&LedgerConfig::default())).unwrap();
        let engine = StockEngine::new(store);

        let product = engine
            .create_product(CreateProduct::new("ABC-001", "Widget").with_min_stock(10))
            .unwrap();
        engine
            .append_movement(AppendMovement::stock_in(product.id, 50).with_note("Compra"))
            .unwrap();

        let snapshots = engine.list_stock_snapshots(&SnapshotFilter::all()).unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].current_balance, 50);
        assert_eq!(engine.audit_balance(product.id).unwrap().cached, Some(50));
    }

    #[test]
    fn uncached_store_still_derives_balances() {
        stockledger_observability::init_for_tests();
        let engine = StockEngine::new(InMemoryLedgerStore::with_balance_cache(false));
        let product = engine.create_product(CreateProduct::new("U-1", "Uncached")).unwrap();
        engine.append_movement(AppendMovement::stock_in(product.id, 3)).unwrap();

        let audit = engine.audit_balance(product.id).unwrap();
        assert_eq!(audit.derived, 3);
        assert_eq!(audit.cached, None);
        assert!(audit.consistent);
    }

    fn arb_command() -> impl Strategy<Value = (MovementKind, i64)> {
        (prop_oneof![Just(MovementKind::In), Just(MovementKind::Out)], 1i64..50)
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        #[test]
        fn accepted_log_matches_shadow_balance(commands in prop::collection::vec(arb_command(), 0..40)) {
            let engine = StockEngine::new(InMemoryLedgerStore::new());
            let product = engine.create_product(CreateProduct::new("PROP", "Prop")).unwrap();

            let mut shadow = 0i64;
            for (kind, magnitude) in commands {
                let command = AppendMovement { product_id: product.id, magnitude, kind, note: None };
                match engine.append_movement(command) {
                    Ok(_) => shadow += kind.sign() * magnitude,
                    Err(LedgerError::InsufficientStock { requested, available }) => {
                        prop_assert_eq!(kind, MovementKind::Out);
                        prop_assert_eq!(requested, magnitude);
                        prop_assert_eq!(available, shadow);
                        prop_assert!(magnitude > shadow);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {other}"),
                }
                prop_assert!(shadow >= 0);
            }

            prop_assert_eq!(engine.balance(product.id), Ok(shadow));
            prop_assert!(engine.audit_balance(product.id).unwrap().consistent);
        }
    }
}
