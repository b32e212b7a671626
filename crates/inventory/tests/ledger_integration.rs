//! Ledger behavior end to end against the in-memory store.

use std::sync::Arc;

use common::{LocationId, ProductId};
use domain::stock::replay_quantity;
use domain::{Aggregate, DomainError, ErrorKind, InMemoryPublisher, StockError, TransactionType};
use event_store::InMemoryEventStore;
use inventory::StockLedger;

fn create_ledger() -> StockLedger<InMemoryEventStore> {
    StockLedger::new(InMemoryEventStore::new(), Arc::new(InMemoryPublisher::new()))
}

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn oversized_stock_out_leaves_quantity_alone() {
        let ledger = create_ledger();
        let record = ledger
            .create(ProductId::new(1), LocationId::new(1), 100)
            .await
            .unwrap();
        let stock_id = record.id().unwrap();

        let err = ledger
            .stock_out(stock_id, 5000, Some("Order-5".into()), None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(
            err.to_string(),
            "Not enough stock available. Current quantity: 100"
        );
        let record = ledger.get(stock_id).await.unwrap();
        assert_eq!(record.quantity(), 100);
        assert_eq!(record.transactions().len(), 1);
    }

    #[tokio::test]
    async fn stock_in_appends_one_entry() {
        let ledger = create_ledger();
        let record = ledger
            .create(ProductId::new(1), LocationId::new(1), 50)
            .await
            .unwrap();
        let stock_id = record.id().unwrap();

        let record = ledger
            .stock_in(stock_id, 30, Some("PO-001".into()), None)
            .await
            .unwrap();

        assert_eq!(record.quantity(), 80);
        let last = record.transactions().last().unwrap();
        assert_eq!(last.kind, TransactionType::StockIn);
        assert_eq!(last.quantity, 30);
        assert_eq!(last.reference.as_deref(), Some("PO-001"));
        assert_eq!(record.transactions().len(), 2);
    }
}

mod invariants {
    use super::*;

    #[tokio::test]
    async fn history_replays_to_quantity() {
        let ledger = create_ledger();
        let record = ledger
            .create(ProductId::new(7), LocationId::new(3), 20)
            .await
            .unwrap();
        let stock_id = record.id().unwrap();

        ledger.stock_in(stock_id, 15, None, None).await.unwrap();
        ledger.stock_out(stock_id, 30, None, None).await.unwrap();
        ledger.stock_out(stock_id, 99, None, None).await.unwrap_err();
        ledger.adjust(stock_id, 42, None, Some("cycle count".into())).await.unwrap();
        ledger.stock_out(stock_id, 2, None, None).await.unwrap();

        let history = ledger.transactions(stock_id).await.unwrap();
        let record = ledger.get(stock_id).await.unwrap();
        assert_eq!(record.quantity(), 40);
        assert_eq!(replay_quantity(&history), 40);
        assert!(record.is_consistent());
    }

    #[tokio::test]
    async fn repeated_adjust_changes_history_not_quantity() {
        let ledger = create_ledger();
        let record = ledger
            .create(ProductId::new(1), LocationId::new(1), 10)
            .await
            .unwrap();
        let stock_id = record.id().unwrap();

        ledger.adjust(stock_id, 25, None, None).await.unwrap();
        let record = ledger.adjust(stock_id, 25, None, None).await.unwrap();

        assert_eq!(record.quantity(), 25);
        let adjustments: Vec<i64> = record
            .transactions()
            .iter()
            .filter(|t| t.kind == TransactionType::Adjustment)
            .map(|t| t.quantity)
            .collect();
        assert_eq!(adjustments, vec![15, 0]);
    }

    #[tokio::test]
    async fn negative_targets_are_rejected() {
        let ledger = create_ledger();
        let record = ledger
            .create(ProductId::new(1), LocationId::new(1), 10)
            .await
            .unwrap();
        let err = ledger
            .adjust(record.id().unwrap(), -1, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = ledger
            .create(ProductId::new(2), LocationId::new(1), -5)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_stock_outs_never_oversell() {
        let ledger = Arc::new(create_ledger().with_max_retries(50));
        let record = ledger
            .create(ProductId::new(1), LocationId::new(1), 10)
            .await
            .unwrap();
        let stock_id = record.id().unwrap();

        let mut handles = Vec::new();
        for n in 0..16 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger
                    .stock_out(stock_id, 1, Some(format!("Order-{n}")), None)
                    .await
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(DomainError::Stock(StockError::InsufficientStock { .. })) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(accepted, 10);
        let record = ledger.get(stock_id).await.unwrap();
        assert_eq!(record.quantity(), 0);
        assert_eq!(record.transactions().len(), 11);
        assert!(record.is_consistent());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_creates_yield_one_record() {
        let ledger = Arc::new(create_ledger());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.create(ProductId::new(9), LocationId::new(9), 1).await
            }));
        }

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(err) => assert_eq!(err.kind(), ErrorKind::Conflict),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(ledger.total_for_product(ProductId::new(9)).await.unwrap(), 1);
    }
}
