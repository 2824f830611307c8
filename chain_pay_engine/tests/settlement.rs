use std::{collections::HashSet, sync::Arc, time::Duration};

use chain_pay_engine::{
    db_types::{Chain, FeeType, NewOrder, OrderStatusType, SettlementFields, Transfer},
    events::EventProducers,
    matcher::{push_tx_hash, MatchError, MatchOutcome, OrderRequest, PushPayment},
    metrics::ScanMetrics,
    MerchantBalances,
    OrderManagement,
    SqliteDatabase,
    StoreError,
    SystemConfigManagement,
    TransactionLogManagement,
    TransferMatcher,
    UniqueAmountAllocator,
};
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;

use crate::support::prepare_env::{prepare_test_env, random_db_path, seed_merchant, tear_down};

mod support;

const WALLET: &str = "0x00000000000000000000000000000000000000aa";

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn request(trade_no: &str, merchant_id: i64, chain: Chain, base: &str) -> OrderRequest {
    OrderRequest {
        trade_no: trade_no.to_string(),
        merchant_id,
        chain,
        to_address: WALLET.to_string(),
        base_amount: dec(base),
        settlement_amount: dec(base),
        fee: dec("0.5"),
        fee_type: FeeType::Deduction,
        expires_at: Utc::now() + ChronoDuration::minutes(30),
    }
}

fn transfer(tx: &str, amount: Decimal) -> Transfer {
    Transfer {
        chain: Chain::Base,
        tx_hash: tx.to_string(),
        from_address: "0x00000000000000000000000000000000000000bb".to_string(),
        to_address: WALLET.to_string(),
        amount,
        block_number: 100,
    }
}

fn matcher(db: &SqliteDatabase) -> (TransferMatcher<SqliteDatabase>, Arc<ScanMetrics>) {
    let metrics = Arc::new(ScanMetrics::new());
    (TransferMatcher::new(db.clone(), Arc::clone(&metrics), EventProducers::default()), metrics)
}

#[tokio::test]
async fn transfer_settles_order_exactly_once() {
    let db = prepare_test_env(&random_db_path()).await;
    let merchant = seed_merchant(&db, Chain::Base, WALLET).await;
    let allocator = UniqueAmountAllocator::new(db.clone());
    let order = allocator.place_order(request("T-1", merchant, Chain::Base, "10")).await.unwrap();
    assert_eq!(order.unique_amount, Some(dec("10")));

    let (matcher, metrics) = matcher(&db);
    let paid = transfer("0xfeed", dec("10.000000"));
    let outcome = matcher.process_transfer(&paid).await.unwrap();
    let MatchOutcome::Settled(settled) = outcome else { panic!("Expected the order to settle, got {outcome:?}") };
    assert_eq!(settled.id, order.id);
    assert_eq!(settled.status, OrderStatusType::Paid);

    // The same transaction again is a no-op
    let again = matcher.process_transfer(&paid).await.unwrap();
    assert!(matches!(again, MatchOutcome::Duplicate));

    let stored = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Paid);
    assert_eq!(stored.tx_hash.as_deref(), Some("0xfeed"));
    assert_eq!(stored.actual_amount, Some(dec("10")));
    let log = db.fetch_transaction_log("0xfeed").await.unwrap().unwrap();
    assert!(log.matched);
    assert_eq!(log.order_id, Some(order.id));

    let snapshot = metrics.chain_snapshot(Chain::Base).unwrap();
    assert_eq!(snapshot.orders_matched, 1);
    assert_eq!(snapshot.duplicate_tx, 1);

    // The merchant credit runs in the background
    let mut balance = Decimal::ZERO;
    for _ in 0..50 {
        balance = db.fetch_merchant_balance(merchant).await.unwrap().unwrap().balance;
        if balance > Decimal::ZERO {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(balance, dec("9.5"));
    tear_down(db).await;
}

#[tokio::test]
async fn settled_amount_is_stored_at_chain_precision() {
    let db = prepare_test_env(&random_db_path()).await;
    let merchant = seed_merchant(&db, Chain::Base, WALLET).await;
    let allocator = UniqueAmountAllocator::new(db.clone());
    let order = allocator.place_order(request("T-DUST", merchant, Chain::Base, "10")).await.unwrap();

    let (matcher, _) = matcher(&db);
    // 18-decimal tokens can carry dust below the 6 places orders are matched on
    let outcome = matcher.process_transfer(&transfer("0xd057", dec("10.0000004"))).await.unwrap();
    let MatchOutcome::Settled(settled) = outcome else { panic!("Expected the order to settle, got {outcome:?}") };
    assert_eq!(settled.actual_amount, Some(dec("10")));

    let stored = db.fetch_order(order.id).await.unwrap().unwrap();
    let actual = stored.actual_amount.unwrap();
    assert_eq!(actual, dec("10"));
    assert!(actual.scale() <= 6);
    tear_down(db).await;
}

#[tokio::test]
async fn unmatched_and_wrong_address_transfers_are_logged_only() {
    let db = prepare_test_env(&random_db_path()).await;
    let merchant = seed_merchant(&db, Chain::Base, WALLET).await;
    let allocator = UniqueAmountAllocator::new(db.clone());
    let order = allocator.place_order(request("T-2", merchant, Chain::Base, "20")).await.unwrap();
    let (matcher, _) = matcher(&db);

    let outcome = matcher.process_transfer(&transfer("0x01", dec("19.99"))).await.unwrap();
    assert!(matches!(outcome, MatchOutcome::Unmatched));
    let mut elsewhere = transfer("0x02", dec("20"));
    elsewhere.to_address = "0x00000000000000000000000000000000000000cc".to_string();
    let outcome = matcher.process_transfer(&elsewhere).await.unwrap();
    assert!(matches!(outcome, MatchOutcome::Unmatched));

    assert!(db.transaction_exists("0x01").await.unwrap());
    assert!(!db.fetch_transaction_log("0x02").await.unwrap().unwrap().matched);
    assert_eq!(db.fetch_order(order.id).await.unwrap().unwrap().status, OrderStatusType::Pending);
    tear_down(db).await;
}

#[tokio::test]
async fn concurrent_settlements_have_one_winner() {
    let db = prepare_test_env(&random_db_path()).await;
    let merchant = seed_merchant(&db, Chain::Base, WALLET).await;
    let allocator = UniqueAmountAllocator::new(db.clone());
    let order = allocator.place_order(request("T-3", merchant, Chain::Base, "5")).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let db = db.clone();
        tasks.push(tokio::spawn(async move {
            let fields = SettlementFields {
                tx_hash: format!("0xrace{i}"),
                from_address: "0xpayer".to_string(),
                actual_amount: dec("5"),
                paid_at: Utc::now(),
            };
            db.conditional_settle(order.id, OrderStatusType::Pending, fields).await.unwrap()
        }));
    }
    let mut updated = 0;
    for task in tasks {
        updated += task.await.unwrap();
    }
    assert_eq!(updated, 1);
    tear_down(db).await;
}

#[tokio::test]
async fn racing_transfers_settle_one_order() {
    let db = prepare_test_env(&random_db_path()).await;
    let merchant = seed_merchant(&db, Chain::Base, WALLET).await;
    let allocator = UniqueAmountAllocator::new(db.clone());
    allocator.place_order(request("T-4", merchant, Chain::Base, "7")).await.unwrap();
    let (matcher, _) = matcher(&db);
    let matcher = Arc::new(matcher);

    let mut tasks = Vec::new();
    for i in 0..4 {
        let matcher = Arc::clone(&matcher);
        let paid = transfer(&format!("0xdup{i}"), dec("7"));
        tasks.push(tokio::spawn(async move { matcher.process_transfer(&paid).await }));
    }
    let mut settled = 0;
    for task in tasks {
        if task.await.unwrap().unwrap().is_settled() {
            settled += 1;
        }
    }
    assert_eq!(settled, 1);
    tear_down(db).await;
}

#[tokio::test]
async fn pending_orders_get_distinct_amounts() {
    let db = prepare_test_env(&random_db_path()).await;
    let merchant = seed_merchant(&db, Chain::Polygon, WALLET).await;
    let allocator = UniqueAmountAllocator::new(db.clone());
    let mut amounts = HashSet::new();
    for i in 0..12 {
        let mut req = request(&format!("U-{i}"), merchant, Chain::Base, "100");
        req.chain = Chain::Polygon;
        let order = allocator.place_order(req).await.unwrap();
        assert!(amounts.insert(order.unique_amount.unwrap()), "Duplicate amount allocated");
    }
    assert_eq!(amounts.len(), 12);
    assert!(amounts.contains(&dec("100")));
    assert!(amounts.contains(&dec("100.000011")));
    tear_down(db).await;
}

#[tokio::test]
async fn database_rejects_duplicate_pending_amounts() {
    let db = prepare_test_env(&random_db_path()).await;
    let merchant = seed_merchant(&db, Chain::Base, WALLET).await;
    let new_order = |trade_no: &str| NewOrder {
        trade_no: trade_no.to_string(),
        merchant_id: merchant,
        chain: Chain::Base,
        to_address: WALLET.to_string(),
        amount: dec("3"),
        unique_amount: Some(dec("3.000001")),
        settlement_amount: dec("3"),
        fee: Decimal::ZERO,
        fee_type: FeeType::Deduction,
        expires_at: Utc::now() + ChronoDuration::minutes(5),
    };
    db.insert_order(new_order("D-1")).await.unwrap();
    let err = db.insert_order(new_order("D-2")).await.unwrap_err();
    assert!(matches!(err, StoreError::AmountCollision { .. }), "{err}");
    let err = db.insert_order(new_order("D-1")).await.unwrap_err();
    assert!(matches!(err, StoreError::OrderAlreadyExists(_) | StoreError::AmountCollision { .. }));
    tear_down(db).await;
}

#[tokio::test]
async fn legacy_orders_match_on_amount() {
    let db = prepare_test_env(&random_db_path()).await;
    let merchant = seed_merchant(&db, Chain::Base, WALLET).await;
    let order = db
        .insert_order(NewOrder {
            trade_no: "L-1".to_string(),
            merchant_id: merchant,
            chain: Chain::Base,
            to_address: WALLET.to_string(),
            amount: dec("42"),
            unique_amount: None,
            settlement_amount: dec("42"),
            fee: dec("2"),
            fee_type: FeeType::Balance,
            expires_at: Utc::now() + ChronoDuration::minutes(5),
        })
        .await
        .unwrap();
    let (matcher, _) = matcher(&db);
    let outcome = matcher.process_transfer(&transfer("0xlegacy", dec("42"))).await.unwrap();
    assert!(matches!(outcome, MatchOutcome::Settled(o) if o.id == order.id));
    tear_down(db).await;
}

#[tokio::test]
async fn expired_orders_are_not_matched() {
    let db = prepare_test_env(&random_db_path()).await;
    let merchant = seed_merchant(&db, Chain::Base, WALLET).await;
    let allocator = UniqueAmountAllocator::new(db.clone());
    let mut req = request("E-1", merchant, Chain::Base, "8");
    req.expires_at = Utc::now() - ChronoDuration::seconds(1);
    let order = allocator.place_order(req).await.unwrap();

    let expired = db.expire_pending_orders(Utc::now()).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, order.id);
    assert_eq!(expired[0].status, OrderStatusType::Expired);
    assert!(db.expire_pending_orders(Utc::now()).await.unwrap().is_empty());

    let (matcher, _) = matcher(&db);
    let outcome = matcher.process_transfer(&transfer("0xlate", dec("8"))).await.unwrap();
    assert!(matches!(outcome, MatchOutcome::Unmatched));
    // The expired order's amount is free again
    let replacement = allocator.place_order(request("E-2", merchant, Chain::Base, "8")).await.unwrap();
    assert_eq!(replacement.unique_amount, Some(dec("8")));
    tear_down(db).await;
}

#[tokio::test]
async fn push_payments_settle_passive_orders() {
    let db = prepare_test_env(&random_db_path()).await;
    let merchant = seed_merchant(&db, Chain::Wechat, "wx-merchant-1").await;
    let allocator = UniqueAmountAllocator::new(db.clone());
    let mut req = request("P-1", merchant, Chain::Wechat, "88.8");
    req.to_address = "wx-merchant-1".to_string();
    req.fee_type = FeeType::Balance;
    let order = allocator.place_order(req).await.unwrap();
    assert_eq!(order.unique_amount, Some(dec("88.80")));
    let (matcher, _) = matcher(&db);

    let push = PushPayment {
        chain: Chain::Wechat,
        amount: dec("88.80"),
        reference: "4200001234".to_string(),
        address: None,
        payer: Some("buyer".to_string()),
    };
    let outcome = matcher.process_push_payment(push.clone()).await.unwrap();
    assert!(matches!(outcome, MatchOutcome::Settled(ref o) if o.id == order.id));
    let stored = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.tx_hash, Some(push_tx_hash(Chain::Wechat, "4200001234")));
    assert!(matches!(matcher.process_push_payment(push.clone()).await.unwrap(), MatchOutcome::Duplicate));

    db.set_passive_channel_enabled(Chain::Wechat, false).await.unwrap();
    let err = matcher.process_push_payment(PushPayment { reference: "other".to_string(), ..push.clone() }).await;
    assert!(matches!(err, Err(MatchError::ChannelDisabled(Chain::Wechat))));

    let err = matcher.process_push_payment(PushPayment { chain: Chain::Bep20, ..push }).await;
    assert!(matches!(err, Err(MatchError::NotPassive(Chain::Bep20))));
    tear_down(db).await;
}
