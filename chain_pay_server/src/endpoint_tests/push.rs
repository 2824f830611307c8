use actix_web::http::StatusCode;
use chain_pay_engine::{
    db_types::{Chain, FeeType, Order, OrderStatusType},
    matcher::OrderRequest,
    OrderManagement,
    SqliteDatabase,
    UniqueAmountAllocator,
};
use chrono::{Duration, Utc};
use cpg_common::Secret;
use rust_decimal::Decimal;

use super::helpers::{
    prepare_test_db,
    push_config,
    send_request,
    signed_push,
    tear_down,
    test_watcher,
    unsigned_push,
};
use crate::{
    config::PushConfig,
    data_objects::{PushOutcome, PushPaymentResponse},
    middleware::PUSH_SIGNATURE_HEADER,
};

const WECHAT_PATH: &str = "/api/push/wechat";

async fn place_wechat_order(db: &SqliteDatabase, amount: &str) -> Order {
    let merchant = db.insert_merchant("Push merchant").await.unwrap();
    db.insert_wallet(Chain::Wechat, "wx-merchant-1", Some(merchant), None).await.unwrap();
    let amount: Decimal = amount.parse().unwrap();
    let request = OrderRequest {
        trade_no: "WX-1001".to_string(),
        merchant_id: merchant,
        chain: Chain::Wechat,
        to_address: "wx-merchant-1".to_string(),
        base_amount: amount,
        settlement_amount: amount,
        fee: Decimal::ZERO,
        fee_type: FeeType::Balance,
        expires_at: Utc::now() + Duration::minutes(30),
    };
    UniqueAmountAllocator::new(db.clone()).place_order(request).await.unwrap()
}

fn push_body(order: &Order, reference: &str) -> String {
    let amount = order.unique_amount.unwrap();
    format!(r#"{{"amount":"{amount}","reference":"{reference}","payer":"buyer-7"}}"#)
}

async fn status_of(db: &SqliteDatabase, order: &Order) -> OrderStatusType {
    db.fetch_order(order.id).await.unwrap().unwrap().status
}

#[actix_web::test]
async fn signed_push_settles_order() {
    let db = prepare_test_db().await;
    let watcher = test_watcher(&db);
    let order = place_wechat_order(&db, "66.6").await;
    let body = push_body(&order, "4200009988");

    let (status, res) = send_request(&watcher, push_config(true), signed_push(WECHAT_PATH, &body)).await;
    assert_eq!(status, StatusCode::OK, "{res}");
    let res: PushPaymentResponse = serde_json::from_str(&res).unwrap();
    assert_eq!(res.outcome, PushOutcome::Settled);
    let paid = res.order.expect("Settled pushes return the order");
    assert_eq!(paid.id, order.id);
    assert_eq!(paid.status, OrderStatusType::Paid);
    assert_eq!(paid.tx_hash.as_deref(), Some("push:wechat:4200009988"));
    assert_eq!(status_of(&db, &order).await, OrderStatusType::Paid);

    // Replays are harmless
    let (status, res) = send_request(&watcher, push_config(true), signed_push(WECHAT_PATH, &body)).await;
    assert_eq!(status, StatusCode::OK);
    let res: PushPaymentResponse = serde_json::from_str(&res).unwrap();
    assert_eq!(res.outcome, PushOutcome::Duplicate);
    assert!(res.order.is_none());
    tear_down(db).await;
}

#[actix_web::test]
async fn unsigned_pushes_are_rejected() {
    let db = prepare_test_db().await;
    let watcher = test_watcher(&db);
    let order = place_wechat_order(&db, "66.6").await;
    let body = push_body(&order, "4200009988");

    let (status, _) = send_request(&watcher, push_config(true), unsigned_push(WECHAT_PATH, &body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let forged = unsigned_push(WECHAT_PATH, &body).insert_header((PUSH_SIGNATURE_HEADER, "bm90IGEgc2lnbmF0dXJl"));
    let (status, _) = send_request(&watcher, push_config(true), forged).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The signature covers the body, so a tampered amount fails too
    let signed = signed_push(WECHAT_PATH, &body).set_payload(push_body(&order, "4200000000"));
    let (status, _) = send_request(&watcher, push_config(true), signed).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert_eq!(status_of(&db, &order).await, OrderStatusType::Pending);
    tear_down(db).await;
}

#[actix_web::test]
async fn pushes_are_rejected_without_a_secret() {
    let db = prepare_test_db().await;
    let watcher = test_watcher(&db);
    let order = place_wechat_order(&db, "66.6").await;
    let body = push_body(&order, "4200009988");
    let config = PushConfig { hmac_secret: Secret::default(), hmac_checks: true };
    let (status, _) = send_request(&watcher, config, signed_push(WECHAT_PATH, &body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(status_of(&db, &order).await, OrderStatusType::Pending);
    tear_down(db).await;
}

#[actix_web::test]
async fn unchecked_pushes_pass_through() {
    let db = prepare_test_db().await;
    let watcher = test_watcher(&db);
    let body = r#"{"amount":"12.34","reference":"no-such-order"}"#;
    let (status, res) = send_request(&watcher, push_config(false), unsigned_push(WECHAT_PATH, body)).await;
    assert_eq!(status, StatusCode::OK, "{res}");
    let res: PushPaymentResponse = serde_json::from_str(&res).unwrap();
    assert_eq!(res.outcome, PushOutcome::Unmatched);
    tear_down(db).await;
}

#[actix_web::test]
async fn pushes_to_scanned_chains_are_refused() {
    let db = prepare_test_db().await;
    let watcher = test_watcher(&db);
    let body = r#"{"amount":"12.34","reference":"abc"}"#;
    let (status, _) = send_request(&watcher, push_config(true), signed_push("/api/push/bep20", body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send_request(&watcher, push_config(true), signed_push("/api/push/dogecoin", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    tear_down(db).await;
}

#[actix_web::test]
async fn invalid_push_bodies_are_bad_requests() {
    let db = prepare_test_db().await;
    let watcher = test_watcher(&db);
    for body in [r#"{"amount":"-1","reference":"abc"}"#, r#"{"amount":"5","reference":"  "}"#] {
        let (status, res) = send_request(&watcher, push_config(true), signed_push(WECHAT_PATH, body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body} => {res}");
    }
    tear_down(db).await;
}

#[actix_web::test]
async fn disabled_channels_refuse_pushes() {
    let db = prepare_test_db().await;
    let watcher = test_watcher(&db);
    let order = place_wechat_order(&db, "66.6").await;
    watcher.disable_chain("wechat").await.unwrap();
    let body = push_body(&order, "4200009988");
    let (status, _) = send_request(&watcher, push_config(true), signed_push(WECHAT_PATH, &body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(status_of(&db, &order).await, OrderStatusType::Pending);
    tear_down(db).await;
}
