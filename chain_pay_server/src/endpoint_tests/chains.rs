use actix_web::http::StatusCode;
use serde_json::Value;

use super::helpers::{get, post, prepare_test_db, tear_down, test_watcher};
use crate::data_objects::JsonResponse;

fn json(body: &str) -> Value {
    serde_json::from_str(body).expect("Response is not JSON")
}

#[actix_web::test]
async fn health_check() {
    let db = prepare_test_db().await;
    let watcher = test_watcher(&db);
    let (status, body) = get(&watcher, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
    tear_down(db).await;
}

#[actix_web::test]
async fn chain_status_includes_passive_channels() {
    let db = prepare_test_db().await;
    let watcher = test_watcher(&db);
    let (status, body) = get(&watcher, "/api/chains").await;
    assert_eq!(status, StatusCode::OK);
    let chains = json(&body);
    assert_eq!(chains["base"]["passive"], false);
    assert_eq!(chains["base"]["running"], false);
    assert_eq!(chains["base"]["wallet_count"], 0);
    assert_eq!(chains["wechat"]["passive"], true);
    assert_eq!(chains["wechat"]["enabled"], true);
    assert_eq!(chains["alipay"]["interval_secs"], Value::Null);
    tear_down(db).await;
}

#[actix_web::test]
async fn passive_channels_are_toggled() {
    let db = prepare_test_db().await;
    let watcher = test_watcher(&db);
    let (status, body) = post(&watcher, "/api/chains/wechat/disable").await;
    assert_eq!(status, StatusCode::OK);
    let res: JsonResponse = serde_json::from_str(&body).unwrap();
    assert!(res.success);
    assert_eq!(res.message, "wechat disabled");
    let (_, body) = get(&watcher, "/api/chains").await;
    assert_eq!(json(&body)["wechat"]["enabled"], false);

    let (status, _) = post(&watcher, "/api/chains/wechat/enable").await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = get(&watcher, "/api/chains").await;
    assert_eq!(json(&body)["wechat"]["enabled"], true);
    tear_down(db).await;
}

#[actix_web::test]
async fn unknown_chains_are_bad_requests() {
    let db = prepare_test_db().await;
    let watcher = test_watcher(&db);
    for path in ["/api/chains/dogecoin/enable", "/api/chains/dogecoin/disable", "/api/chains/dogecoin/scan"] {
        let (status, body) = post(&watcher, path).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{path}");
        assert!(json(&body)["error"].as_str().unwrap().contains("dogecoin"), "{body}");
    }
    let (status, _) = get(&watcher, "/api/metrics/dogecoin").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    tear_down(db).await;
}

#[actix_web::test]
async fn scanning_without_wallets_is_skipped() {
    let db = prepare_test_db().await;
    let watcher = test_watcher(&db);
    let (status, body) = post(&watcher, "/api/chains/base/scan").await;
    assert_eq!(status, StatusCode::OK);
    let report = json(&body);
    assert_eq!(report["scanned"], false);
    assert_eq!(report["addresses"], 0);
    assert_eq!(report["transfers_found"], 0);

    // A skipped cycle is not a scan, so nothing has been recorded yet
    let (status, _) = get(&watcher, "/api/metrics/base").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = get(&watcher, "/api/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "{}");
    tear_down(db).await;
}

#[actix_web::test]
async fn passive_channels_cannot_be_scanned() {
    let db = prepare_test_db().await;
    let watcher = test_watcher(&db);
    let (status, _) = post(&watcher, "/api/chains/alipay/scan").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    tear_down(db).await;
}

#[actix_web::test]
async fn metrics_are_reset() {
    let db = prepare_test_db().await;
    let watcher = test_watcher(&db);
    watcher.scan_metrics().record_error(chain_pay_engine::db_types::Chain::Base, "rpc unreachable");
    let (status, body) = get(&watcher, "/api/metrics/base").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["last_error"], "rpc unreachable");

    let (status, _) = post(&watcher, "/api/metrics/reset").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(&watcher, "/api/metrics/base").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    tear_down(db).await;
}

#[actix_web::test]
async fn wallet_cache_is_invalidated() {
    let db = prepare_test_db().await;
    let watcher = test_watcher(&db);
    let (status, body) = post(&watcher, "/api/wallets/invalidate_cache").await;
    assert_eq!(status, StatusCode::OK);
    let res: JsonResponse = serde_json::from_str(&body).unwrap();
    assert!(res.success);
    tear_down(db).await;
}
