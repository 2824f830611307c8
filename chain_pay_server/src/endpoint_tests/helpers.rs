use actix_web::{
    http::{header::ContentType, StatusCode},
    test,
    test::TestRequest,
    web,
    App,
};
use chain_pay_engine::{events::EventProducers, BlockchainWatcher, SqliteDatabase, WatcherConfig};
use cpg_common::Secret;
use log::{debug, warn};

use crate::{config::PushConfig, helpers::calculate_hmac, middleware::PUSH_SIGNATURE_HEADER, server::configure_routes};

// DO NOT re-use this secret anywhere.
pub const PUSH_SECRET: &str = "b9c3d1f0e2a84c6f8e1d7a3b5c9f0e2d";

pub async fn prepare_test_db() -> SqliteDatabase {
    let _ = env_logger::try_init().ok();
    let url = format!("sqlite://{}/cpg_server_test_{}.db", std::env::temp_dir().display(), rand::random::<u64>());
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    db.run_migrations().await.expect("Error running DB migrations");
    debug!("🚀️ Test database ready at {url}");
    db
}

pub async fn tear_down(db: SqliteDatabase) {
    db.close().await;
    let path = db.url().trim_start_matches("sqlite://").to_string();
    if let Err(e) = std::fs::remove_file(&path) {
        warn!("🚀️ Could not remove {path}: {e}");
    }
}

/// A watcher with the built-in chain list. Nothing is started, so no RPC calls are made.
pub fn test_watcher(db: &SqliteDatabase) -> BlockchainWatcher<SqliteDatabase> {
    BlockchainWatcher::new(WatcherConfig::default(), db.clone(), EventProducers::default())
        .expect("Error creating watcher")
}

pub fn push_config(hmac_checks: bool) -> PushConfig {
    PushConfig { hmac_secret: Secret::new(PUSH_SECRET.to_string()), hmac_checks }
}

pub fn signed_push(path: &str, body: &str) -> TestRequest {
    unsigned_push(path, body).insert_header((PUSH_SIGNATURE_HEADER, calculate_hmac(PUSH_SECRET, body.as_bytes())))
}

pub fn unsigned_push(path: &str, body: &str) -> TestRequest {
    TestRequest::post().uri(path).insert_header(ContentType::json()).set_payload(body.to_string())
}

/// Sends `req` through the full route table. Middleware rejections come back as errors, and are mapped to the
/// response the client would have seen.
pub async fn send_request(
    watcher: &BlockchainWatcher<SqliteDatabase>,
    push: PushConfig,
    req: TestRequest,
) -> (StatusCode, String) {
    let app =
        App::new().app_data(web::Data::new(watcher.clone())).configure(|cfg| configure_routes(cfg, &push));
    let service = test::init_service(app).await;
    match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            let body = test::read_body(res).await;
            (status, String::from_utf8_lossy(&body).into_owned())
        },
        Err(e) => (e.as_response_error().status_code(), e.to_string()),
    }
}

pub async fn get(watcher: &BlockchainWatcher<SqliteDatabase>, path: &str) -> (StatusCode, String) {
    send_request(watcher, push_config(true), TestRequest::get().uri(path)).await
}

pub async fn post(watcher: &BlockchainWatcher<SqliteDatabase>, path: &str) -> (StatusCode, String) {
    send_request(watcher, push_config(true), TestRequest::post().uri(path)).await
}
