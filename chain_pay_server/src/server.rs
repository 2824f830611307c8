use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use chain_pay_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    BlockchainWatcher,
    SqliteDatabase,
};
use log::*;

use crate::{
    config::{PushConfig, ServerConfig},
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    middleware::{HmacMiddlewareFactory, PUSH_SIGNATURE_HEADER},
    routes::{
        health,
        ChainMetricsRoute,
        ChainsRoute,
        DisableChainRoute,
        EnableChainRoute,
        InvalidateWalletCacheRoute,
        MetricsRoute,
        PushPaymentRoute,
        ResetMetricsRoute,
        ScanChainRoute,
    },
};

const EVENT_BUFFER_SIZE: usize = 64;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let producers = start_event_handlers().await;
    let watcher = BlockchainWatcher::new(config.watcher.clone(), db.clone(), producers)
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    watcher.start();
    let expiry_worker = start_expiry_worker(db.clone(), config.order_expiry_interval);
    let srv = create_server_instance(config, watcher.clone())?;
    let result = srv.await;
    info!("🚀️ HTTP server has stopped. Shutting down the watcher");
    expiry_worker.abort();
    watcher.stop().await;
    db.close().await;
    Ok(result?)
}

/// Notification delivery to merchants happens outside this process. The hooks here record what would be sent.
pub fn create_event_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(|ev| {
        Box::pin(async move {
            let order = &ev.order;
            info!(
                "📬️ Order #{} [{}] for merchant #{} is paid. Amount {:?} on {}",
                order.id, order.trade_no, order.merchant_id, order.actual_amount, order.chain
            );
        })
    });
    hooks.on_chain_alert(|ev| {
        Box::pin(async move {
            error!("📬️ [{}] Chain alert raised at {}: {}", ev.chain, ev.raised_at, ev.condition);
        })
    });
    hooks
}

async fn start_event_handlers() -> EventProducers {
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, create_event_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    producers
}

pub fn create_server_instance(
    config: ServerConfig,
    watcher: BlockchainWatcher<SqliteDatabase>,
) -> Result<Server, ServerError> {
    let push_config = config.push.clone();
    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("cpg::access_log"))
            .app_data(web::Data::new(watcher.clone()))
            .configure(|cfg| configure_routes(cfg, &push_config))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Mounts `/health` and the `/api` scope. The push scope sits behind the signature middleware.
pub fn configure_routes(cfg: &mut web::ServiceConfig, push: &PushConfig) {
    let push_scope = web::scope("/push")
        .wrap(HmacMiddlewareFactory::new(PUSH_SIGNATURE_HEADER, push.hmac_secret.clone(), push.hmac_checks))
        .service(PushPaymentRoute::<SqliteDatabase>::new());
    let api_scope = web::scope("/api")
        .service(ChainsRoute::<SqliteDatabase>::new())
        .service(EnableChainRoute::<SqliteDatabase>::new())
        .service(DisableChainRoute::<SqliteDatabase>::new())
        .service(ScanChainRoute::<SqliteDatabase>::new())
        .service(MetricsRoute::<SqliteDatabase>::new())
        .service(ResetMetricsRoute::<SqliteDatabase>::new())
        .service(ChainMetricsRoute::<SqliteDatabase>::new())
        .service(InvalidateWalletCacheRoute::<SqliteDatabase>::new())
        .service(push_scope);
    cfg.service(health).service(api_scope);
}
