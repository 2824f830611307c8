//! Request handler definitions
//!
//! Define each route and its handler here. Handlers only translate between HTTP and the watcher; anything longer
//! than a few lines belongs in the engine.
//!
//! Handlers run on actix worker threads, and every worker handles its requests one at a time, so nothing in here may
//! block. A manual scan cycle can take a while against a slow RPC node, but it is awaited, so the worker keeps
//! serving other requests in the meantime.
use actix_web::{get, web, HttpResponse, Responder};
use chain_pay_engine::{db_types::Chain, traits::ChainPayDatabase, BlockchainWatcher};
use log::*;

use crate::{
    data_objects::{JsonResponse, PushPaymentRequest, PushPaymentResponse},
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

fn parse_chain(name: &str) -> Result<Chain, ServerError> {
    name.parse::<Chain>().map_err(|e| ServerError::InvalidRequestPath(e.to_string()))
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Chains  ----------------------------------------------------
route!(chains => Get "/chains" impl ChainPayDatabase);
/// Status of every chain and passive channel. See [`chain_pay_engine::ListenerStatus`].
pub async fn chains<B: ChainPayDatabase>(
    watcher: web::Data<BlockchainWatcher<B>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received listener status request");
    let status = watcher.listener_status().await?;
    Ok(HttpResponse::Ok().json(status))
}

route!(enable_chain => Post "/chains/{chain}/enable" impl ChainPayDatabase);
pub async fn enable_chain<B: ChainPayDatabase>(
    path: web::Path<String>,
    watcher: web::Data<BlockchainWatcher<B>>,
) -> Result<HttpResponse, ServerError> {
    let chain = path.into_inner();
    info!("💻️ Request to enable {chain}");
    watcher.enable_chain(&chain).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("{chain} enabled"))))
}

route!(disable_chain => Post "/chains/{chain}/disable" impl ChainPayDatabase);
pub async fn disable_chain<B: ChainPayDatabase>(
    path: web::Path<String>,
    watcher: web::Data<BlockchainWatcher<B>>,
) -> Result<HttpResponse, ServerError> {
    let chain = path.into_inner();
    info!("💻️ Request to disable {chain}");
    watcher.disable_chain(&chain).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("{chain} disabled"))))
}

route!(scan_chain => Post "/chains/{chain}/scan" impl ChainPayDatabase);
/// Runs one scan cycle right away, whether or not the chain's loop is running, and returns the cycle report.
pub async fn scan_chain<B: ChainPayDatabase>(
    path: web::Path<String>,
    watcher: web::Data<BlockchainWatcher<B>>,
) -> Result<HttpResponse, ServerError> {
    let chain = parse_chain(&path)?;
    info!("💻️ Manual scan requested for {chain}");
    let report = watcher.run_scan_cycle(chain).await?;
    Ok(HttpResponse::Ok().json(report))
}

//----------------------------------------------   Metrics  ----------------------------------------------------
route!(metrics => Get "/metrics" impl ChainPayDatabase);
pub async fn metrics<B: ChainPayDatabase>(watcher: web::Data<BlockchainWatcher<B>>) -> impl Responder {
    trace!("💻️ Received metrics request");
    HttpResponse::Ok().json(watcher.metrics())
}

route!(reset_metrics => Post "/metrics/reset" impl ChainPayDatabase);
pub async fn reset_metrics<B: ChainPayDatabase>(watcher: web::Data<BlockchainWatcher<B>>) -> impl Responder {
    info!("💻️ Resetting scan metrics");
    watcher.scan_metrics().reset();
    HttpResponse::Ok().json(JsonResponse::success("Metrics reset"))
}

route!(chain_metrics => Get "/metrics/{chain}" impl ChainPayDatabase);
pub async fn chain_metrics<B: ChainPayDatabase>(
    path: web::Path<String>,
    watcher: web::Data<BlockchainWatcher<B>>,
) -> Result<HttpResponse, ServerError> {
    let chain = path.into_inner();
    trace!("💻️ Received metrics request for {chain}");
    let snapshot = watcher
        .chain_metrics(&chain)?
        .ok_or_else(|| ServerError::NoRecordFound(format!("No metrics have been recorded for {chain} yet")))?;
    Ok(HttpResponse::Ok().json(snapshot))
}

//----------------------------------------------   Wallets  ----------------------------------------------------
route!(invalidate_wallet_cache => Post "/wallets/invalidate_cache" impl ChainPayDatabase);
/// Call after adding, removing or toggling wallets so that the next scan cycle sees the change.
pub async fn invalidate_wallet_cache<B: ChainPayDatabase>(watcher: web::Data<BlockchainWatcher<B>>) -> impl Responder {
    info!("💻️ Invalidating the wallet cache");
    watcher.invalidate_wallet_cache();
    HttpResponse::Ok().json(JsonResponse::success("Wallet cache invalidated"))
}

//------------------------------------------   Passive channel push  ---------------------------------------------
route!(push_payment => Post "/{chain}" impl ChainPayDatabase);
/// Payment notification from a passive channel. Mounted under `/api/push`, behind the signature middleware.
///
/// Replaying a notification is harmless: the outcome is reported as `duplicate` and nothing changes.
pub async fn push_payment<B: ChainPayDatabase>(
    path: web::Path<String>,
    body: web::Json<PushPaymentRequest>,
    watcher: web::Data<BlockchainWatcher<B>>,
) -> Result<HttpResponse, ServerError> {
    let chain = parse_chain(&path)?;
    let request = body.into_inner();
    info!("💻️ Push payment on {chain}: {} [{}]", request.amount, request.reference);
    let outcome = watcher.process_push_payment(request.into_push(chain)).await?;
    debug!("💻️ Push on {chain} resolved as {outcome:?}");
    Ok(HttpResponse::Ok().json(PushPaymentResponse::from(outcome)))
}
