//! # ChainPay server
//! This crate hosts the HTTP server for the ChainPay gateway. It is responsible for:
//! * Running the [`chain_pay_engine::BlockchainWatcher`], which scans every enabled chain and settles orders.
//! * Accepting signed payment notifications from passive channels (WeChat Pay, Alipay).
//! * Giving operators control over the chain listeners, and visibility of scan metrics.
//! * Sweeping expired orders, so that their unique amounts can be reused.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `GET /api/chains`: Status of every chain and passive channel.
//! * `POST /api/chains/{chain}/enable`, `POST /api/chains/{chain}/disable`: Start or stop a chain listener.
//! * `POST /api/chains/{chain}/scan`: Run one scan cycle immediately.
//! * `GET /api/metrics`, `GET /api/metrics/{chain}`, `POST /api/metrics/reset`: Scan metrics.
//! * `POST /api/wallets/invalidate_cache`: Pick up wallet changes on the next scan.
//! * `POST /api/push/{chain}`: Payment notifications from passive channels. Requests must be signed.
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;
pub mod helpers;
pub mod middleware;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
