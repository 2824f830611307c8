use std::time::Duration;

use chain_pay_engine::{db_types::Order, OrderManagement};
use chrono::Utc;
use log::*;
use tokio::task::JoinHandle;

/// Starts the order expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Expired orders release their unique amounts, so the allocator can hand the same amount to a new order.
pub fn start_expiry_worker<B>(db: B, interval: Duration) -> JoinHandle<()>
where B: OrderManagement + 'static {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Order expiry worker started. Checking every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running order expiry job");
            match db.expire_pending_orders(Utc::now()).await {
                Ok(expired) if expired.is_empty() => trace!("🕰️ No orders expired"),
                Ok(expired) => {
                    info!("🕰️ {} orders expired", expired.len());
                    debug!("🕰️ Expired orders: {}", order_list(&expired));
                },
                Err(e) => {
                    error!("🕰️ Error running order expiry job: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] trade_no: {} chain: {} amount: {:?}", o.id, o.trade_no, o.chain, o.unique_amount))
        .collect::<Vec<String>>()
        .join(", ")
}
