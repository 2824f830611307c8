use chrono::{DateTime, Utc};

use crate::{
    db_types::{Chain, Order},
    metrics::AlertCondition,
};

/// Published once, right after a transfer settles an order.
#[derive(Debug, Clone)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Published when a failed scan cycle leaves a chain in an alerting state.
#[derive(Debug, Clone)]
pub struct ChainAlertEvent {
    pub chain: Chain,
    pub condition: AlertCondition,
    pub raised_at: DateTime<Utc>,
}
