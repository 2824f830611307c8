use std::fmt::Display;

use chain_pay_engine::{
    db_types::{Chain, Order, OrderStatusType},
    MatchOutcome,
    PushPayment,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }
}

/// Body of a passive channel push. Amounts may be sent as strings (preferred) or numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushPaymentRequest {
    pub amount: Decimal,
    pub reference: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub payer: Option<String>,
}

impl PushPaymentRequest {
    pub fn into_push(self, chain: Chain) -> PushPayment {
        PushPayment { chain, amount: self.amount, reference: self.reference, address: self.address, payer: self.payer }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOutcome {
    Settled,
    Duplicate,
    Unmatched,
    RaceLost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushPaymentResponse {
    pub outcome: PushOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<PaidOrder>,
}

/// The parts of a settled order that the push sender may see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaidOrder {
    pub id: i64,
    pub trade_no: String,
    pub status: OrderStatusType,
    pub actual_amount: Option<Decimal>,
    pub tx_hash: Option<String>,
}

impl From<Order> for PaidOrder {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            trade_no: order.trade_no,
            status: order.status,
            actual_amount: order.actual_amount,
            tx_hash: order.tx_hash,
        }
    }
}

impl From<MatchOutcome> for PushPaymentResponse {
    fn from(outcome: MatchOutcome) -> Self {
        let (outcome, order) = match outcome {
            MatchOutcome::Settled(order) => (PushOutcome::Settled, Some(order.into())),
            MatchOutcome::Duplicate => (PushOutcome::Duplicate, None),
            MatchOutcome::Unmatched => (PushOutcome::Unmatched, None),
            MatchOutcome::RaceLost => (PushOutcome::RaceLost, None),
        };
        Self { outcome, order }
    }
}
