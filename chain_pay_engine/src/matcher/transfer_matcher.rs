use std::sync::Arc;

use chrono::Utc;
use log::*;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    db_types::{Chain, Order, OrderStatusType, SettlementFields, Transfer},
    events::{EventProducers, OrderPaidEvent},
    helpers::{normalize_address, normalize_amount},
    matcher::MatchError,
    metrics::ScanMetrics,
    traits::{ChainPayDatabase, InsertLogResult},
};

/// What became of a single transfer.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// The transaction had been logged before. Nothing was done.
    Duplicate,
    /// Logged, but no pending order expects this amount.
    Unmatched,
    /// A candidate order was found, but it was settled or expired by someone else first.
    RaceLost,
    /// The order was settled by this transfer.
    Settled(Order),
}

impl MatchOutcome {
    pub fn is_settled(&self) -> bool {
        matches!(self, MatchOutcome::Settled(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchSummary {
    pub settled: usize,
    pub duplicates: usize,
    pub unmatched: usize,
    pub race_lost: usize,
    pub failed: usize,
}

/// A payment notification from a passive channel.
#[derive(Debug, Clone)]
pub struct PushPayment {
    pub chain: Chain,
    pub amount: Decimal,
    /// The channel's own transaction reference. It must be unique per channel.
    pub reference: String,
    /// The receiving account, when the channel reports it.
    pub address: Option<String>,
    pub payer: Option<String>,
}

/// The synthetic transaction hash used for push payments.
pub fn push_tx_hash(chain: Chain, reference: &str) -> String {
    format!("push:{chain}:{reference}")
}

pub struct TransferMatcher<B> {
    db: B,
    metrics: Arc<ScanMetrics>,
    producers: EventProducers,
}

impl<B: ChainPayDatabase> TransferMatcher<B> {
    pub fn new(db: B, metrics: Arc<ScanMetrics>, producers: EventProducers) -> Self {
        Self { db, metrics, producers }
    }

    /// Records the transfer in the transaction log and, if it pays a pending order, settles that order.
    ///
    /// Safe to call any number of times with the same transfer: only the first call has any effect.
    pub async fn process_transfer(&self, transfer: &Transfer) -> Result<MatchOutcome, MatchError> {
        let chain = transfer.chain;
        match self.db.insert_transaction_log(transfer).await? {
            InsertLogResult::AlreadyExists(tx) => {
                debug!("💸️ [{chain}] {tx} has already been processed");
                self.metrics.record_duplicate_tx(chain);
                return Ok(MatchOutcome::Duplicate);
            },
            InsertLogResult::Inserted(log) => {
                trace!("💸️ [{chain}] Logged {} for {} to {}", log.tx_hash, log.amount, log.to_address);
            },
        }
        let amount = normalize_amount(transfer.amount, chain);
        let address = (!transfer.to_address.is_empty()).then_some(transfer.to_address.as_str());
        let candidate = match self.db.find_pending_by_unique_amount(chain, address, amount).await? {
            Some(order) => Some(order),
            None => self.db.find_pending_by_legacy_amount(chain, address, amount).await?,
        };
        let Some(candidate) = candidate else {
            let to = &transfer.to_address;
            info!("💸️ [{chain}] No pending order expects {amount} at {to}. Tx {}", transfer.tx_hash);
            return Ok(MatchOutcome::Unmatched);
        };
        // The lookup and the update are separate statements, so check again before upgrading
        match self.db.fetch_order(candidate.id).await? {
            Some(order) if order.status == OrderStatusType::Pending => {},
            _ => {
                debug!("💸️ [{chain}] Order #{} is no longer pending. Tx {}", candidate.id, transfer.tx_hash);
                return Ok(MatchOutcome::RaceLost);
            },
        }
        let fields = SettlementFields {
            tx_hash: transfer.tx_hash.clone(),
            from_address: transfer.from_address.clone(),
            actual_amount: amount,
            paid_at: Utc::now(),
        };
        let updated = self.db.conditional_settle(candidate.id, OrderStatusType::Pending, fields.clone()).await?;
        if updated == 0 {
            debug!("💸️ [{chain}] Order #{} was settled by another transfer first", candidate.id);
            return Ok(MatchOutcome::RaceLost);
        }
        if let Err(e) = self.db.mark_transaction_matched(&transfer.tx_hash, candidate.id).await {
            let id = candidate.id;
            error!("💸️ [{chain}] Order #{id} is paid, but {} could not be linked to it. {e}", fields.tx_hash);
            self.metrics.record_error(chain, &e.to_string());
        }
        self.metrics.record_order_matched(chain);
        let order = settled_copy(candidate, fields);
        info!(
            "💸️ [{chain}] Order #{} [{}] paid with {} in {}",
            order.id,
            order.trade_no,
            transfer.amount,
            transfer.tx_hash
        );
        self.credit_merchant(&order);
        self.announce(order.clone());
        Ok(MatchOutcome::Settled(order))
    }

    /// Processes every transfer from a scan. Errors are logged against the transfer that caused them and do not stop
    /// the batch.
    pub async fn process_batch(&self, transfers: Vec<Transfer>) -> MatchSummary {
        let mut summary = MatchSummary::default();
        for transfer in transfers {
            match self.process_transfer(&transfer).await {
                Ok(MatchOutcome::Settled(_)) => summary.settled += 1,
                Ok(MatchOutcome::Duplicate) => summary.duplicates += 1,
                Ok(MatchOutcome::Unmatched) => summary.unmatched += 1,
                Ok(MatchOutcome::RaceLost) => summary.race_lost += 1,
                Err(e) => {
                    error!("💸️ [{}] Could not process {}. {e}", transfer.chain, transfer.tx_hash);
                    self.metrics.record_error(transfer.chain, &e.to_string());
                    summary.failed += 1;
                },
            }
        }
        summary
    }

    /// Feeds a payment notification from a passive channel through the same path as on-chain transfers.
    pub async fn process_push_payment(&self, push: PushPayment) -> Result<MatchOutcome, MatchError> {
        let chain = push.chain;
        if !chain.is_passive() {
            return Err(MatchError::NotPassive(chain));
        }
        if !self.db.passive_channel_enabled(chain).await? {
            return Err(MatchError::ChannelDisabled(chain));
        }
        if push.amount <= Decimal::ZERO {
            return Err(MatchError::InvalidAmount(push.amount.to_string()));
        }
        let reference = push.reference.trim();
        if reference.is_empty() {
            return Err(MatchError::InvalidReference("the reference is empty".to_string()));
        }
        let to_address = match push.address.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            Some(a) => normalize_address(chain, a).map_err(|e| MatchError::InvalidReference(e.to_string()))?,
            None => String::new(),
        };
        let transfer = Transfer {
            chain,
            tx_hash: push_tx_hash(chain, reference),
            from_address: push.payer.unwrap_or_default(),
            to_address,
            amount: push.amount,
            block_number: 0,
        };
        self.process_transfer(&transfer).await
    }

    fn credit_merchant(&self, order: &Order) {
        let db = self.db.clone();
        let metrics = Arc::clone(&self.metrics);
        let (order_id, merchant_id, chain) = (order.id, order.merchant_id, order.chain);
        let (settlement, fee, fee_type) = (order.settlement_amount, order.fee, order.fee_type);
        tokio::spawn(async move {
            match db.credit_merchant_balance(merchant_id, settlement, fee, fee_type).await {
                Ok(balance) => {
                    let total = balance.balance;
                    debug!("💸️ Merchant #{merchant_id} credited for order #{order_id}. Balance {total}");
                },
                Err(e) => {
                    error!("💸️ Could not credit merchant #{merchant_id} for order #{order_id}. {e}");
                    metrics.record_error(chain, &e.to_string());
                },
            }
        });
    }

    fn announce(&self, order: Order) {
        let producers = self.producers.clone();
        tokio::spawn(async move {
            producers.publish_order_paid(OrderPaidEvent::new(order)).await;
        });
    }
}

fn settled_copy(mut order: Order, fields: SettlementFields) -> Order {
    order.status = OrderStatusType::Paid;
    order.tx_hash = Some(fields.tx_hash);
    order.from_address = Some(fields.from_address);
    order.actual_amount = Some(fields.actual_amount);
    order.paid_at = Some(fields.paid_at);
    order.updated_at = fields.paid_at;
    order
}
