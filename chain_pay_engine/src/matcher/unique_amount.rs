use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::*;
use rust_decimal::Decimal;

use crate::{
    db_types::{Chain, FeeType, NewOrder, Order},
    helpers::{normalize_address, normalize_amount},
    traits::{OrderManagement, StoreError},
};

/// Number of consecutive increments tried before falling back to time-derived offsets.
pub const MAX_LINEAR_PROBES: u32 = 1000;
/// Number of time-derived offsets tried before giving up on a collision-free amount.
pub const TIMESTAMP_PROBES: u32 = 100;
/// Orders are re-allocated this many times if the database rejects the amount as taken.
pub const MAX_PLACEMENT_ATTEMPTS: u32 = 5;

const FIAT_OFFSET_MODULUS: u128 = 10_000;
const CRYPTO_OFFSET_MODULUS: u128 = 1_000_000;
const LAST_RESORT_MULTIPLIER: u128 = 100;

/// The smallest amount increment on a chain: 0.01 for fiat channels, 0.000001 for crypto.
pub fn step_for(chain: Chain) -> Decimal {
    Decimal::new(1, chain.precision())
}

/// Picks the smallest amount at or above `base` that is not in `taken`, moving in steps of [`step_for`].
///
/// If the first [`MAX_LINEAR_PROBES`] candidates are all taken, offsets derived from `clock` are tried instead, and
/// if those fail too, an offset from a wider range is returned unchecked. The database's uniqueness constraint is the
/// final arbiter in that case.
///
/// Returns `None` if a candidate would overflow, which only happens for bases at the edge of the decimal range.
pub fn probe_unique_amount<F>(chain: Chain, base: Decimal, taken: &HashSet<Decimal>, mut clock: F) -> Option<Decimal>
where F: FnMut() -> u128 {
    let step = step_for(chain);
    let base = normalize_amount(base, chain);
    let taken = taken.iter().map(|a| normalize_amount(*a, chain)).collect::<HashSet<_>>();
    let offset_amount = |offset: u64| step.checked_mul(Decimal::from(offset)).and_then(|o| base.checked_add(o));
    for i in 0..MAX_LINEAR_PROBES {
        let candidate = offset_amount(u64::from(i))?;
        if !taken.contains(&candidate) {
            return Some(candidate);
        }
    }
    let modulus = if chain.is_passive() { FIAT_OFFSET_MODULUS } else { CRYPTO_OFFSET_MODULUS };
    for _ in 0..TIMESTAMP_PROBES {
        let candidate = offset_amount((clock() % modulus) as u64)?;
        if !taken.contains(&candidate) {
            return Some(candidate);
        }
    }
    let candidate = offset_amount((clock() % (modulus * LAST_RESORT_MULTIPLIER)) as u64)?;
    warn!("💸️ [{chain}] No free amount near {base}. Falling back to {candidate}");
    Some(candidate)
}

fn clock_nanos() -> u128 {
    Utc::now().timestamp_nanos_opt().map(|n| n.unsigned_abs() as u128).unwrap_or_default()
}

/// Everything needed to place an order, before its unique amount is known.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub trade_no: String,
    pub merchant_id: i64,
    pub chain: Chain,
    pub to_address: String,
    pub base_amount: Decimal,
    pub settlement_amount: Decimal,
    pub fee: Decimal,
    pub fee_type: FeeType,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct UniqueAmountAllocator<B> {
    db: B,
}

impl<B: OrderManagement> UniqueAmountAllocator<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// An amount near `base` that no pending order on `chain` currently expects.
    pub async fn allocate(&self, chain: Chain, base: Decimal) -> Result<Decimal, StoreError> {
        let taken = self.db.list_pending_amounts(chain).await?.into_iter().collect::<HashSet<_>>();
        let amount = probe_unique_amount(chain, base, &taken, clock_nanos)
            .ok_or_else(|| StoreError::InvalidData(format!("{base} is too large to allocate a unique amount")))?;
        trace!("💸️ [{chain}] Allocated {amount} for a base amount of {base}. {} amounts in use", taken.len());
        Ok(amount)
    }

    /// Allocates a unique amount and stores the order as pending.
    ///
    /// Two concurrent placements can pick the same amount. The loser's insert fails the uniqueness check, and it
    /// simply allocates again.
    pub async fn place_order(&self, request: OrderRequest) -> Result<Order, StoreError> {
        let chain = request.chain;
        let to_address = normalize_address(chain, &request.to_address)
            .map_err(|e| StoreError::InvalidData(format!("Invalid receiving address. {e}")))?;
        let mut last_error = None;
        for attempt in 1..=MAX_PLACEMENT_ATTEMPTS {
            let amount = self.allocate(chain, request.base_amount).await?;
            let order = NewOrder {
                trade_no: request.trade_no.clone(),
                merchant_id: request.merchant_id,
                chain,
                to_address: to_address.clone(),
                amount,
                unique_amount: Some(amount),
                settlement_amount: request.settlement_amount,
                fee: request.fee,
                fee_type: request.fee_type,
                expires_at: request.expires_at,
            };
            match self.db.insert_order(order).await {
                Ok(order) => return Ok(order),
                Err(e @ StoreError::AmountCollision { .. }) => {
                    debug!("💸️ [{chain}] Attempt {attempt} to place [{}] collided. {e}", request.trade_no);
                    last_error = Some(e);
                },
                Err(e) => return Err(e),
            }
        }
        warn!("💸️ [{chain}] Could not find a free amount for [{}]", request.trade_no);
        Err(last_error.unwrap_or_else(|| StoreError::InvalidData("No unique amount available".to_string())))
    }
}
