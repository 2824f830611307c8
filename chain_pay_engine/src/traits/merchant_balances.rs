use std::future::Future;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::{db_types::FeeType, traits::StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MerchantBalance {
    pub merchant_id: i64,
    pub balance: Decimal,
    pub frozen_balance: Decimal,
}

pub trait MerchantBalances: Clone + Send + Sync {
    /// Credits a settled order to the merchant, applying the fee according to `fee_type`.
    fn credit_merchant_balance(
        &self,
        merchant_id: i64,
        settlement_amount: Decimal,
        fee: Decimal,
        fee_type: FeeType,
    ) -> impl Future<Output = Result<MerchantBalance, StoreError>> + Send;

    fn fetch_merchant_balance(
        &self,
        merchant_id: i64,
    ) -> impl Future<Output = Result<Option<MerchantBalance>, StoreError>> + Send;
}
