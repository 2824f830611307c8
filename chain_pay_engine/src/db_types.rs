use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(String);

//--------------------------------------        Chain         ---------------------------------------------------------
/// Every blockchain or payment rail the watcher knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Trx,
    Trc20,
    Erc20,
    Bep20,
    Polygon,
    Optimism,
    Arbitrum,
    Avalanche,
    Base,
    Wechat,
    Alipay,
}

/// How transfers are discovered for a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStrategy {
    /// Account history of native coin transfers (Tron TRX).
    NativeCoin,
    /// Token transfer history scoped to a contract (Tron TRC20).
    TokenTransfer,
    /// `eth_getLogs` over a block range, filtered on the ERC20 `Transfer` event.
    GenericEvm,
    /// No polling at all. Payments arrive through the push endpoint.
    Passive,
}

impl Chain {
    pub const ALL: [Chain; 11] = [
        Chain::Trx,
        Chain::Trc20,
        Chain::Erc20,
        Chain::Bep20,
        Chain::Polygon,
        Chain::Optimism,
        Chain::Arbitrum,
        Chain::Avalanche,
        Chain::Base,
        Chain::Wechat,
        Chain::Alipay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Trx => "trx",
            Chain::Trc20 => "trc20",
            Chain::Erc20 => "erc20",
            Chain::Bep20 => "bep20",
            Chain::Polygon => "polygon",
            Chain::Optimism => "optimism",
            Chain::Arbitrum => "arbitrum",
            Chain::Avalanche => "avalanche",
            Chain::Base => "base",
            Chain::Wechat => "wechat",
            Chain::Alipay => "alipay",
        }
    }

    pub fn strategy(&self) -> ScanStrategy {
        match self {
            Chain::Trx => ScanStrategy::NativeCoin,
            Chain::Trc20 => ScanStrategy::TokenTransfer,
            Chain::Wechat | Chain::Alipay => ScanStrategy::Passive,
            _ => ScanStrategy::GenericEvm,
        }
    }

    /// Passive rails are push-based payment apps. They are never polled.
    pub fn is_passive(&self) -> bool {
        self.strategy() == ScanStrategy::Passive
    }

    pub fn is_evm(&self) -> bool {
        self.strategy() == ScanStrategy::GenericEvm
    }

    /// Tron chains use Base58Check addresses, which are case-sensitive.
    pub fn is_tron(&self) -> bool {
        matches!(self, Chain::Trx | Chain::Trc20)
    }

    /// Number of decimal places used when matching amounts on this chain.
    pub fn precision(&self) -> u32 {
        if self.is_passive() {
            2
        } else {
            6
        }
    }

    /// The `system_config` key that holds the enabled flag for a passive channel.
    pub fn passive_flag_key(&self) -> Option<String> {
        self.is_passive().then(|| format!("{}_enabled", self.as_str()))
    }
}

impl Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Chain::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ConversionError(format!("Unknown chain: {s}")))
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order is waiting for a matching transfer.
    Pending,
    /// A transfer was matched and the order was settled.
    Paid,
    /// The order was not paid before its expiry time.
    Expired,
    /// The order was cancelled by the merchant or an admin.
    Cancelled,
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "Pending"),
            OrderStatusType::Paid => write!(f, "Paid"),
            OrderStatusType::Expired => write!(f, "Expired"),
            OrderStatusType::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatusType::Pending
        })
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Expired" => Ok(Self::Expired),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------       FeeType         ---------------------------------------------------------
/// How the platform fee is collected when an order settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeType {
    /// The merchant collected into their own wallet. The fee was pre-funded into the frozen balance and is released
    /// from there.
    Balance,
    /// The platform collected the money. The fee is deducted before crediting the merchant.
    Deduction,
}

impl FeeType {
    pub fn code(&self) -> i64 {
        match self {
            FeeType::Balance => 1,
            FeeType::Deduction => 2,
        }
    }
}

impl TryFrom<i64> for FeeType {
    type Error = ConversionError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(FeeType::Balance),
            2 => Ok(FeeType::Deduction),
            v => Err(ConversionError(format!("Invalid fee type: {v}"))),
        }
    }
}

//--------------------------------------        Order         ---------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: i64,
    /// The merchant's own order reference
    pub trade_no: String,
    pub merchant_id: i64,
    pub chain: Chain,
    pub to_address: String,
    /// The expected amount. Orders created before unique amounts were introduced only carry this field.
    pub amount: Decimal,
    pub unique_amount: Option<Decimal>,
    pub actual_amount: Option<Decimal>,
    /// The amount credited to the merchant, denominated in the settlement currency
    pub settlement_amount: Decimal,
    pub fee: Decimal,
    pub fee_type: FeeType,
    pub status: OrderStatusType,
    pub tx_hash: Option<String>,
    pub from_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       NewOrder        ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub trade_no: String,
    pub merchant_id: i64,
    pub chain: Chain,
    pub to_address: String,
    pub amount: Decimal,
    pub unique_amount: Option<Decimal>,
    pub settlement_amount: Decimal,
    pub fee: Decimal,
    pub fee_type: FeeType,
    pub expires_at: DateTime<Utc>,
}

/// The fields written when a pending order transitions to paid.
#[derive(Debug, Clone)]
pub struct SettlementFields {
    pub tx_hash: String,
    pub from_address: String,
    pub actual_amount: Decimal,
    pub paid_at: DateTime<Utc>,
}

//--------------------------------------    TransactionLog     ---------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct TransactionLog {
    pub id: i64,
    pub tx_hash: String,
    pub chain: Chain,
    pub from_address: String,
    pub to_address: String,
    pub amount: Decimal,
    pub block_number: u64,
    pub matched: bool,
    pub order_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------       Transfer        ---------------------------------------------------------
/// A transfer observed on chain (or pushed by a payment app) during one scan cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub chain: Chain,
    pub tx_hash: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: Decimal,
    pub block_number: u64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn chain_round_trips_through_strings() {
        for chain in Chain::ALL {
            assert_eq!(chain.to_string().parse::<Chain>().unwrap(), chain);
        }
        assert_eq!(" BEP20 ".parse::<Chain>().unwrap(), Chain::Bep20);
        assert!("dogecoin".parse::<Chain>().is_err());
    }

    #[test]
    fn chain_families() {
        assert_eq!(Chain::Trx.strategy(), ScanStrategy::NativeCoin);
        assert_eq!(Chain::Trc20.strategy(), ScanStrategy::TokenTransfer);
        assert_eq!(Chain::Base.strategy(), ScanStrategy::GenericEvm);
        assert!(Chain::Alipay.is_passive());
        assert_eq!(Chain::Wechat.precision(), 2);
        assert_eq!(Chain::Polygon.precision(), 6);
        assert_eq!(Chain::Wechat.passive_flag_key().as_deref(), Some("wechat_enabled"));
        assert_eq!(Chain::Trx.passive_flag_key(), None);
    }

    #[test]
    fn fee_type_codes() {
        assert_eq!(FeeType::try_from(1).unwrap(), FeeType::Balance);
        assert_eq!(FeeType::try_from(FeeType::Deduction.code()).unwrap(), FeeType::Deduction);
        assert!(FeeType::try_from(3).is_err());
    }
}
