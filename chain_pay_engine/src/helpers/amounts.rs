use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use thiserror::Error;

use crate::db_types::Chain;

/// rust_decimal supports at most 28 decimal places.
const MAX_DECIMALS: u32 = 28;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("Invalid amount: {0}")]
    Invalid(String),
    #[error("Amount is too large to represent: {0}")]
    Overflow(String),
    #[error("Unsupported number of decimals: {0}")]
    UnsupportedDecimals(u32),
}

fn from_u128_subunits(value: u128, decimals: u32, raw: &str) -> Result<Decimal, AmountError> {
    if decimals > MAX_DECIMALS {
        return Err(AmountError::UnsupportedDecimals(decimals));
    }
    let divisor = 10u128.pow(decimals);
    let overflow = || AmountError::Overflow(raw.to_string());
    let whole = i128::try_from(value / divisor).map_err(|_| overflow())?;
    let fraction = i128::try_from(value % divisor).map_err(|_| overflow())?;
    let whole = Decimal::try_from_i128_with_scale(whole, 0).map_err(|_| overflow())?;
    let fraction = Decimal::try_from_i128_with_scale(fraction, decimals).map_err(|_| overflow())?;
    whole.checked_add(fraction).ok_or_else(overflow)
}

/// Parse an integer number of token subunits, e.g. `"1500000"` with 6 decimals is `1.5`.
pub fn parse_token_amount(raw: &str, decimals: u32) -> Result<Decimal, AmountError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountError::Invalid(raw.to_string()));
    }
    let value = trimmed.parse::<u128>().map_err(|_| AmountError::Overflow(raw.to_string()))?;
    from_u128_subunits(value, decimals, raw)
}

/// Parse a hex big integer (as found in ERC20 log data) of token subunits.
pub fn parse_hex_amount(raw: &str, decimals: u32) -> Result<Decimal, AmountError> {
    let digits = raw.trim().trim_start_matches("0x").trim_start_matches('0');
    if digits.is_empty() {
        return Ok(Decimal::ZERO);
    }
    if digits.len() > 32 {
        return Err(AmountError::Overflow(raw.to_string()));
    }
    let value = u128::from_str_radix(digits, 16).map_err(|_| AmountError::Invalid(raw.to_string()))?;
    from_u128_subunits(value, decimals, raw)
}

/// Parse a JSON-RPC hex quantity such as a block number.
pub fn parse_hex_u64(raw: &str) -> Result<u64, AmountError> {
    let digits = raw.trim().trim_start_matches("0x");
    if digits.is_empty() {
        return Err(AmountError::Invalid(raw.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| AmountError::Invalid(raw.to_string()))
}

pub fn to_hex_quantity(value: u64) -> String {
    format!("0x{value:x}")
}

/// Convert a signed integer count of subunits (e.g. Tron sun) into a decimal amount.
pub fn from_subunits(value: i64, decimals: u32) -> Result<Decimal, AmountError> {
    if decimals > MAX_DECIMALS {
        return Err(AmountError::UnsupportedDecimals(decimals));
    }
    if value < 0 {
        return Err(AmountError::Invalid(value.to_string()));
    }
    Ok(Decimal::new(value, decimals))
}

/// Round an amount to the matching precision of a chain, half away from zero.
pub fn normalize_amount(amount: Decimal, chain: Chain) -> Decimal {
    amount.round_dp_with_strategy(chain.precision(), RoundingStrategy::MidpointAwayFromZero)
}

/// A fixed-scale string representation, so that equal amounts always compare equal as text.
pub fn canonical_amount(amount: Decimal, precision: u32) -> String {
    let mut value = amount.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero);
    value.rescale(precision);
    value.to_string()
}

/// Gas prices come back in wei. Report them in gwei.
pub(crate) fn wei_to_gwei(raw: &str) -> Result<f64, AmountError> {
    let gwei = parse_hex_amount(raw, 9)?;
    gwei.to_f64().ok_or_else(|| AmountError::Overflow(raw.to_string()))
}
