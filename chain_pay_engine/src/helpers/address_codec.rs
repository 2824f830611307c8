//! Tron address encoding.
//!
//! Tron addresses are 21 bytes: a `0x41` network prefix followed by the 20-byte account id. On the wire (and in most
//! TronGrid responses) they appear as hex. Users see them as Base58Check: the 21 bytes, followed by the first four
//! bytes of a double SHA-256 of those 21 bytes, Base58-encoded. The display form always starts with `T`.
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::db_types::Chain;

pub const TRON_ADDRESS_PREFIX: u8 = 0x41;
const PAYLOAD_LEN: usize = 21;
const CHECKSUM_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Invalid hex address: {0}")]
    InvalidHex(String),
    #[error("Invalid Base58 address: {0}")]
    InvalidBase58(String),
    #[error("Address has {actual} bytes, but {expected} were expected")]
    InvalidLength { expected: usize, actual: usize },
    #[error("Address checksum mismatch for {0}")]
    ChecksumMismatch(String),
}

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(Sha256::digest(payload));
    let mut result = [0u8; CHECKSUM_LEN];
    result.copy_from_slice(&digest[..CHECKSUM_LEN]);
    result
}

fn is_base58_form(address: &str) -> bool {
    address.len() == 34 && address.starts_with('T')
}

/// Convert a hex Tron address (`41…`, optionally `0x`-prefixed, or a bare 20-byte account id) to Base58Check.
///
/// Input that is already in Base58 form is validated and returned unchanged.
pub fn hex_to_base58(address: &str) -> Result<String, CodecError> {
    let address = address.trim();
    if is_base58_form(address) {
        base58_to_bytes(address)?;
        return Ok(address.to_string());
    }
    let hex_str = address.strip_prefix("0x").unwrap_or(address);
    let mut bytes = hex::decode(hex_str).map_err(|e| CodecError::InvalidHex(format!("{address}: {e}")))?;
    if bytes.len() == PAYLOAD_LEN - 1 {
        bytes.insert(0, TRON_ADDRESS_PREFIX);
    }
    if bytes.len() != PAYLOAD_LEN {
        return Err(CodecError::InvalidLength { expected: PAYLOAD_LEN, actual: bytes.len() });
    }
    let check = checksum(&bytes);
    bytes.extend_from_slice(&check);
    Ok(bs58::encode(bytes).into_string())
}

/// Decode a Base58Check Tron address into its 21 raw bytes, verifying the checksum.
pub fn base58_to_bytes(address: &str) -> Result<[u8; PAYLOAD_LEN], CodecError> {
    let decoded =
        bs58::decode(address.trim()).into_vec().map_err(|e| CodecError::InvalidBase58(format!("{address}: {e}")))?;
    if decoded.len() != PAYLOAD_LEN + CHECKSUM_LEN {
        return Err(CodecError::InvalidLength { expected: PAYLOAD_LEN + CHECKSUM_LEN, actual: decoded.len() });
    }
    let (payload, check) = decoded.split_at(PAYLOAD_LEN);
    if checksum(payload) != check {
        return Err(CodecError::ChecksumMismatch(address.to_string()));
    }
    let mut result = [0u8; PAYLOAD_LEN];
    result.copy_from_slice(payload);
    Ok(result)
}

/// Decode a Base58Check Tron address into lower-case hex, including the `41` prefix.
pub fn base58_to_hex(address: &str) -> Result<String, CodecError> {
    base58_to_bytes(address).map(hex::encode)
}

/// Bring an address into the form used for comparisons: canonical Base58 for Tron, lower case everywhere else.
pub fn normalize_address(chain: Chain, address: &str) -> Result<String, CodecError> {
    if chain.is_tron() {
        hex_to_base58(address)
    } else {
        Ok(address.trim().to_ascii_lowercase())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const USDT_HEX: &str = "41a614f803b6fd780986a42c78ec9c7f77e6ded13c";
    const USDT_BASE58: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

    #[test]
    fn known_contract_address() {
        assert_eq!(hex_to_base58(USDT_HEX).unwrap(), USDT_BASE58);
        assert_eq!(base58_to_hex(USDT_BASE58).unwrap(), USDT_HEX);
    }

    #[test]
    fn round_trip_preserves_bytes() {
        let raw = [0x41u8, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20];
        let encoded = hex_to_base58(&hex::encode(raw)).unwrap();
        assert!(encoded.starts_with('T'));
        assert_eq!(base58_to_bytes(&encoded).unwrap(), raw);
    }

    #[test]
    fn already_encoded_input_is_unchanged() {
        assert_eq!(hex_to_base58(USDT_BASE58).unwrap(), USDT_BASE58);
        assert_eq!(hex_to_base58(&format!("0x{}", &USDT_HEX[2..])).unwrap(), USDT_BASE58);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut bytes = bs58::decode(USDT_BASE58).into_vec().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let corrupted = bs58::encode(bytes).into_string();
        assert!(matches!(base58_to_bytes(&corrupted), Err(CodecError::ChecksumMismatch(_))));
        assert!(matches!(hex_to_base58(&corrupted), Err(CodecError::ChecksumMismatch(_))));
    }

    #[test]
    fn malformed_input() {
        assert!(matches!(hex_to_base58("41zz"), Err(CodecError::InvalidHex(_))));
        assert!(matches!(hex_to_base58("4101"), Err(CodecError::InvalidLength { .. })));
        assert!(matches!(base58_to_hex("T0OIl"), Err(CodecError::InvalidBase58(_))));
    }

    #[test]
    fn normalization_per_chain() {
        assert_eq!(normalize_address(Chain::Trc20, USDT_HEX).unwrap(), USDT_BASE58);
        assert_eq!(normalize_address(Chain::Base, " 0xAbCd ").unwrap(), "0xabcd");
    }
}
