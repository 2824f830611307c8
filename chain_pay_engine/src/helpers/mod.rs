mod address_codec;
mod amounts;

pub use address_codec::{base58_to_bytes, base58_to_hex, hex_to_base58, normalize_address, CodecError};
pub use amounts::{
    canonical_amount,
    from_subunits,
    normalize_amount,
    parse_hex_amount,
    parse_hex_u64,
    parse_token_amount,
    to_hex_quantity,
    AmountError,
};
pub(crate) use amounts::wei_to_gwei;
