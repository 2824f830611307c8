//! # Order matching
//!
//! Two halves of the same bargain live here. When an order is placed, the [`UniqueAmountAllocator`] picks an expected
//! amount that no other pending order on the chain is waiting for. When a transfer arrives, the [`TransferMatcher`]
//! uses that amount to find the order, settles it exactly once, and credits the merchant.
mod errors;
mod transfer_matcher;
mod unique_amount;

pub use errors::MatchError;
pub use transfer_matcher::{push_tx_hash, MatchOutcome, MatchSummary, PushPayment, TransferMatcher};
pub use unique_amount::{
    probe_unique_amount,
    step_for,
    OrderRequest,
    UniqueAmountAllocator,
    MAX_LINEAR_PROBES,
    MAX_PLACEMENT_ATTEMPTS,
    TIMESTAMP_PROBES,
};
