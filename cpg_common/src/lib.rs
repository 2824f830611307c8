//! Small types and helpers shared by the ChainPay engine and server crates.
mod helpers;
mod secret;

pub use helpers::{parse_boolean_flag, parse_list, parse_seconds, ParseSecondsError};
pub use secret::Secret;
