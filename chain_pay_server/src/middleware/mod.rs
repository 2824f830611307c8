mod hmac;

pub use hmac::{HmacMiddlewareFactory, HmacMiddlewareService, PUSH_SIGNATURE_HEADER};
