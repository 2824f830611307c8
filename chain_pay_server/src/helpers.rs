use hmac::{Hmac, Mac};
use log::trace;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Base64-encoded HMAC-SHA256 of `data`, keyed with `secret`.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    let mac = keyed_mac(secret, data);
    base64::encode(mac.finalize().into_bytes())
}

/// Checks a base64-encoded HMAC-SHA256 signature in constant time.
pub fn verify_hmac(secret: &str, data: &[u8], signature: &str) -> bool {
    let Ok(expected) = base64::decode(signature.trim()) else {
        trace!("🔐️ Signature is not valid base64");
        return false;
    };
    keyed_mac(secret, data).verify_slice(&expected).is_ok()
}

fn keyed_mac(secret: &str, data: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length, so this never uses the fallback
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| <HmacSha256 as Mac>::new(&Default::default()));
    mac.update(data);
    mac
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hmac_matches_known_vector() {
        // RFC 4231 test case 2
        let hmac = calculate_hmac("Jefe", b"what do ya want for nothing?");
        assert_eq!(hmac, "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM=");
    }

    #[test]
    fn signatures_are_verified() {
        let body = br#"{"amount":"12.34","reference":"abc"}"#;
        let signature = calculate_hmac("secret", body);
        assert!(verify_hmac("secret", body, &signature));
        assert!(!verify_hmac("other", body, &signature));
        assert!(!verify_hmac("secret", b"{}", &signature));
        assert!(!verify_hmac("secret", body, "not base64!"));
    }
}
