use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Calculate the base64 HMAC-SHA256 signature of `data`, as payment providers send it in their
/// signature headers.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take a key of any size");
    mac.update(data);
    base64::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a provider signature header against the raw request body.
pub fn hmac_matches(secret: &str, data: &[u8], signature_b64: &str) -> bool {
    let Ok(signature) = base64::decode(signature_b64) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take a key of any size");
    mac.update(data);
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn signatures_verify() {
        let sig = calculate_hmac("whsec_1", b"{\"status\":\"paid\"}");
        assert!(hmac_matches("whsec_1", b"{\"status\":\"paid\"}", &sig));
    }

    #[test]
    fn wrong_secret_or_body_fails() {
        let sig = calculate_hmac("whsec_1", b"body");
        assert!(!hmac_matches("whsec_2", b"body", &sig));
        assert!(!hmac_matches("whsec_1", b"other body", &sig));
        assert!(!hmac_matches("whsec_1", b"body", "%%% not base64 %%%"));
    }
}
