//! Checkout and callback tokens.
//!
//! A checkout token is what the Discord bot hands the customer: a base64url JSON claims blob and
//! a base64url HMAC-SHA256 signature, joined with a `.`. It expires. A callback token is a bare
//! HMAC over `tenant_id:guild_id:order_session_id` that other services present when acting on a
//! session; it carries no expiry because it only ever travels between services.
//!
//! The three failure modes of checkout-token verification are deliberately distinct errors, so
//! that the bot can show "that link is broken", "that link was tampered with" and "that link has
//! expired" as different messages.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Error)]
pub enum TokenError {
    #[error("The token is not in the correct format. {0}")]
    Malformed(String),
    #[error("The token signature is invalid.")]
    BadSignature,
    #[error("The token has expired.")]
    Expired,
}

/// The claims carried by a checkout token. Only the session id and expiry are mandatory; the
/// tenant/guild/customer fields let the checkout page render without a database round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutClaims {
    pub order_session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    /// Unix seconds.
    pub exp: i64,
}

impl CheckoutClaims {
    pub fn new<S: Into<String>>(order_session_id: S, expires_at: DateTime<Utc>) -> Self {
        Self {
            order_session_id: order_session_id.into(),
            tenant_id: None,
            guild_id: None,
            customer_id: None,
            exp: expires_at.timestamp(),
        }
    }

    pub fn for_tenant<S: Into<String>>(mut self, tenant_id: S, guild_id: S) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self.guild_id = Some(guild_id.into());
        self
    }
}

fn new_mac(key: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take a key of any size")
}

pub fn sign_checkout_token(claims: &CheckoutClaims, key: &str) -> Result<String, TokenError> {
    let payload = serde_json::to_vec(claims).map_err(|e| TokenError::Malformed(e.to_string()))?;
    let body = base64::encode_config(payload, base64::URL_SAFE_NO_PAD);
    let mut mac = new_mac(key);
    mac.update(body.as_bytes());
    let signature = base64::encode_config(mac.finalize().into_bytes(), base64::URL_SAFE_NO_PAD);
    Ok(format!("{body}.{signature}"))
}

pub fn verify_checkout_token(token: &str, key: &str, now: DateTime<Utc>) -> Result<CheckoutClaims, TokenError> {
    let (body, signature) = token.split_once('.').ok_or_else(|| {
        TokenError::Malformed("Expected <payload>.<signature>".to_string())
    })?;
    let signature = base64::decode_config(signature, base64::URL_SAFE_NO_PAD)
        .map_err(|e| TokenError::Malformed(format!("Signature is not valid base64. {e}")))?;
    let mut mac = new_mac(key);
    mac.update(body.as_bytes());
    // constant-time comparison
    mac.verify_slice(&signature).map_err(|_| TokenError::BadSignature)?;
    let payload = base64::decode_config(body, base64::URL_SAFE_NO_PAD)
        .map_err(|e| TokenError::Malformed(format!("Payload is not valid base64. {e}")))?;
    let claims: CheckoutClaims =
        serde_json::from_slice(&payload).map_err(|e| TokenError::Malformed(e.to_string()))?;
    if claims.exp < now.timestamp() {
        return Err(TokenError::Expired);
    }
    Ok(claims)
}

/// HMAC-SHA256 over `tenant_id:guild_id:order_session_id`, base64url. No expiry.
pub fn callback_token(key: &str, tenant_id: &str, guild_id: &str, order_session_id: &str) -> String {
    let mut mac = new_mac(key);
    mac.update(format!("{tenant_id}:{guild_id}:{order_session_id}").as_bytes());
    base64::encode_config(mac.finalize().into_bytes(), base64::URL_SAFE_NO_PAD)
}

pub fn verify_callback_token(
    key: &str,
    tenant_id: &str,
    guild_id: &str,
    order_session_id: &str,
    token: &str,
) -> bool {
    let Ok(signature) = base64::decode_config(token, base64::URL_SAFE_NO_PAD) else {
        return false;
    };
    let mut mac = new_mac(key);
    mac.update(format!("{tenant_id}:{guild_id}:{order_session_id}").as_bytes());
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
mod test {
    use chrono::Duration;

    use super::*;

    const KEY: &str = "correct horse battery staple";

    fn claims() -> CheckoutClaims {
        CheckoutClaims::new("os-100", Utc::now() + Duration::minutes(30)).for_tenant("tenant-1", "guild-1")
    }

    #[test]
    fn round_trip_recovers_claims() {
        let claims = claims();
        let token = sign_checkout_token(&claims, KEY).unwrap();
        let verified = verify_checkout_token(&token, KEY, Utc::now()).unwrap();
        assert_eq!(verified, claims);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let token = sign_checkout_token(&claims(), KEY).unwrap();
        // flip one character in the payload half
        let mut chars: Vec<char> = token.chars().collect();
        chars[3] = if chars[3] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();
        assert!(matches!(verify_checkout_token(&tampered, KEY, Utc::now()), Err(TokenError::BadSignature)));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let token = sign_checkout_token(&claims(), KEY).unwrap();
        assert!(matches!(verify_checkout_token(&token, "another key", Utc::now()), Err(TokenError::BadSignature)));
    }

    #[test]
    fn missing_separator_is_malformed() {
        assert!(matches!(verify_checkout_token("nodothere", KEY, Utc::now()), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let stale = CheckoutClaims::new("os-100", Utc::now() - Duration::minutes(1));
        let token = sign_checkout_token(&stale, KEY).unwrap();
        assert!(matches!(verify_checkout_token(&token, KEY, Utc::now()), Err(TokenError::Expired)));
    }

    #[test]
    fn callback_token_verifies_only_the_exact_triple() {
        let token = callback_token(KEY, "t1", "g1", "os-1");
        assert!(verify_callback_token(KEY, "t1", "g1", "os-1", &token));
        assert!(!verify_callback_token(KEY, "t1", "g1", "os-2", &token));
        assert!(!verify_callback_token(KEY, "t2", "g1", "os-1", &token));
        assert!(!verify_callback_token(KEY, "t1", "g1", "os-1", "not-base64-!!!"));
    }
}
