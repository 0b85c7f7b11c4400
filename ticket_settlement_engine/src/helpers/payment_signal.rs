//! Payment signal resolution.
//!
//! The two payment providers notify us with very different payload shapes. The fiat gateway sends
//! a fixed status vocabulary; the crypto gateway often omits a status entirely and the paid signal
//! has to be inferred from a settled amount or a confirmation count. This module normalizes both
//! into a single [`PaymentState`] decision, and derives the stable delivery fingerprint used by
//! the webhook de-duplication ledger.
//!
//! Precedence rule: an explicit failure status always beats the amount/confirmation heuristics. A
//! payload saying `status: "failed"` is never paid, no matter what amounts it carries.
//!
//! The fingerprint deliberately covers every amount-bearing field, so a retried-but-corrected
//! delivery (e.g. the provider fixing the settled amount) is a distinct event rather than being
//! silently deduplicated against the stale one.

use blake2::{Blake2b512, Digest};
use serde::{Deserialize, Serialize};
use tss_common::MinorUnits;

use crate::db_types::OrderSessionId;

const FIAT_PAID_STATUSES: [&str; 3] = ["paid", "succeeded", "completed"];
const CRYPTO_FAILURE_STATUSES: [&str; 4] = ["failed", "expired", "invalid", "cancelled"];

//------------------------------------   Provider payloads   ---------------------------------------------------------
/// Notification from the fiat gateway. `status` is one of a known vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiatPaymentEvent {
    pub status: String,
    pub amount: Option<MinorUnits>,
    pub currency: Option<String>,
    pub provider_ref: Option<String>,
}

/// Notification from the crypto gateway. A missing status means "infer from the numbers".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoPaymentEvent {
    pub status: Option<String>,
    pub amount_settled: Option<MinorUnits>,
    pub confirmations: Option<i64>,
    pub txid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum PaymentNotification {
    Fiat(FiatPaymentEvent),
    Crypto(CryptoPaymentEvent),
}

//--------------------------------------    PaymentState     ---------------------------------------------------------
/// The normalized paid/not-paid decision, with the status string retained for classification
/// responses and audit logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentState {
    pub paid: bool,
    pub status: String,
}

/// Normalize a provider notification into a single paid/not-paid decision.
pub fn resolve_payment_state(notification: &PaymentNotification) -> PaymentState {
    match notification {
        PaymentNotification::Fiat(ev) => {
            let status = ev.status.trim().to_ascii_lowercase();
            let paid = FIAT_PAID_STATUSES.contains(&status.as_str());
            PaymentState { paid, status }
        },
        PaymentNotification::Crypto(ev) => {
            let status = ev.status.as_deref().map(|s| s.trim().to_ascii_lowercase());
            if let Some(s) = &status {
                if CRYPTO_FAILURE_STATUSES.contains(&s.as_str()) {
                    return PaymentState { paid: false, status: s.clone() };
                }
            }
            let settled = ev.amount_settled.map(|a| a.value() > 0).unwrap_or(false);
            let confirmed = ev.confirmations.map(|c| c > 0).unwrap_or(false);
            let paid = settled || confirmed;
            let status = status.unwrap_or_else(|| if paid { "settled".to_string() } else { "pending".to_string() });
            PaymentState { paid, status }
        },
    }
}

/// A stable identifier for one provider delivery, scoped to the order session.
///
/// Built from a deterministic colon-joined serialization of the payload's identifying and
/// amount-bearing fields, hashed with Blake2b.
pub fn delivery_fingerprint(order_session_id: &OrderSessionId, notification: &PaymentNotification) -> String {
    let preimage = match notification {
        PaymentNotification::Fiat(ev) => format!(
            "fiat:{}:{}:{}:{}:{}",
            order_session_id.as_str(),
            ev.status.trim().to_ascii_lowercase(),
            ev.amount.map(|a| a.value()).unwrap_or(0),
            ev.currency.as_deref().unwrap_or(""),
            ev.provider_ref.as_deref().unwrap_or(""),
        ),
        PaymentNotification::Crypto(ev) => format!(
            "crypto:{}:{}:{}:{}:{}",
            order_session_id.as_str(),
            ev.status.as_deref().map(|s| s.trim().to_ascii_lowercase()).unwrap_or_default(),
            ev.amount_settled.map(|a| a.value()).unwrap_or(0),
            ev.confirmations.unwrap_or(0),
            ev.txid.as_deref().unwrap_or(""),
        ),
    };
    let hash = Blake2b512::digest(preimage.as_bytes());
    hash.iter().map(|b| format!("{b:02x}")).collect()
}
