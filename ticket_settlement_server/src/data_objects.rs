//! Request and response bodies for the HTTP boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ticket_settlement_engine::db_types::{BasketLine, OrderSession};
use tss_common::MinorUnits;

#[derive(Debug, Clone, Serialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Into<String>>(message: S) -> Self {
        Self { success: true, message: message.into() }
    }
}

/// Body of every webhook response. Always delivered with a 2xx status so providers treat the
/// delivery as acknowledged; `classification` tells the operator what actually happened.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub classification: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl WebhookAck {
    pub fn new(classification: &'static str) -> Self {
        Self { classification, detail: None }
    }

    pub fn with_detail<S: Into<String>>(classification: &'static str, detail: S) -> Self {
        Self { classification, detail: Some(detail.into()) }
    }
}

/// The checkout request from the ticket bot. Monetary fields are integer minor units.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutPayload {
    pub order_session_id: String,
    pub tenant_id: String,
    pub guild_id: String,
    pub customer_id: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    pub basket_lines: Vec<BasketLine>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    /// Face value of the coupon; the server caps it at the coupon's eligible subtotal.
    #[serde(default)]
    pub coupon_value: MinorUnits,
    /// Product ids the coupon is restricted to. Empty means unrestricted.
    #[serde(default)]
    pub coupon_products: Vec<String>,
    #[serde(default)]
    pub tip: MinorUnits,
    /// Points configuration snapshot taken by the bot at command time.
    pub point_value: MinorUnits,
    #[serde(default)]
    pub earn_categories: Vec<String>,
    #[serde(default)]
    pub redeem_categories: Vec<String>,
    #[serde(default)]
    pub available_points: i64,
    #[serde(default)]
    pub use_points: bool,
    #[serde(default)]
    pub answers: serde_json::Value,
}

/// What the bot posts into the ticket channel: the link, the tokens, and the headline numbers.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutConfirmation {
    pub order_session_id: String,
    pub checkout_token: String,
    pub callback_token: String,
    pub checkout_url: String,
    pub subtotal: MinorUnits,
    pub total: MinorUnits,
    pub points_reserved: i64,
    pub points_earned: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

/// The session view returned when a customer follows a checkout link.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub order_session_id: String,
    pub status: String,
    pub basket_lines: Vec<BasketLine>,
    pub coupon_discount: MinorUnits,
    pub points_discount: MinorUnits,
    pub tip: MinorUnits,
    pub subtotal: MinorUnits,
    pub total: MinorUnits,
}

impl From<&OrderSession> for SessionView {
    fn from(session: &OrderSession) -> Self {
        Self {
            order_session_id: session.order_session_id.to_string(),
            status: session.status.to_string(),
            basket_lines: session.lines().to_vec(),
            coupon_discount: session.coupon_discount,
            points_discount: session.points_discount,
            tip: session.tip,
            subtotal: session.subtotal,
            total: session.total,
        }
    }
}
