use std::{collections::HashSet, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;
use tss_common::MinorUnits;

#[derive(Debug, Clone, Error)]
#[error("Invalid status value: {0}")]
pub struct ConversionError(String);

//--------------------------------------     BasketLine       --------------------------------------------------------
/// One priced item in an order. The `category` tags the line for coupon and points eligibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketLine {
    pub category: String,
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub price: MinorUnits,
}

impl BasketLine {
    pub fn new<S: Into<String>>(category: S, price: MinorUnits) -> Self {
        Self { category: category.into(), product_id: None, variant_id: None, price }
    }

    pub fn with_product<S: Into<String>>(mut self, product_id: S) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    pub fn with_variant<S: Into<String>>(mut self, variant_id: S) -> Self {
        self.variant_id = Some(variant_id.into());
        self
    }
}

//--------------------------------------     CouponScope      --------------------------------------------------------
/// Which basket lines a coupon may discount. An empty set on a dimension means that dimension is
/// unrestricted. If both sets are non-empty, a line must match both (AND, not OR).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponScope {
    pub allowed_product_ids: HashSet<String>,
    pub allowed_variant_ids: HashSet<String>,
}

impl CouponScope {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn for_products<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { allowed_product_ids: ids.into_iter().map(Into::into).collect(), ..Default::default() }
    }
}

//--------------------------------------  PointsConfigSnapshot  ------------------------------------------------------
/// Loyalty-points configuration, snapshotted onto the order at creation time so that later config
/// changes never alter the math of an in-flight order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsConfigSnapshot {
    /// The redemption value of a single point, in minor units. Must be strictly positive.
    pub point_value: MinorUnits,
    pub earn_category_keys: HashSet<String>,
    pub redeem_category_keys: HashSet<String>,
}

impl PointsConfigSnapshot {
    pub fn new(point_value: MinorUnits) -> Self {
        Self { point_value, earn_category_keys: HashSet::new(), redeem_category_keys: HashSet::new() }
    }

    pub fn earns<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.earn_category_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn redeems<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.redeem_category_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

//--------------------------------------    OrderSessionId    --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderSessionId(pub String);

impl FromStr for OrderSessionId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderSessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderSessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------  OrderSessionStatus  --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderSessionStatus {
    /// The session has been created at checkout and is waiting for payment confirmation.
    PendingPayment,
    /// Payment has been confirmed in full. Terminal.
    Paid,
    /// The session was cancelled by the user, an admin, or the expiry sweep. Terminal.
    Cancelled,
}

impl OrderSessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderSessionStatus::Paid | OrderSessionStatus::Cancelled)
    }
}

impl Display for OrderSessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSessionStatus::PendingPayment => write!(f, "PendingPayment"),
            OrderSessionStatus::Paid => write!(f, "Paid"),
            OrderSessionStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for OrderSessionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PendingPayment" => Ok(Self::PendingPayment),
            "Paid" => Ok(Self::Paid),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order session status: {s}"))),
        }
    }
}

//------------------------------------ PointsReservationState --------------------------------------------------------
/// Lifecycle of a points redemption, from intent (Reserved) through settlement (Captured) or
/// rollback (Released).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PointsReservationState {
    None,
    Reserved,
    Captured,
    Released,
}

impl PointsReservationState {
    /// The full transition table. `None` never moves; a reservation is captured on payment and
    /// released on cancellation or expiry. Captured and Released are terminal.
    pub fn can_transition_to(&self, next: PointsReservationState) -> bool {
        use PointsReservationState::*;
        matches!((self, next), (Reserved, Captured) | (Reserved, Released))
    }
}

impl Display for PointsReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointsReservationState::None => write!(f, "None"),
            PointsReservationState::Reserved => write!(f, "Reserved"),
            PointsReservationState::Captured => write!(f, "Captured"),
            PointsReservationState::Released => write!(f, "Released"),
        }
    }
}

impl FromStr for PointsReservationState {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(Self::None),
            "Reserved" => Ok(Self::Reserved),
            "Captured" => Ok(Self::Captured),
            "Released" => Ok(Self::Released),
            s => Err(ConversionError(format!("Invalid points reservation state: {s}"))),
        }
    }
}

//--------------------------------------     OrderSession     --------------------------------------------------------
/// The aggregate root for one ticket-to-sale settlement flow.
///
/// Invariants, enforced at checkout time and preserved by every transition:
/// * `subtotal == Σ basket_lines.price`
/// * `total == subtotal − coupon_discount − points_discount + tip`, and never negative.
#[derive(Debug, Clone, FromRow)]
pub struct OrderSession {
    pub id: i64,
    pub order_session_id: OrderSessionId,
    pub tenant_id: String,
    pub guild_id: String,
    pub ticket_channel_id: String,
    pub staff_id: String,
    pub customer_id: String,
    pub customer_email: Option<String>,
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub basket_lines: Json<Vec<BasketLine>>,
    pub coupon_code: Option<String>,
    pub coupon_discount: MinorUnits,
    pub points_reserved: i64,
    pub points_discount: MinorUnits,
    pub points_reservation_state: PointsReservationState,
    pub points_earned: i64,
    pub tip: MinorUnits,
    pub subtotal: MinorUnits,
    pub total: MinorUnits,
    pub status: OrderSessionStatus,
    pub answers: Json<serde_json::Value>,
    pub checkout_url: Option<String>,
    pub checkout_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderSession {
    pub fn lines(&self) -> &[BasketLine] {
        &self.basket_lines.0
    }
}

//--------------------------------------   NewOrderSession    --------------------------------------------------------
/// The input record for creating an order session at checkout time. Totals and points fields are
/// filled in by the settlement flow, not by the caller.
#[derive(Debug, Clone)]
pub struct NewOrderSession {
    pub order_session_id: OrderSessionId,
    pub tenant_id: String,
    pub guild_id: String,
    pub ticket_channel_id: String,
    pub staff_id: String,
    pub customer_id: String,
    pub customer_email: Option<String>,
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub basket_lines: Vec<BasketLine>,
    pub coupon_code: Option<String>,
    pub coupon_discount: MinorUnits,
    pub tip: MinorUnits,
    pub answers: serde_json::Value,
    pub checkout_url: Option<String>,
    pub checkout_token_expires_at: Option<DateTime<Utc>>,
}

impl NewOrderSession {
    pub fn new(order_session_id: OrderSessionId, tenant_id: String, guild_id: String, customer_id: String) -> Self {
        Self {
            order_session_id,
            tenant_id,
            guild_id,
            ticket_channel_id: String::default(),
            staff_id: String::default(),
            customer_id,
            customer_email: None,
            product_id: None,
            variant_id: None,
            basket_lines: Vec::new(),
            coupon_code: None,
            coupon_discount: MinorUnits::default(),
            tip: MinorUnits::default(),
            answers: serde_json::Value::Null,
            checkout_url: None,
            checkout_token_expires_at: None,
        }
    }

    pub fn with_lines(mut self, lines: Vec<BasketLine>) -> Self {
        self.basket_lines = lines;
        self
    }

    pub fn with_coupon<S: Into<String>>(mut self, code: S, discount: MinorUnits) -> Self {
        self.coupon_code = Some(code.into());
        self.coupon_discount = discount;
        self
    }

    pub fn with_tip(mut self, tip: MinorUnits) -> Self {
        self.tip = tip;
        self
    }

    pub fn with_customer_email<S: Into<String>>(mut self, email: S) -> Self {
        self.customer_email = Some(email.into());
        self
    }
}

//--------------------------------------  WebhookEventStatus  --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type)]
pub enum WebhookEventStatus {
    /// The delivery has been claimed and is being processed.
    Received,
    /// Processing completed and side effects were applied. A fingerprint reaches this state at
    /// most once.
    Processed,
    /// Processing was attempted but failed. The provider is expected to retry.
    Failed,
    /// The fingerprint had already been claimed; this delivery produced no side effects.
    Duplicate,
}

impl Display for WebhookEventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookEventStatus::Received => write!(f, "Received"),
            WebhookEventStatus::Processed => write!(f, "Processed"),
            WebhookEventStatus::Failed => write!(f, "Failed"),
            WebhookEventStatus::Duplicate => write!(f, "Duplicate"),
        }
    }
}

impl FromStr for WebhookEventStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Received" => Ok(Self::Received),
            "Processed" => Ok(Self::Processed),
            "Failed" => Ok(Self::Failed),
            "Duplicate" => Ok(Self::Duplicate),
            s => Err(ConversionError(format!("Invalid webhook event status: {s}"))),
        }
    }
}

//--------------------------------------     WebhookEvent     --------------------------------------------------------
/// One row in the webhook de-duplication ledger. The unique `delivery_fingerprint` column is the
/// serialization point that prevents double-crediting on provider retries.
#[derive(Debug, Clone, FromRow)]
pub struct WebhookEvent {
    pub id: i64,
    pub order_session_id: OrderSessionId,
    pub delivery_fingerprint: String,
    pub status: WebhookEventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//------------------------------------  ReferralClaimStatus  ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type)]
pub enum ReferralClaimStatus {
    /// Recorded, waiting for a matching paid order.
    Pending,
    /// The referrer referred themselves. Recorded for audit, never rewarded.
    SelfBlocked,
    /// The reward has been issued. Terminal.
    Rewarded,
}

impl Display for ReferralClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferralClaimStatus::Pending => write!(f, "Pending"),
            ReferralClaimStatus::SelfBlocked => write!(f, "SelfBlocked"),
            ReferralClaimStatus::Rewarded => write!(f, "Rewarded"),
        }
    }
}

impl FromStr for ReferralClaimStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "SelfBlocked" => Ok(Self::SelfBlocked),
            "Rewarded" => Ok(Self::Rewarded),
            s => Err(ConversionError(format!("Invalid referral claim status: {s}"))),
        }
    }
}

//--------------------------------------    ReferralClaim     --------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct ReferralClaim {
    pub id: i64,
    pub referrer_discord_user_id: String,
    /// Normalized (trimmed, lowercased) at creation time.
    pub referrer_email: String,
    /// Normalized (trimmed, lowercased) at creation time.
    pub referred_email: String,
    pub status: ReferralClaimStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        Role          --------------------------------------------------------
/// Tenant role hierarchy. The derived ordering is the access check: `role >= required` grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Type, Serialize, Deserialize)]
pub enum Role {
    Member,
    Admin,
    Owner,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Member => write!(f, "Member"),
            Role::Admin => write!(f, "Admin"),
            Role::Owner => write!(f, "Owner"),
        }
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "member" => Ok(Self::Member),
            "admin" => Ok(Self::Admin),
            "owner" => Ok(Self::Owner),
            s => Err(ConversionError(format!("Invalid role: {s}"))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn role_hierarchy_is_ordinal() {
        assert!(Role::Owner > Role::Admin);
        assert!(Role::Admin > Role::Member);
        assert!(Role::Owner >= Role::Owner);
    }

    #[test]
    fn reservation_transition_table() {
        use PointsReservationState::*;
        assert!(Reserved.can_transition_to(Captured));
        assert!(Reserved.can_transition_to(Released));
        assert!(!None.can_transition_to(Captured));
        assert!(!Captured.can_transition_to(Released));
        assert!(!Released.can_transition_to(Reserved));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!OrderSessionStatus::PendingPayment.is_terminal());
        assert!(OrderSessionStatus::Paid.is_terminal());
        assert!(OrderSessionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for s in [OrderSessionStatus::PendingPayment, OrderSessionStatus::Paid, OrderSessionStatus::Cancelled] {
            assert_eq!(s.to_string().parse::<OrderSessionStatus>().unwrap(), s);
        }
        assert!("Refunded".parse::<OrderSessionStatus>().is_err());
    }
}
