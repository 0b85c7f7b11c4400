use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{NewOrderSession, OrderSession, OrderSessionId, OrderSessionStatus, WebhookEvent, WebhookEventStatus},
    helpers::SettlementBreakdown,
};

/// The result of an atomic attempt to claim a delivery fingerprint in the webhook ledger.
///
/// The first writer wins the claim; every later attempt for the same fingerprint observes the
/// existing row and is classified a duplicate, unless the earlier attempt ended `Failed`, in
/// which case the retry re-claims it.
#[derive(Debug, Clone)]
pub enum WebhookEventClaim {
    Claimed(WebhookEvent),
    Duplicate(WebhookEvent),
}

/// This trait defines the highest level of behaviour for backends supporting the settlement
/// engine:
/// * Storing order sessions together with their settlement breakdown.
/// * The webhook de-duplication ledger, with atomic check-and-set claim semantics.
/// * The order session lifecycle transitions (paid, cancelled, expiry sweep).
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new order session along with its computed settlement breakdown, in a single
    /// atomic transaction. Idempotent by `order_session_id`: returns `false` in the second
    /// element if the session already existed (the stored record is returned unchanged).
    ///
    /// The points reservation state is set to `Reserved` when the breakdown reserves points, and
    /// `None` otherwise.
    async fn insert_order_session(
        &self,
        session: NewOrderSession,
        breakdown: &SettlementBreakdown,
    ) -> Result<(OrderSession, bool), SettlementDatabaseError>;

    async fn fetch_order_session(
        &self,
        id: &OrderSessionId,
    ) -> Result<Option<OrderSession>, SettlementDatabaseError>;

    /// Atomically claims the delivery fingerprint in the webhook ledger.
    ///
    /// First writer wins: if no row exists for the fingerprint, a `Received` row is inserted and
    /// returned as `Claimed`. A `Failed` row is a claim whose processing never completed; it is
    /// atomically reset to `Received` and returned as `Claimed`, so the provider's retry can
    /// finish the transition. Any other existing row is returned as `Duplicate` and nothing is
    /// mutated.
    async fn claim_webhook_event(
        &self,
        id: &OrderSessionId,
        fingerprint: &str,
    ) -> Result<WebhookEventClaim, SettlementDatabaseError>;

    /// Updates the ledger status for a claimed event, e.g. to `Failed` when processing blew up
    /// after the claim.
    async fn mark_webhook_event(
        &self,
        event_id: i64,
        status: WebhookEventStatus,
    ) -> Result<(), SettlementDatabaseError>;

    /// The paid transition, as a single atomic transaction:
    /// * re-checks that the session is still `PendingPayment` (a terminal session is a
    ///   descriptive conflict, never a silent no-op),
    /// * sets the status to `Paid`,
    /// * captures any reserved points,
    /// * marks the claimed ledger event `Processed`.
    ///
    /// Returns the updated session.
    async fn mark_session_paid(
        &self,
        id: &OrderSessionId,
        event_id: i64,
    ) -> Result<OrderSession, SettlementDatabaseError>;

    /// The cancelled transition: sets the status to `Cancelled` and releases any reserved
    /// points. Totals are left untouched for audit. Terminal sessions are a conflict.
    async fn cancel_session(&self, id: &OrderSessionId, reason: &str) -> Result<OrderSession, SettlementDatabaseError>;

    /// Pending sessions whose checkout token expired before `now`. These are cancel-eligible;
    /// the expiry sweep decides what to do with them.
    async fn fetch_expired_pending_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderSession>, SettlementDatabaseError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), SettlementDatabaseError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum SettlementDatabaseError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("The requested order session {0} does not exist")]
    SessionNotFound(OrderSessionId),
    #[error("Order session {id} is already {status}; the requested transition is a conflict")]
    SessionAlreadyTerminal { id: OrderSessionId, status: OrderSessionStatus },
    #[error("Illegal points reservation transition from {from} to {to}")]
    IllegalReservationTransition { from: String, to: String },
    #[error("The requested webhook event (internal id {0}) does not exist")]
    EventNotFound(i64),
    #[error("Invalid settlement input: {0}")]
    ValidationError(String),
}

impl From<sqlx::Error> for SettlementDatabaseError {
    fn from(e: sqlx::Error) -> Self {
        SettlementDatabaseError::DatabaseError(e.to_string())
    }
}
