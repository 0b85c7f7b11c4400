use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{NewOrderSession, OrderSession, OrderSessionId, PointsConfigSnapshot},
    events::{EventProducers, OrderCancelledEvent, OrderPaidEvent},
    helpers::{delivery_fingerprint, resolve_payment_state, settle_basket, PaymentNotification},
    traits::{SettlementDatabase, SettlementDatabaseError, WebhookEventClaim},
    tse_api::OrderFlowError,
};

/// Checkout-time inputs that sit alongside the session record itself: the points configuration
/// snapshot and the customer's redemption intent.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub config: PointsConfigSnapshot,
    pub available_points: i64,
    pub use_points: bool,
}

/// The classification of one webhook delivery. All three variants are valid terminal outcomes
/// that the ingress acknowledges to the provider; none of them warrants a retry.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// First paid signal for this session: the paid transition was applied.
    Paid(OrderSession),
    /// The delivery fingerprint had been processed before. No mutation happened.
    Duplicate,
    /// The payload did not resolve to a paid state. Recorded status retained for the response.
    Ignored { status: String },
}

/// `SettlementFlowApi` is the primary API for the order session lifecycle: checkout, payment
/// webhooks, cancellation and expiry.
pub struct SettlementFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for SettlementFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementFlowApi")
    }
}

impl<B> SettlementFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> SettlementFlowApi<B>
where B: SettlementDatabase
{
    /// Settle the basket and store the session, entering the `PendingPayment` state.
    ///
    /// The coupon discount on the session must already be sized against the coupon's eligible
    /// subtotal. Points are reserved here (never captured); the reservation is resolved by the
    /// paid or cancelled transition. Idempotent by `order_session_id`.
    pub async fn checkout_order(
        &self,
        session: NewOrderSession,
        request: &CheckoutRequest,
    ) -> Result<OrderSession, OrderFlowError> {
        let breakdown = settle_basket(
            &session.basket_lines,
            session.coupon_discount,
            session.tip,
            &request.config,
            request.available_points,
            request.use_points,
        )?;
        let (stored, inserted) = self.db.insert_order_session(session, &breakdown).await?;
        if inserted {
            debug!(
                "🧾️ Order session [{}] checked out. Subtotal {}, total {}, {} points reserved.",
                stored.order_session_id, stored.subtotal, stored.total, stored.points_reserved
            );
        } else {
            info!("🧾️ Order session [{}] already exists. Returning the stored record.", stored.order_session_id);
        }
        Ok(stored)
    }

    /// Resolve a provider notification against the order session and apply the paid transition
    /// if warranted.
    ///
    /// The webhook ledger's fingerprint index guarantees at most one `Paid(_)` outcome per
    /// delivery fingerprint; replays come back as `Duplicate` with no side effects. A delivery
    /// whose earlier attempt failed after the claim is re-claimed rather than deduplicated, so
    /// the provider's retry schedule is the recovery path for transient failures. The
    /// `OrderPaidEvent` is emitted exactly once, on the first successful transition.
    pub async fn process_payment_notification(
        &self,
        id: &OrderSessionId,
        notification: &PaymentNotification,
    ) -> Result<WebhookOutcome, OrderFlowError> {
        let state = resolve_payment_state(notification);
        if !state.paid {
            info!("🔔️ Notification for session [{id}] resolved to '{}'. Not a paid signal.", state.status);
            return Ok(WebhookOutcome::Ignored { status: state.status });
        }
        let fingerprint = delivery_fingerprint(id, notification);
        let event = match self.db.claim_webhook_event(id, &fingerprint).await? {
            WebhookEventClaim::Claimed(event) => event,
            WebhookEventClaim::Duplicate(event) => {
                info!(
                    "🔔️ Duplicate delivery for session [{id}] (ledger status {}). No side effects.",
                    event.status
                );
                return Ok(WebhookOutcome::Duplicate);
            },
        };
        match self.db.mark_session_paid(id, event.id).await {
            Ok(order_session) => {
                info!("🔔️💰️ Order session [{id}] is paid ({}).", order_session.total);
                self.call_order_paid_hook(&order_session).await;
                Ok(WebhookOutcome::Paid(order_session))
            },
            Err(e) => {
                // The transition did not happen; mark the claim `Failed` so the provider's next
                // retry can re-claim the fingerprint and finish the job.
                warn!("🔔️ Paid transition failed for session [{id}]: {e}");
                if let Err(mark_err) =
                    self.db.mark_webhook_event(event.id, crate::db_types::WebhookEventStatus::Failed).await
                {
                    error!("🔔️ Could not record failed webhook event {}: {mark_err}", event.id);
                }
                Err(e.into())
            },
        }
    }

    /// Cancel a pending session, releasing any reserved points. Totals are left untouched for
    /// audit. Cancelling a terminal session is a conflict, so callers can tell "already paid"
    /// apart from "just cancelled".
    pub async fn cancel_session(&self, id: &OrderSessionId, reason: &str) -> Result<OrderSession, OrderFlowError> {
        let order_session = self.db.cancel_session(id, reason).await?;
        info!("🧾️❌️ Order session [{id}] cancelled. Reason: {reason}");
        for emitter in &self.producers.order_cancelled_producer {
            emitter.publish_event(OrderCancelledEvent::new(order_session.clone())).await;
        }
        Ok(order_session)
    }

    /// Cancel every pending session whose checkout token expired before `now`. Driven by the
    /// server's sweep worker; sessions that race a payment in the meantime surface as conflicts
    /// and are skipped.
    pub async fn expire_stale_sessions(&self, now: DateTime<Utc>) -> Result<Vec<OrderSession>, OrderFlowError> {
        let stale = self.db.fetch_expired_pending_sessions(now).await?;
        let mut expired = Vec::with_capacity(stale.len());
        for session in stale {
            let id = session.order_session_id.clone();
            match self.cancel_session(&id, "checkout token expired").await {
                Ok(cancelled) => expired.push(cancelled),
                Err(OrderFlowError::DatabaseError(SettlementDatabaseError::SessionAlreadyTerminal { status, .. })) => {
                    debug!("🕰️ Session [{id}] reached {status} before the sweep. Skipping.");
                },
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }

    async fn call_order_paid_hook(&self, order_session: &OrderSession) {
        for emitter in &self.producers.order_paid_producer {
            debug!("🔔️📦️ Notifying order paid hook subscribers");
            emitter.publish_event(OrderPaidEvent::new(order_session.clone())).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}
