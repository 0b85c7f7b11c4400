//! `SqliteDatabase` is a concrete implementation of a ticket settlement engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the
//! [`crate::traits`] module. The webhook-event unique index does the heavy lifting for
//! idempotency; everything else is straightforward row plumbing.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqlitePool;

use super::db::{db_url, new_pool, order_sessions, referral_claims, webhook_events};
use crate::{
    db_types::{
        NewOrderSession,
        OrderSession,
        OrderSessionId,
        OrderSessionStatus,
        PointsReservationState,
        ReferralClaim,
        ReferralClaimStatus,
        WebhookEventStatus,
    },
    helpers::SettlementBreakdown,
    traits::{
        ReferralManagement,
        ReferralManagementError,
        SettlementDatabase,
        SettlementDatabaseError,
        WebhookEventClaim,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database connection pool using the `TSS_DATABASE_URL` environment variable.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order_session(
        &self,
        session: NewOrderSession,
        breakdown: &SettlementBreakdown,
    ) -> Result<(OrderSession, bool), SettlementDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let result = order_sessions::idempotent_insert(session, breakdown, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_order_session(
        &self,
        id: &OrderSessionId,
    ) -> Result<Option<OrderSession>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let session = order_sessions::fetch_session(id, &mut conn).await?;
        Ok(session)
    }

    async fn claim_webhook_event(
        &self,
        id: &OrderSessionId,
        fingerprint: &str,
    ) -> Result<WebhookEventClaim, SettlementDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let claim = match webhook_events::try_claim(id, fingerprint, &mut tx).await? {
            Some(event) => WebhookEventClaim::Claimed(event),
            // An earlier attempt claimed the fingerprint but never completed the transition;
            // the provider's retry takes the claim over.
            None => match webhook_events::reclaim_failed(fingerprint, &mut tx).await? {
                Some(event) => WebhookEventClaim::Claimed(event),
                None => {
                    // Lost the race (or a true replay): surface the existing ledger row.
                    let existing = webhook_events::fetch_by_fingerprint(fingerprint, &mut tx)
                        .await?
                        .ok_or_else(|| {
                            SettlementDatabaseError::DatabaseError(format!(
                                "webhook ledger row for fingerprint {fingerprint} vanished mid-claim"
                            ))
                        })?;
                    WebhookEventClaim::Duplicate(existing)
                },
            },
        };
        tx.commit().await?;
        Ok(claim)
    }

    async fn mark_webhook_event(
        &self,
        event_id: i64,
        status: WebhookEventStatus,
    ) -> Result<(), SettlementDatabaseError> {
        let mut tx = self.pool.begin().await?;
        webhook_events::set_status(event_id, status, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn mark_session_paid(
        &self,
        id: &OrderSessionId,
        event_id: i64,
    ) -> Result<OrderSession, SettlementDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let session = order_sessions::fetch_session(id, &mut tx)
            .await?
            .ok_or_else(|| SettlementDatabaseError::SessionNotFound(id.clone()))?;
        if session.status.is_terminal() {
            return Err(SettlementDatabaseError::SessionAlreadyTerminal { id: id.clone(), status: session.status });
        }
        let reservation = match session.points_reservation_state {
            PointsReservationState::Reserved => PointsReservationState::Captured,
            PointsReservationState::None => PointsReservationState::None,
            other => {
                return Err(SettlementDatabaseError::IllegalReservationTransition {
                    from: other.to_string(),
                    to: PointsReservationState::Captured.to_string(),
                })
            },
        };
        let updated = order_sessions::update_lifecycle(id, OrderSessionStatus::Paid, reservation, &mut tx).await?;
        webhook_events::set_status(event_id, WebhookEventStatus::Processed, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order session [{id}] has been marked as paid");
        Ok(updated)
    }

    async fn cancel_session(&self, id: &OrderSessionId, reason: &str) -> Result<OrderSession, SettlementDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let session = order_sessions::fetch_session(id, &mut tx)
            .await?
            .ok_or_else(|| SettlementDatabaseError::SessionNotFound(id.clone()))?;
        if session.status.is_terminal() {
            return Err(SettlementDatabaseError::SessionAlreadyTerminal { id: id.clone(), status: session.status });
        }
        let reservation = match session.points_reservation_state {
            PointsReservationState::Reserved => PointsReservationState::Released,
            other => other,
        };
        let updated =
            order_sessions::update_lifecycle(id, OrderSessionStatus::Cancelled, reservation, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order session [{id}] has been cancelled. Reason: {reason}");
        Ok(updated)
    }

    async fn fetch_expired_pending_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderSession>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let sessions = order_sessions::fetch_expired_pending(now, &mut conn).await?;
        Ok(sessions)
    }

    async fn close(&mut self) -> Result<(), SettlementDatabaseError> {
        self.pool.close().await;
        Ok(())
    }
}

impl ReferralManagement for SqliteDatabase {
    async fn insert_referral_claim(
        &self,
        referrer_discord_user_id: &str,
        referrer_email: &str,
        referred_email: &str,
        status: ReferralClaimStatus,
    ) -> Result<ReferralClaim, ReferralManagementError> {
        let mut tx = self.pool.begin().await.map_err(|e| ReferralManagementError::DatabaseError(e.to_string()))?;
        let claim =
            referral_claims::insert_claim(referrer_discord_user_id, referrer_email, referred_email, status, &mut tx)
                .await?;
        tx.commit().await.map_err(|e| ReferralManagementError::DatabaseError(e.to_string()))?;
        Ok(claim)
    }

    async fn fetch_pending_claim_for_email(
        &self,
        referred_email: &str,
    ) -> Result<Option<ReferralClaim>, ReferralManagementError> {
        let mut conn = self.pool.acquire().await.map_err(|e| ReferralManagementError::DatabaseError(e.to_string()))?;
        let claim = referral_claims::fetch_pending_for_email(referred_email, &mut conn).await?;
        Ok(claim)
    }

    async fn mark_claim_rewarded(&self, claim_id: i64) -> Result<ReferralClaim, ReferralManagementError> {
        let mut tx = self.pool.begin().await.map_err(|e| ReferralManagementError::DatabaseError(e.to_string()))?;
        let claim = referral_claims::mark_rewarded(claim_id, &mut tx).await?;
        tx.commit().await.map_err(|e| ReferralManagementError::DatabaseError(e.to_string()))?;
        Ok(claim)
    }
}
