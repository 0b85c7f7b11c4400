use chrono::Utc;
use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{OrderSessionId, WebhookEvent, WebhookEventStatus},
    traits::SettlementDatabaseError,
};

/// Atomically claims the fingerprint. `INSERT .. ON CONFLICT DO NOTHING` makes the unique index
/// on `delivery_fingerprint` the serialization point: exactly one writer gets a row back.
pub async fn try_claim(
    id: &OrderSessionId,
    fingerprint: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<WebhookEvent>, sqlx::Error> {
    let now = Utc::now();
    let event: Option<WebhookEvent> = sqlx::query_as(
        r#"
            INSERT INTO webhook_events (order_session_id, delivery_fingerprint, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (delivery_fingerprint) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(id.as_str())
    .bind(fingerprint)
    .bind(WebhookEventStatus::Received)
    .bind(now)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    if event.is_some() {
        trace!("📒️ Claimed webhook delivery {fingerprint} for session {id}");
    }
    Ok(event)
}

/// Re-claims a fingerprint whose previous processing attempt failed after the claim.
///
/// The status guard in the `WHERE` clause makes this atomic: only a `Failed` row can move back to
/// `Received`, so a provider retry picks the claim up exactly where the crashed attempt left it,
/// while `Received` and `Processed` rows stay untouchable.
pub async fn reclaim_failed(
    fingerprint: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<WebhookEvent>, sqlx::Error> {
    let event: Option<WebhookEvent> = sqlx::query_as(
        r#"
            UPDATE webhook_events SET status = $1, updated_at = $2
            WHERE delivery_fingerprint = $3 AND status = $4
            RETURNING *;
        "#,
    )
    .bind(WebhookEventStatus::Received)
    .bind(Utc::now())
    .bind(fingerprint)
    .bind(WebhookEventStatus::Failed)
    .fetch_optional(conn)
    .await?;
    if event.is_some() {
        trace!("📒️ Re-claimed failed webhook delivery {fingerprint}");
    }
    Ok(event)
}

pub async fn fetch_by_fingerprint(
    fingerprint: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<WebhookEvent>, sqlx::Error> {
    let event = sqlx::query_as("SELECT * FROM webhook_events WHERE delivery_fingerprint = $1")
        .bind(fingerprint)
        .fetch_optional(conn)
        .await?;
    Ok(event)
}

pub async fn set_status(
    event_id: i64,
    status: WebhookEventStatus,
    conn: &mut SqliteConnection,
) -> Result<WebhookEvent, SettlementDatabaseError> {
    let event: Option<WebhookEvent> =
        sqlx::query_as("UPDATE webhook_events SET status = $1, updated_at = $2 WHERE id = $3 RETURNING *")
            .bind(status)
            .bind(Utc::now())
            .bind(event_id)
            .fetch_optional(conn)
            .await?;
    event.ok_or(SettlementDatabaseError::EventNotFound(event_id))
}
