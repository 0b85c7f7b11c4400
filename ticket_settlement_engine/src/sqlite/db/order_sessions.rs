use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{NewOrderSession, OrderSession, OrderSessionId, OrderSessionStatus, PointsReservationState},
    helpers::SettlementBreakdown,
    traits::SettlementDatabaseError,
};

/// Inserts the session into the database, returning `false` in the second element if a session
/// with the same `order_session_id` already exists.
pub async fn idempotent_insert(
    session: NewOrderSession,
    breakdown: &SettlementBreakdown,
    conn: &mut SqliteConnection,
) -> Result<(OrderSession, bool), SettlementDatabaseError> {
    let inserted = match fetch_session(&session.order_session_id, conn).await? {
        Some(existing) => (existing, false),
        None => {
            let session = insert_session(session, breakdown, conn).await?;
            debug!("📝️ Order session [{}] inserted with id {}", session.order_session_id, session.id);
            (session, true)
        },
    };
    Ok(inserted)
}

/// Inserts a new order session using the given connection. This is not atomic on its own. You can
/// embed this call inside a transaction and pass `&mut *tx` as the connection argument.
async fn insert_session(
    session: NewOrderSession,
    breakdown: &SettlementBreakdown,
    conn: &mut SqliteConnection,
) -> Result<OrderSession, SettlementDatabaseError> {
    let reservation_state =
        if breakdown.points_reserved > 0 { PointsReservationState::Reserved } else { PointsReservationState::None };
    let now = Utc::now();
    let session = sqlx::query_as(
        r#"
            INSERT INTO order_sessions (
                order_session_id,
                tenant_id,
                guild_id,
                ticket_channel_id,
                staff_id,
                customer_id,
                customer_email,
                product_id,
                variant_id,
                basket_lines,
                coupon_code,
                coupon_discount,
                points_reserved,
                points_discount,
                points_reservation_state,
                points_earned,
                tip,
                subtotal,
                total,
                status,
                answers,
                checkout_url,
                checkout_token_expires_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
                      $21, $22, $23, $24, $25)
            RETURNING *;
        "#,
    )
    .bind(session.order_session_id)
    .bind(session.tenant_id)
    .bind(session.guild_id)
    .bind(session.ticket_channel_id)
    .bind(session.staff_id)
    .bind(session.customer_id)
    .bind(session.customer_email)
    .bind(session.product_id)
    .bind(session.variant_id)
    .bind(Json(session.basket_lines))
    .bind(session.coupon_code)
    .bind(session.coupon_discount)
    .bind(breakdown.points_reserved)
    .bind(breakdown.points_discount)
    .bind(reservation_state)
    .bind(breakdown.points_earned)
    .bind(session.tip)
    .bind(breakdown.subtotal)
    .bind(breakdown.total)
    .bind(OrderSessionStatus::PendingPayment)
    .bind(Json(session.answers))
    .bind(session.checkout_url)
    .bind(session.checkout_token_expires_at)
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(session)
}

pub async fn fetch_session(
    id: &OrderSessionId,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderSession>, sqlx::Error> {
    let session = sqlx::query_as("SELECT * FROM order_sessions WHERE order_session_id = $1")
        .bind(id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(session)
}

/// Applies a lifecycle transition in place. The caller has already validated the transition
/// against the current status and reservation state.
pub async fn update_lifecycle(
    id: &OrderSessionId,
    status: OrderSessionStatus,
    reservation_state: PointsReservationState,
    conn: &mut SqliteConnection,
) -> Result<OrderSession, SettlementDatabaseError> {
    let session: Option<OrderSession> = sqlx::query_as(
        r#"
            UPDATE order_sessions
            SET status = $1, points_reservation_state = $2, updated_at = $3
            WHERE order_session_id = $4
            RETURNING *;
        "#,
    )
    .bind(status)
    .bind(reservation_state)
    .bind(Utc::now())
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?;
    session.ok_or_else(|| SettlementDatabaseError::SessionNotFound(id.clone()))
}

/// Pending sessions whose checkout token expired before `now`.
pub async fn fetch_expired_pending(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderSession>, sqlx::Error> {
    let sessions = sqlx::query_as(
        r#"
            SELECT * FROM order_sessions
            WHERE status = $1 AND checkout_token_expires_at IS NOT NULL AND checkout_token_expires_at < $2
            ORDER BY checkout_token_expires_at ASC
        "#,
    )
    .bind(OrderSessionStatus::PendingPayment)
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(sessions)
}
