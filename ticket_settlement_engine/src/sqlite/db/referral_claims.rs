use chrono::Utc;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{ReferralClaim, ReferralClaimStatus},
    traits::ReferralManagementError,
};

pub async fn insert_claim(
    referrer_discord_user_id: &str,
    referrer_email: &str,
    referred_email: &str,
    status: ReferralClaimStatus,
    conn: &mut SqliteConnection,
) -> Result<ReferralClaim, ReferralManagementError> {
    let now = Utc::now();
    let claim: ReferralClaim = sqlx::query_as(
        r#"
            INSERT INTO referral_claims (referrer_discord_user_id, referrer_email, referred_email, status,
                                         created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(referrer_discord_user_id)
    .bind(referrer_email)
    .bind(referred_email)
    .bind(status)
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Referral claim #{} recorded with status {}", claim.id, claim.status);
    Ok(claim)
}

/// The oldest pending claim for the given referred email, if any.
pub async fn fetch_pending_for_email(
    referred_email: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<ReferralClaim>, sqlx::Error> {
    let claim = sqlx::query_as(
        "SELECT * FROM referral_claims WHERE referred_email = $1 AND status = $2 ORDER BY created_at ASC LIMIT 1",
    )
    .bind(referred_email)
    .bind(ReferralClaimStatus::Pending)
    .fetch_optional(conn)
    .await?;
    Ok(claim)
}

pub async fn fetch_claim(claim_id: i64, conn: &mut SqliteConnection) -> Result<Option<ReferralClaim>, sqlx::Error> {
    let claim = sqlx::query_as("SELECT * FROM referral_claims WHERE id = $1").bind(claim_id).fetch_optional(conn).await?;
    Ok(claim)
}

/// Moves a claim from `Pending` to `Rewarded`. The status guard in the `WHERE` clause means a
/// claim can only make this transition once.
pub async fn mark_rewarded(claim_id: i64, conn: &mut SqliteConnection) -> Result<ReferralClaim, ReferralManagementError> {
    let claim: Option<ReferralClaim> = sqlx::query_as(
        "UPDATE referral_claims SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4 RETURNING *",
    )
    .bind(ReferralClaimStatus::Rewarded)
    .bind(Utc::now())
    .bind(claim_id)
    .bind(ReferralClaimStatus::Pending)
    .fetch_optional(&mut *conn)
    .await?;
    match claim {
        Some(claim) => Ok(claim),
        None => match fetch_claim(claim_id, conn).await? {
            Some(existing) => Err(ReferralManagementError::ClaimNotPending { id: claim_id, status: existing.status }),
            None => Err(ReferralManagementError::ClaimNotFound(claim_id)),
        },
    }
}
