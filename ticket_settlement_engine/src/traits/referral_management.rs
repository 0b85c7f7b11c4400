use thiserror::Error;

use crate::db_types::{ReferralClaim, ReferralClaimStatus};

/// Backend behaviour for referral claims.
///
/// Emails passed into these methods are expected to be normalized already (trimmed, lowercased);
/// the [`crate::tse_api::ReferralApi`] takes care of that.
#[allow(async_fn_in_trait)]
pub trait ReferralManagement: Clone {
    /// Records a claim with the given status. Self-blocked claims are stored too, for audit.
    async fn insert_referral_claim(
        &self,
        referrer_discord_user_id: &str,
        referrer_email: &str,
        referred_email: &str,
        status: ReferralClaimStatus,
    ) -> Result<ReferralClaim, ReferralManagementError>;

    /// The oldest `Pending` claim whose referred email matches, if any.
    async fn fetch_pending_claim_for_email(
        &self,
        referred_email: &str,
    ) -> Result<Option<ReferralClaim>, ReferralManagementError>;

    /// Marks a claim `Rewarded`. Only valid from `Pending`; anything else is a conflict, so a
    /// claim can never be rewarded twice.
    async fn mark_claim_rewarded(&self, claim_id: i64) -> Result<ReferralClaim, ReferralManagementError>;
}

#[derive(Debug, Clone, Error)]
pub enum ReferralManagementError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("The requested referral claim (id {0}) does not exist")]
    ClaimNotFound(i64),
    #[error("Referral claim {id} is {status}, not Pending; it cannot be rewarded")]
    ClaimNotPending { id: i64, status: ReferralClaimStatus },
}

impl From<sqlx::Error> for ReferralManagementError {
    fn from(e: sqlx::Error) -> Self {
        ReferralManagementError::DatabaseError(e.to_string())
    }
}
