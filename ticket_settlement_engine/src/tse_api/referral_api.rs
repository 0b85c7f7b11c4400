//! Referral reward issuance.
//!
//! A referral claim is created from a Discord command ("I referred so-and-so") and resolved when a
//! matching paid order completes. The exactly-once property of the reward does not live here: it
//! is inherited from the idempotent paid transition upstream, which fires the order-paid hook at
//! most once per session, plus the Pending-only guard on the claim update.

use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{OrderSession, ReferralClaim, ReferralClaimStatus},
    traits::ReferralManagement,
    tse_api::ReferralApiError,
};

/// Notification template with `{placeholder}` substitution. Supported placeholders:
/// `{referrer_email}`, `{referred_email}`, `{points}`, `{amount_gbp}`, `{order_session_id}`.
#[derive(Debug, Clone)]
pub struct RewardTemplate(pub String);

impl RewardTemplate {
    pub fn render(
        &self,
        referrer_email: &str,
        referred_email: &str,
        points: i64,
        amount_gbp: &str,
        order_session_id: &str,
    ) -> String {
        self.0
            .replace("{referrer_email}", referrer_email)
            .replace("{referred_email}", referred_email)
            .replace("{points}", &points.to_string())
            .replace("{amount_gbp}", amount_gbp)
            .replace("{order_session_id}", order_session_id)
    }
}

/// The outcome of processing a paid order against the referral ledger.
#[derive(Debug, Clone)]
pub enum RewardDecision {
    /// Pure decision, no mutation: the order carries no usable customer email.
    NotApplicable { reason: String },
    /// The customer was not referred by anyone.
    NoMatchingClaim,
    /// The claim was marked rewarded and a notification rendered.
    Rewarded { claim: ReferralClaim, message: String },
}

pub struct ReferralApi<B> {
    db: B,
}

impl<B> Debug for ReferralApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReferralApi")
    }
}

impl<B> ReferralApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

/// Trimmed and lowercased, with empty collapsing to `None`. All email comparisons in the referral
/// flow go through this.
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_lowercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

impl<B> ReferralApi<B>
where B: ReferralManagement
{
    /// Record a claim from a referral command. Self-referrals (referrer email equal to referred
    /// email after normalization) are recorded as `SelfBlocked` and never become pending.
    pub async fn create_claim_from_command(
        &self,
        referrer_discord_user_id: &str,
        referrer_email: &str,
        referred_email: &str,
    ) -> Result<ReferralClaim, ReferralApiError> {
        let referrer = normalize_email(referrer_email)
            .ok_or_else(|| ReferralApiError::ValidationError("referrer email is empty".into()))?;
        let referred = normalize_email(referred_email)
            .ok_or_else(|| ReferralApiError::ValidationError("referred email is empty".into()))?;
        let status = if referrer == referred {
            warn!("🤝️ Self-referral attempt by discord user {referrer_discord_user_id}. Blocking.");
            ReferralClaimStatus::SelfBlocked
        } else {
            ReferralClaimStatus::Pending
        };
        let claim = self.db.insert_referral_claim(referrer_discord_user_id, &referrer, &referred, status).await?;
        Ok(claim)
    }

    /// Resolve the referral reward for a freshly paid order.
    ///
    /// Returns a decision rather than mutating when the order has no customer email. Otherwise
    /// the oldest pending claim for that email is rewarded and a notification is rendered for the
    /// caller to deliver.
    pub async fn process_paid_order_reward(
        &self,
        order_session: &OrderSession,
        template: &RewardTemplate,
    ) -> Result<RewardDecision, ReferralApiError> {
        let email = order_session.customer_email.as_deref().and_then(normalize_email);
        let email = match email {
            Some(email) => email,
            None => {
                debug!(
                    "🤝️ Order session [{}] has no customer email. No referral to resolve.",
                    order_session.order_session_id
                );
                return Ok(RewardDecision::NotApplicable { reason: "no_customer_email".to_string() });
            },
        };
        let claim = match self.db.fetch_pending_claim_for_email(&email).await? {
            Some(claim) => claim,
            None => return Ok(RewardDecision::NoMatchingClaim),
        };
        let claim = self.db.mark_claim_rewarded(claim.id).await?;
        let message = template.render(
            &claim.referrer_email,
            &claim.referred_email,
            order_session.points_earned,
            &order_session.total.to_decimal_string(),
            order_session.order_session_id.as_str(),
        );
        info!(
            "🤝️💰️ Referral claim #{} rewarded for order session [{}]",
            claim.id, order_session.order_session_id
        );
        Ok(RewardDecision::Rewarded { claim, message })
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn emails_normalize_case_insensitively() {
        assert_eq!(normalize_email("  Alice@Example.COM "), Some("alice@example.com".to_string()));
        assert_eq!(normalize_email("   "), None);
    }

    #[test]
    fn template_substitution() {
        let template = RewardTemplate(
            "{referrer_email} earned {points} points for referring {referred_email} (order {order_session_id}, £{amount_gbp})".to_string(),
        );
        let message = template.render("a@x.com", "b@x.com", 5, "18.00", "os-1");
        assert_eq!(message, "a@x.com earned 5 points for referring b@x.com (order os-1, £18.00)");
    }
}
