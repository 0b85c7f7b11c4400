pub mod errors;
pub mod referral_api;
pub mod settlement_flow_api;

pub use errors::{OrderFlowError, ReferralApiError};
pub use referral_api::{ReferralApi, RewardDecision, RewardTemplate};
pub use settlement_flow_api::{CheckoutRequest, SettlementFlowApi, WebhookOutcome};
