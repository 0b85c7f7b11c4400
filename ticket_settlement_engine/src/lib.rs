//! Ticket Settlement Engine
//!
//! The settlement engine is the core of the ticket settlement server: given a basket of priced
//! line items, a coupon, and a customer's point balance, it computes an exact, auditable breakdown
//! of discounts and point earnings; once a payment provider confirms payment, it applies that
//! breakdown idempotently to the order session, transitions its state, and triggers exactly one
//! referral reward. This library is provider-agnostic.
//!
//! The library is divided into three main sections:
//! 1. Pure settlement algorithms ([`mod@helpers`]): largest-remainder allocation, coupon scope
//!    resolution, the points engine, and payment-signal normalization. These are side-effect-free
//!    functions over immutable inputs and are safe to call concurrently.
//! 2. Database management and control ([`mod@traits`] and the SQLite backend). You should never
//!    need to access the database directly; use the flow APIs instead. The exception is the data
//!    types used in the database, defined in the public `db_types` module.
//! 3. The flow APIs ([`mod@tse_api`]): the order-session lifecycle (checkout, payment webhooks,
//!    cancellation, expiry) and referral reward issuance.
//!
//! The engine also provides a set of events that can be subscribed to. For example, when an order
//! session is first marked paid, an `OrderPaidEvent` is emitted; the referral reward hook hangs
//! off that event.

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;
pub mod tse_api;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(all(feature = "sqlite", any(feature = "test_utils", test)))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{ReferralManagement, SettlementDatabase, SettlementDatabaseError, WebhookEventClaim};
pub use tse_api::{
    errors::{OrderFlowError, ReferralApiError},
    referral_api::{ReferralApi, RewardDecision, RewardTemplate},
    settlement_flow_api::{CheckoutRequest, SettlementFlowApi, WebhookOutcome},
};
