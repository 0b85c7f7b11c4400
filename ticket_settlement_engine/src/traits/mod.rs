//! Behaviour contracts for settlement engine backends.
//!
//! A backend (currently SQLite) implements these traits to act as the store for the ticket
//! settlement server. The flow APIs in [`crate::tse_api`] only ever talk to these traits.

mod referral_management;
mod settlement_database;

pub use referral_management::{ReferralManagement, ReferralManagementError};
pub use settlement_database::{SettlementDatabase, SettlementDatabaseError, WebhookEventClaim};
