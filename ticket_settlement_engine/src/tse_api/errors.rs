use thiserror::Error;

use crate::{
    helpers::SettlementError,
    traits::{ReferralManagementError, SettlementDatabaseError},
};

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("{0}")]
    DatabaseError(#[from] SettlementDatabaseError),
    #[error("{0}")]
    SettlementError(#[from] SettlementError),
}

#[derive(Debug, Clone, Error)]
pub enum ReferralApiError {
    #[error("{0}")]
    DatabaseError(#[from] ReferralManagementError),
    #[error("Invalid referral input: {0}")]
    ValidationError(String),
}
