use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use thiserror::Error;
use ticket_settlement_engine::{OrderFlowError, ReferralApiError, SettlementDatabaseError};

use crate::{secrets::SecretPayloadError, tokens::TokenError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Invalid request. {0}")]
    ValidationError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error(transparent)]
    TokenError(#[from] TokenError),
    #[error(transparent)]
    InvalidSecretPayload(#[from] SecretPayloadError),
    #[error("Unknown order session. {0}")]
    InvalidSession(String),
    #[error("The order session has expired. {0}")]
    SessionExpired(String),
    #[error("The order session is already settled. {0}")]
    TerminalConflict(String),
    #[error("This tenant is disabled.")]
    TenantDisabled,
    #[error("Access to this tenant is denied.")]
    TenantAccessDenied,
    #[error("Insufficient role for this operation. {0}")]
    TenantRoleDenied(String),
    #[error("The guild is not connected to this tenant.")]
    GuildNotConnected,
}

impl ServerError {
    /// Stable machine-readable code carried in every error response body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::TokenError(TokenError::Malformed(_)) => "INVALID_CHECKOUT_TOKEN",
            Self::TokenError(TokenError::BadSignature) => "INVALID_CHECKOUT_TOKEN_SIGNATURE",
            Self::TokenError(TokenError::Expired) => "EXPIRED_CHECKOUT_TOKEN",
            Self::InvalidSession(_) | Self::TerminalConflict(_) => "INVALID_SESSION",
            Self::SessionExpired(_) => "SESSION_EXPIRED",
            Self::InvalidSecretPayload(_) => "INVALID_SECRET_PAYLOAD",
            Self::TenantDisabled => "TENANT_DISABLED",
            Self::TenantAccessDenied => "TENANT_ACCESS_DENIED",
            Self::TenantRoleDenied(_) => "TENANT_ROLE_DENIED",
            Self::GuildNotConnected => "GUILD_NOT_CONNECTED",
            Self::InitializeError(_) | Self::BackendError(_) | Self::IOError(_) | Self::ConfigurationError(_) => {
                "INTERNAL_ERROR"
            },
        }
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::TokenError(TokenError::Malformed(_)) => StatusCode::BAD_REQUEST,
            Self::TokenError(TokenError::BadSignature) => StatusCode::UNAUTHORIZED,
            Self::TokenError(TokenError::Expired) => StatusCode::UNAUTHORIZED,
            Self::InvalidSecretPayload(_) => StatusCode::BAD_REQUEST,
            Self::InvalidSession(_) => StatusCode::NOT_FOUND,
            Self::SessionExpired(_) => StatusCode::GONE,
            Self::TerminalConflict(_) => StatusCode::CONFLICT,
            Self::TenantDisabled => StatusCode::FORBIDDEN,
            Self::TenantAccessDenied => StatusCode::FORBIDDEN,
            Self::TenantRoleDenied(_) => StatusCode::FORBIDDEN,
            Self::GuildNotConnected => StatusCode::NOT_FOUND,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string(), "code": self.code() }).to_string())
    }
}

impl From<OrderFlowError> for ServerError {
    fn from(e: OrderFlowError) -> Self {
        match e {
            OrderFlowError::SettlementError(e) => Self::ValidationError(e.to_string()),
            OrderFlowError::DatabaseError(SettlementDatabaseError::SessionNotFound(id)) => {
                Self::InvalidSession(format!("No order session with id {id}"))
            },
            OrderFlowError::DatabaseError(e @ SettlementDatabaseError::SessionAlreadyTerminal { .. }) => {
                Self::TerminalConflict(e.to_string())
            },
            OrderFlowError::DatabaseError(SettlementDatabaseError::ValidationError(s)) => Self::ValidationError(s),
            OrderFlowError::DatabaseError(e) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<ReferralApiError> for ServerError {
    fn from(e: ReferralApiError) -> Self {
        match e {
            ReferralApiError::ValidationError(s) => Self::ValidationError(s),
            ReferralApiError::DatabaseError(e) => Self::BackendError(e.to_string()),
        }
    }
}
