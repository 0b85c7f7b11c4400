//! Tenant and role guards.
//!
//! The settlement server does not run its own login flow; callers are other services (the
//! Discord bot, the checkout frontend) that present a staff role header and, for mutating
//! calls, a callback token proving they were issued a reference to the session. The guards here
//! turn policy violations into the typed errors the boundary returns.

use actix_web::HttpRequest;
use log::*;
use ticket_settlement_engine::db_types::Role;

use crate::{config::TenantPolicy, errors::ServerError, tokens::verify_callback_token};

pub const STAFF_ROLE_HEADER: &str = "tss-staff-role";
pub const CALLBACK_TOKEN_HEADER: &str = "tss-callback-token";

/// Ranked role check: `Member < Admin < Owner`.
pub fn require_role(actual: Role, required: Role) -> Result<(), ServerError> {
    if actual >= required {
        Ok(())
    } else {
        debug!("🔐️ Role {actual} does not satisfy required role {required}");
        Err(ServerError::TenantRoleDenied(format!("{required} role required, caller has {actual}")))
    }
}

/// Tenant gate applied before any session is created or mutated.
pub fn check_tenant(policy: &TenantPolicy, tenant_id: &str, guild_id: &str) -> Result<(), ServerError> {
    if !policy.tenant_enabled(tenant_id) {
        warn!("🔐️ Tenant {tenant_id} is disabled. Denying request.");
        return Err(ServerError::TenantDisabled);
    }
    if !policy.guild_connected(tenant_id, guild_id) {
        warn!("🔐️ Guild {guild_id} is not connected to tenant {tenant_id}. Denying request.");
        return Err(ServerError::GuildNotConnected);
    }
    Ok(())
}

/// Read the caller's staff role from the request headers. Absent or unparseable headers rank as
/// `Member`, the lowest role.
pub fn staff_role(req: &HttpRequest) -> Role {
    req.headers()
        .get(STAFF_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<Role>().ok())
        .unwrap_or(Role::Member)
}

/// Verify the caller's callback token against the session's identity triple.
pub fn check_callback_token(
    req: &HttpRequest,
    key: &str,
    tenant_id: &str,
    guild_id: &str,
    order_session_id: &str,
) -> Result<(), ServerError> {
    let token = req
        .headers()
        .get(CALLBACK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ServerError::TenantAccessDenied)?;
    if verify_callback_token(key, tenant_id, guild_id, order_session_id, token) {
        Ok(())
    } else {
        warn!("🔐️ Invalid callback token presented for session [{order_session_id}]. Denying access.");
        Err(ServerError::TenantAccessDenied)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roles_rank_member_admin_owner() {
        assert!(require_role(Role::Owner, Role::Admin).is_ok());
        assert!(require_role(Role::Admin, Role::Admin).is_ok());
        assert!(require_role(Role::Member, Role::Admin).is_err());
        let err = require_role(Role::Member, Role::Owner).unwrap_err();
        assert_eq!(err.code(), "TENANT_ROLE_DENIED");
    }

    #[test]
    fn disabled_tenant_beats_guild_check() {
        let policy = TenantPolicy {
            disabled_tenants: vec!["t1".to_string()],
            connected_guilds: vec![],
        };
        let err = check_tenant(&policy, "t1", "g1").unwrap_err();
        assert_eq!(err.code(), "TENANT_DISABLED");
    }

    #[test]
    fn unconnected_guild_is_rejected() {
        let policy = TenantPolicy {
            disabled_tenants: vec![],
            connected_guilds: vec![("t1".to_string(), "g1".to_string())],
        };
        assert!(check_tenant(&policy, "t1", "g1").is_ok());
        let err = check_tenant(&policy, "t1", "g2").unwrap_err();
        assert_eq!(err.code(), "GUILD_NOT_CONNECTED");
    }
}
