use std::{collections::HashMap, env};

use chrono::Duration;
use log::*;
use rand::RngCore;
use tss_common::{parse_boolean_flag, Secret};

const DEFAULT_TSS_HOST: &str = "127.0.0.1";
const DEFAULT_TSS_PORT: u16 = 8380;
const DEFAULT_CHECKOUT_TTL: Duration = Duration::minutes(30);
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_WEBHOOK_CONCURRENCY: usize = 2;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Webhook signing secrets for the fiat provider, resolved per tenant.
    pub fiat_webhook_secrets: TenantSecrets,
    /// Webhook signing secrets for the crypto provider, resolved per tenant.
    pub crypto_webhook_secrets: TenantSecrets,
    /// When false, webhook HMAC verification is skipped. Local development only.
    pub hmac_checks: bool,
    /// Signing key for checkout and callback tokens.
    pub token_secret: Secret<String>,
    /// Key material for secret-at-rest encryption. Either a base64 key of >= 32 bytes or a
    /// passphrase; see [`crate::secrets::SecretCipher::from_key_material`].
    pub secret_at_rest_key: Secret<String>,
    /// How long a checkout token (and its cached link) stays valid.
    pub checkout_ttl: Duration,
    /// Interval between expiry sweeps.
    pub sweep_interval_secs: u64,
    /// Maximum number of webhook deliveries processed concurrently.
    pub webhook_concurrency: usize,
    /// Template for referral reward notifications.
    pub reward_template: String,
    /// Public base URL of the checkout page; the signed token is appended to it.
    pub checkout_base_url: String,
    pub tenant_policy: TenantPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_TSS_HOST.to_string(),
            port: DEFAULT_TSS_PORT,
            database_url: String::default(),
            fiat_webhook_secrets: TenantSecrets::default(),
            crypto_webhook_secrets: TenantSecrets::default(),
            hmac_checks: true,
            token_secret: Secret::default(),
            secret_at_rest_key: Secret::default(),
            checkout_ttl: DEFAULT_CHECKOUT_TTL,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            webhook_concurrency: DEFAULT_WEBHOOK_CONCURRENCY,
            reward_template: default_reward_template(),
            checkout_base_url: format!("http://{DEFAULT_TSS_HOST}:{DEFAULT_TSS_PORT}/checkout"),
            tenant_policy: TenantPolicy::default(),
        }
    }
}

fn default_reward_template() -> String {
    "{referrer_email} earned {points} points for referring {referred_email} (order {order_session_id}, \
     £{amount_gbp})"
        .to_string()
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("TSS_HOST").ok().unwrap_or_else(|| DEFAULT_TSS_HOST.into());
        let port = env::var("TSS_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for TSS_PORT. {e} Using the default, {DEFAULT_TSS_PORT}, instead."
                    );
                    DEFAULT_TSS_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_TSS_PORT);
        let database_url = env::var("TSS_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ TSS_DATABASE_URL is not set. Please set it to the URL for the settlement database.");
            String::default()
        });
        let fiat_webhook_secrets = TenantSecrets::from_env("TSS_FIAT_HMAC_SECRET", "TSS_FIAT_TENANT_HMAC_SECRETS");
        let crypto_webhook_secrets =
            TenantSecrets::from_env("TSS_CRYPTO_HMAC_SECRET", "TSS_CRYPTO_TENANT_HMAC_SECRETS");
        let hmac_checks = parse_boolean_flag(env::var("TSS_HMAC_CHECKS").ok(), true);
        if !hmac_checks {
            warn!("🚨️ TSS_HMAC_CHECKS is disabled. Webhook signatures will NOT be verified. Never run production \
                   like this.");
        }
        let token_secret = match env::var("TSS_TOKEN_SECRET") {
            Ok(s) => Secret::new(s),
            Err(_) => {
                warn!(
                    "🚨️🚨️🚨️ TSS_TOKEN_SECRET has not been set. I'm using a random value for this session. Checkout \
                     links will stop working on restart. 🚨️🚨️🚨️"
                );
                Secret::new(random_secret())
            },
        };
        let secret_at_rest_key = match env::var("TSS_SECRET_AT_REST_KEY") {
            Ok(s) => Secret::new(s),
            Err(_) => {
                warn!(
                    "🚨️🚨️🚨️ TSS_SECRET_AT_REST_KEY has not been set. I'm using a random value for this session. \
                     Secrets stored now will be unreadable on restart. 🚨️🚨️🚨️"
                );
                Secret::new(random_secret())
            },
        };
        let checkout_ttl = env::var("TSS_CHECKOUT_TTL_MINUTES")
            .map_err(|_| {
                info!(
                    "🪛️ TSS_CHECKOUT_TTL_MINUTES is not set. Using the default value of {} minutes.",
                    DEFAULT_CHECKOUT_TTL.num_minutes()
                )
            })
            .and_then(|s| {
                s.parse::<i64>()
                    .map(Duration::minutes)
                    .map_err(|e| warn!("🪛️ Invalid configuration value for TSS_CHECKOUT_TTL_MINUTES. {e}"))
            })
            .ok()
            .unwrap_or(DEFAULT_CHECKOUT_TTL);
        let sweep_interval_secs = env::var("TSS_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
        let webhook_concurrency = env::var("TSS_WEBHOOK_CONCURRENCY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_WEBHOOK_CONCURRENCY);
        let reward_template = env::var("TSS_REWARD_TEMPLATE").ok().unwrap_or_else(default_reward_template);
        let checkout_base_url = env::var("TSS_CHECKOUT_BASE_URL").ok().unwrap_or_else(|| {
            info!("🪛️ TSS_CHECKOUT_BASE_URL is not set. Checkout links will point at this server directly.");
            format!("http://{host}:{port}/checkout")
        });
        let tenant_policy = TenantPolicy::from_env();
        Self {
            host,
            port,
            database_url,
            fiat_webhook_secrets,
            crypto_webhook_secrets,
            hmac_checks,
            token_secret,
            secret_at_rest_key,
            checkout_ttl,
            sweep_interval_secs,
            webhook_concurrency,
            reward_template,
            checkout_base_url,
            tenant_policy,
        }
    }
}

fn required_secret(var: &str) -> Secret<String> {
    let value = env::var(var).ok().unwrap_or_else(|| {
        error!("🪛️ {var} is not set. Please set it to the shared secret for the provider's webhooks.");
        String::default()
    });
    Secret::new(value)
}

fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::encode(bytes)
}

//------------------------------------------------  TenantSecrets  ----------------------------------------------------

/// Webhook signing secrets for one payment provider.
///
/// Each tenant signs with its own shared secret; tenants that have not been issued one yet fall
/// back to the provider-wide default. The per-tenant map comes from a comma-separated list of
/// `tenant_id:secret` pairs (e.g. `TSS_FIAT_TENANT_HMAC_SECRETS`), the default from the
/// provider's own variable (e.g. `TSS_FIAT_HMAC_SECRET`).
#[derive(Clone, Debug, Default)]
pub struct TenantSecrets {
    pub default: Secret<String>,
    pub per_tenant: HashMap<String, Secret<String>>,
}

impl TenantSecrets {
    pub fn new(default: Secret<String>) -> Self {
        Self { default, per_tenant: HashMap::new() }
    }

    pub fn with_tenant<S: Into<String>>(mut self, tenant_id: S, secret: Secret<String>) -> Self {
        self.per_tenant.insert(tenant_id.into(), secret);
        self
    }

    pub fn from_env(default_var: &str, map_var: &str) -> Self {
        let default = required_secret(default_var);
        let per_tenant = env::var(map_var)
            .ok()
            .map(|s| {
                s.split(',')
                    .filter_map(|pair| {
                        let pair = pair.trim();
                        if pair.is_empty() {
                            return None;
                        }
                        match pair.split_once(':') {
                            Some((tenant, secret)) => Some((tenant.to_string(), Secret::new(secret.to_string()))),
                            None => {
                                warn!("🪛️ Ignoring malformed entry in {map_var}");
                                None
                            },
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { default, per_tenant }
    }

    pub fn secret_for(&self, tenant_id: &str) -> &Secret<String> {
        self.per_tenant.get(tenant_id).unwrap_or(&self.default)
    }
}

//-------------------------------------------------  TenantPolicy  ----------------------------------------------------

/// Which tenants are allowed to settle orders, and which Discord guilds they are connected to.
///
/// `TSS_DISABLED_TENANTS` is a comma-separated list of tenant ids. `TSS_CONNECTED_GUILDS` is a
/// comma-separated list of `tenant_id:guild_id` pairs; when it is empty, every guild is treated
/// as connected (single-tenant deployments don't maintain the map).
#[derive(Clone, Debug, Default)]
pub struct TenantPolicy {
    pub disabled_tenants: Vec<String>,
    pub connected_guilds: Vec<(String, String)>,
}

impl TenantPolicy {
    pub fn from_env() -> Self {
        let disabled_tenants = env::var("TSS_DISABLED_TENANTS")
            .ok()
            .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default();
        let connected_guilds = env::var("TSS_CONNECTED_GUILDS")
            .ok()
            .map(|s| {
                s.split(',')
                    .filter_map(|pair| {
                        let pair = pair.trim();
                        if pair.is_empty() {
                            return None;
                        }
                        match pair.split_once(':') {
                            Some((tenant, guild)) => Some((tenant.to_string(), guild.to_string())),
                            None => {
                                warn!("🪛️ Ignoring malformed entry ({pair}) in TSS_CONNECTED_GUILDS");
                                None
                            },
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { disabled_tenants, connected_guilds }
    }

    pub fn tenant_enabled(&self, tenant_id: &str) -> bool {
        !self.disabled_tenants.iter().any(|t| t == tenant_id)
    }

    pub fn guild_connected(&self, tenant_id: &str, guild_id: &str) -> bool {
        self.connected_guilds.is_empty()
            || self.connected_guilds.iter().any(|(t, g)| t == tenant_id && g == guild_id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tenant_secret_lookup_falls_back_to_the_provider_default() {
        let secrets = TenantSecrets::new(Secret::new("whsec_global".to_string()))
            .with_tenant("t1", Secret::new("whsec_t1".to_string()));
        assert_eq!(secrets.secret_for("t1").reveal(), "whsec_t1");
        assert_eq!(secrets.secret_for("t2").reveal(), "whsec_global");
    }

    #[test]
    fn empty_guild_map_connects_everything() {
        let policy = TenantPolicy::default();
        assert!(policy.guild_connected("t1", "g1"));
        assert!(policy.tenant_enabled("t1"));
    }

    #[test]
    fn guild_map_is_per_tenant() {
        let policy = TenantPolicy {
            disabled_tenants: vec!["t2".to_string()],
            connected_guilds: vec![("t1".to_string(), "g1".to_string())],
        };
        assert!(policy.guild_connected("t1", "g1"));
        assert!(!policy.guild_connected("t1", "g2"));
        assert!(!policy.guild_connected("t2", "g1"));
        assert!(!policy.tenant_enabled("t2"));
        assert!(policy.tenant_enabled("t1"));
    }
}
