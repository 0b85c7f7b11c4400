use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use ticket_settlement_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    ReferralApi,
    RewardDecision,
    RewardTemplate,
    SettlementFlowApi,
    SqliteDatabase,
};
use tss_common::Secret;

use crate::{
    cache::{CheckoutLinkStore, MemoryCache},
    config::{ServerConfig, TenantPolicy},
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    middleware::HmacMiddlewareFactory,
    routes::{health, CancelSessionRoute, CheckoutRoute, CheckoutSessionRoute},
    secrets::SecretCipher,
    webhook_limiter::WebhookLimiter,
    webhook_routes::{CryptoWebhookRoute, FiatWebhookRoute},
};

pub const SETTLEMENT_EVENT_BUFFER_SIZE: usize = 25;

/// Per-request state for the non-webhook routes: token signing, tenant policy, the checkout-link
/// cache and the at-rest cipher for sensitive ticket answers. Kept separate from [`ServerConfig`]
/// so handlers never see the webhook HMAC secrets.
#[derive(Clone)]
pub struct BoundaryState {
    pub token_secret: Secret<String>,
    pub checkout_base_url: String,
    pub checkout_ttl: chrono::Duration,
    pub tenant_policy: TenantPolicy,
    pub links: CheckoutLinkStore<MemoryCache>,
    pub cipher: SecretCipher,
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let links = CheckoutLinkStore::new(MemoryCache::new(), config.checkout_ttl);
    let handlers = create_referral_event_handlers(db.clone(), RewardTemplate(config.reward_template.clone()));
    let producers = handlers.producers();
    handlers.start_handlers().await;
    start_expiry_worker(db.clone(), producers.clone(), links.clone(), config.sweep_interval_secs);
    let srv = create_server_instance(config, db, producers, links)?;
    srv.await.map_err(|e| ServerError::BackendError(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
    links: CheckoutLinkStore<MemoryCache>,
) -> Result<Server, ServerError> {
    // one limiter shared by every worker, so the in-flight bound is global
    let limiter = WebhookLimiter::new(config.webhook_concurrency);
    let cipher = SecretCipher::from_key_material(config.secret_at_rest_key.reveal());
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let api = SettlementFlowApi::new(db.clone(), producers.clone());
        let state = BoundaryState {
            token_secret: config.token_secret.clone(),
            checkout_base_url: config.checkout_base_url.clone(),
            checkout_ttl: config.checkout_ttl,
            tenant_policy: config.tenant_policy.clone(),
            links: links.clone(),
            cipher: cipher.clone(),
        };
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("tss::access_log"))
            .app_data(web::Data::new(api))
            .app_data(web::Data::new(limiter.clone()))
            .app_data(web::Data::new(state));
        let fiat_scope = web::scope("/webhook/fiat")
            .wrap(HmacMiddlewareFactory::new(
                "x-fiat-signature",
                config.fiat_webhook_secrets.clone(),
                config.hmac_checks,
            ))
            .service(FiatWebhookRoute::<SqliteDatabase>::new());
        let crypto_scope = web::scope("/webhook/crypto")
            .wrap(HmacMiddlewareFactory::new(
                "x-crypto-signature",
                config.crypto_webhook_secrets.clone(),
                config.hmac_checks,
            ))
            .service(CryptoWebhookRoute::<SqliteDatabase>::new());
        app.service(health)
            .service(CheckoutRoute::<SqliteDatabase>::new())
            .service(CheckoutSessionRoute::<SqliteDatabase>::new())
            .service(CancelSessionRoute::<SqliteDatabase>::new())
            .service(fiat_scope)
            .service(crypto_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

/// Wires the referral reward hook onto the order-paid event.
///
/// The exactly-once property lives upstream: the idempotent paid transition fires the event at
/// most once per session, and the Pending-only claim update guards against operator replays. All
/// this handler does is resolve the reward and log the rendered notification for the bot to
/// deliver.
pub fn create_referral_event_handlers(db: SqliteDatabase, template: RewardTemplate) -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(move |ev| {
        let api = ReferralApi::new(db.clone());
        let template = template.clone();
        Box::pin(async move {
            let session_id = ev.order_session.order_session_id.clone();
            match api.process_paid_order_reward(&ev.order_session, &template).await {
                Ok(RewardDecision::Rewarded { claim, message }) => {
                    info!("🤝️💰️ Referral reward issued for claim #{} on session [{session_id}]: {message}", claim.id);
                },
                Ok(RewardDecision::NoMatchingClaim) => {
                    debug!("🤝️ No referral claim matches session [{session_id}]");
                },
                Ok(RewardDecision::NotApplicable { reason }) => {
                    debug!("🤝️ Referral reward not applicable for session [{session_id}]: {reason}");
                },
                Err(e) => {
                    error!("🤝️ Error resolving referral reward for session [{session_id}]: {e}");
                },
            }
        })
    });
    EventHandlers::new(SETTLEMENT_EVENT_BUFFER_SIZE, hooks)
}
