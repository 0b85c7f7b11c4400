//! Webhook ingress for the payment providers.
//!
//! Every response here is 2xx with a [`WebhookAck`] classification body. Providers treat any 2xx
//! as delivered; distinguishing paid / duplicate / ignored / rejected in the body keeps operator
//! logs useful without inviting retry storms. The HMAC middleware has already verified the
//! delivery signature by the time these handlers run, and the limiter bounds how many
//! deliveries hit the settlement flow at once.
//!
//! Paths carry both the tenant and the session: the tenant segment selects the signing secret in
//! the middleware, and the handlers re-check that the session actually belongs to that tenant, so
//! one tenant's secret can never settle another tenant's order.

use actix_web::{web, HttpResponse};
use log::*;
use ticket_settlement_engine::{
    db_types::OrderSessionId,
    helpers::{CryptoPaymentEvent, FiatPaymentEvent, PaymentNotification},
    traits::SettlementDatabase,
    OrderFlowError,
    SettlementDatabaseError,
    SettlementFlowApi,
    WebhookOutcome,
};

use crate::{data_objects::WebhookAck, errors::ServerError, route, webhook_limiter::WebhookLimiter};

route!(fiat_webhook => Post "/{tenant_id}/{order_session_id}" impl SettlementDatabase);
pub async fn fiat_webhook<B: SettlementDatabase>(
    path: web::Path<(String, String)>,
    body: web::Bytes,
    api: web::Data<SettlementFlowApi<B>>,
    limiter: web::Data<WebhookLimiter>,
) -> Result<HttpResponse, ServerError> {
    let (tenant_id, session_id) = path.into_inner();
    let id = OrderSessionId::from(session_id);
    let event: FiatPaymentEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("🔔️ Undeliverable fiat webhook payload for session [{id}]: {e}");
            return Ok(HttpResponse::Ok().json(WebhookAck::with_detail("rejected", e.to_string())));
        },
    };
    process_notification(&tenant_id, &id, PaymentNotification::Fiat(event), api.as_ref(), limiter.as_ref()).await
}

route!(crypto_webhook => Post "/{tenant_id}/{order_session_id}" impl SettlementDatabase);
pub async fn crypto_webhook<B: SettlementDatabase>(
    path: web::Path<(String, String)>,
    body: web::Bytes,
    api: web::Data<SettlementFlowApi<B>>,
    limiter: web::Data<WebhookLimiter>,
) -> Result<HttpResponse, ServerError> {
    let (tenant_id, session_id) = path.into_inner();
    let id = OrderSessionId::from(session_id);
    let event: CryptoPaymentEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("🔔️ Undeliverable crypto webhook payload for session [{id}]: {e}");
            return Ok(HttpResponse::Ok().json(WebhookAck::with_detail("rejected", e.to_string())));
        },
    };
    process_notification(&tenant_id, &id, PaymentNotification::Crypto(event), api.as_ref(), limiter.as_ref()).await
}

async fn process_notification<B: SettlementDatabase>(
    tenant_id: &str,
    id: &OrderSessionId,
    notification: PaymentNotification,
    api: &SettlementFlowApi<B>,
    limiter: &WebhookLimiter,
) -> Result<HttpResponse, ServerError> {
    let _permit = limiter.acquire().await?;
    // The signature was verified against the tenant in the path; the session must belong to it.
    if let Some(session) = api.db().fetch_order_session(id).await.map_err(OrderFlowError::DatabaseError)? {
        if session.tenant_id != tenant_id {
            warn!("🔔️ Webhook for session [{id}] addressed to the wrong tenant ({tenant_id}). Rejecting.");
            return Ok(HttpResponse::Ok().json(WebhookAck::with_detail("rejected", "tenant mismatch".to_string())));
        }
    }
    match api.process_payment_notification(id, &notification).await {
        Ok(WebhookOutcome::Paid(session)) => {
            Ok(HttpResponse::Ok().json(WebhookAck::with_detail("paid", format!("total {}", session.total))))
        },
        Ok(WebhookOutcome::Duplicate) => Ok(HttpResponse::Ok().json(WebhookAck::new("duplicate"))),
        Ok(WebhookOutcome::Ignored { status }) => {
            Ok(HttpResponse::Ok().json(WebhookAck::with_detail("ignored", status)))
        },
        // Sessions the provider knows about but we cannot transition are acknowledged, not
        // retried: the delivery was received and classified.
        Err(OrderFlowError::DatabaseError(e @ SettlementDatabaseError::SessionNotFound(_)))
        | Err(OrderFlowError::DatabaseError(e @ SettlementDatabaseError::SessionAlreadyTerminal { .. })) => {
            info!("🔔️ Webhook for session [{id}] rejected: {e}");
            Ok(HttpResponse::Ok().json(WebhookAck::with_detail("rejected", e.to_string())))
        },
        Err(e) => Err(e.into()),
    }
}
