//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Webhook handlers live in [`crate::webhook_routes`]; everything else is here.

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use log::*;
use tss_common::mask_sensitive;
use ticket_settlement_engine::{
    db_types::{CouponScope, NewOrderSession, OrderSessionId, OrderSessionStatus, PointsConfigSnapshot, Role},
    helpers::coupon_eligible_subtotal,
    traits::SettlementDatabase,
    CheckoutRequest,
    SettlementFlowApi,
};

use crate::{
    auth::{check_callback_token, check_tenant, require_role, staff_role},
    data_objects::{CheckoutConfirmation, CheckoutPayload, JsonResponse, SessionView},
    errors::ServerError,
    server::BoundaryState,
    tokens::{callback_token, sign_checkout_token, verify_checkout_token, CheckoutClaims},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------  Checkout  ----------------------------------------------------
route!(checkout => Post "/checkout" impl SettlementDatabase);
/// Route handler for the checkout endpoint.
///
/// The ticket bot posts the basket, the coupon, and the points snapshot it captured at command
/// time. The server sizes the coupon against its eligible subtotal, runs the settlement, stores
/// the session, and hands back a signed checkout link plus the callback token other services
/// will present when acting on this session.
pub async fn checkout<B: SettlementDatabase>(
    payload: web::Json<CheckoutPayload>,
    api: web::Data<SettlementFlowApi<B>>,
    state: web::Data<BoundaryState>,
) -> Result<HttpResponse, ServerError> {
    let payload = payload.into_inner();
    check_tenant(&state.tenant_policy, &payload.tenant_id, &payload.guild_id)?;
    let scope = if payload.coupon_products.is_empty() {
        CouponScope::unrestricted()
    } else {
        CouponScope::for_products(payload.coupon_products.clone())
    };
    let eligible = coupon_eligible_subtotal(&scope, &payload.basket_lines);
    let coupon_discount = payload.coupon_value.min(eligible);
    let expires_at = Utc::now() + state.checkout_ttl;

    let mut session = NewOrderSession::new(
        OrderSessionId::from(payload.order_session_id.clone()),
        payload.tenant_id.clone(),
        payload.guild_id.clone(),
        payload.customer_id.clone(),
    )
    .with_lines(payload.basket_lines.clone())
    .with_tip(payload.tip);
    if let Some(code) = &payload.coupon_code {
        session = session.with_coupon(code.clone(), coupon_discount);
    }
    if let Some(email) = &payload.customer_email {
        session = session.with_customer_email(email.clone());
    }
    // Ticket answers are sensitive free text. They are sealed with the at-rest key before they
    // touch the database; views and logs only ever see them masked.
    session.answers = if payload.answers.is_null() {
        payload.answers.clone()
    } else {
        serde_json::Value::String(state.cipher.seal(payload.answers.to_string().as_bytes())?)
    };
    session.checkout_token_expires_at = Some(expires_at);

    let config = PointsConfigSnapshot::new(payload.point_value)
        .earns(payload.earn_categories.clone())
        .redeems(payload.redeem_categories.clone());
    let request = CheckoutRequest { config, available_points: payload.available_points, use_points: payload.use_points };
    let stored = api.checkout_order(session, &request).await?;

    let claims = CheckoutClaims::new(payload.order_session_id.clone(), expires_at)
        .for_tenant(payload.tenant_id.clone(), payload.guild_id.clone());
    let key = state.token_secret.reveal();
    let checkout_token = sign_checkout_token(&claims, key)?;
    let callback = callback_token(key, &payload.tenant_id, &payload.guild_id, &payload.order_session_id);
    let checkout_url = format!("{}/{checkout_token}", state.checkout_base_url);
    state.links.put_link(&payload.order_session_id, &checkout_url);
    let customer = payload.customer_email.as_deref().map(mask_sensitive).unwrap_or_else(|| "<no email>".to_string());
    debug!("💻️ Checkout link issued for session [{}] ({customer})", stored.order_session_id);

    Ok(HttpResponse::Ok().json(CheckoutConfirmation {
        order_session_id: stored.order_session_id.to_string(),
        checkout_token,
        callback_token: callback,
        checkout_url,
        subtotal: stored.subtotal,
        total: stored.total,
        points_reserved: stored.points_reserved,
        points_earned: stored.points_earned,
        expires_at: stored.checkout_token_expires_at,
    }))
}

//-------------------------------------------  Checkout link  --------------------------------------------------
route!(checkout_session => Get "/checkout/{token}" impl SettlementDatabase);
/// Resolves a checkout token to its session view. This is what the checkout page calls when a
/// customer follows the link from the ticket channel.
pub async fn checkout_session<B: SettlementDatabase>(
    path: web::Path<String>,
    api: web::Data<SettlementFlowApi<B>>,
    state: web::Data<BoundaryState>,
) -> Result<HttpResponse, ServerError> {
    let token = path.into_inner();
    let claims = verify_checkout_token(&token, state.token_secret.reveal(), Utc::now())?;
    let id = OrderSessionId::from(claims.order_session_id.clone());
    let session = api
        .db()
        .fetch_order_session(&id)
        .await
        .map_err(|e| ServerError::BackendError(e.to_string()))?
        .ok_or_else(|| ServerError::InvalidSession(format!("No order session with id {id}")))?;
    if session.status == OrderSessionStatus::Cancelled {
        return Err(ServerError::SessionExpired(format!("Order session {id} has been cancelled")));
    }
    Ok(HttpResponse::Ok().json(SessionView::from(&session)))
}

//----------------------------------------------  Cancel  ------------------------------------------------------
route!(cancel_session => Post "/cancel/{order_session_id}" impl SettlementDatabase);
/// Staff-initiated cancellation. The caller must present the session's callback token and an
/// Admin (or better) staff role; reserved points are released and the checkout link dropped.
pub async fn cancel_session<B: SettlementDatabase>(
    req: HttpRequest,
    path: web::Path<String>,
    api: web::Data<SettlementFlowApi<B>>,
    state: web::Data<BoundaryState>,
) -> Result<HttpResponse, ServerError> {
    let session_id = path.into_inner();
    let id = OrderSessionId::from(session_id.clone());
    let session = api
        .db()
        .fetch_order_session(&id)
        .await
        .map_err(|e| ServerError::BackendError(e.to_string()))?
        .ok_or_else(|| ServerError::InvalidSession(format!("No order session with id {id}")))?;
    check_callback_token(&req, state.token_secret.reveal(), &session.tenant_id, &session.guild_id, &session_id)?;
    require_role(staff_role(&req), Role::Admin)?;
    let cancelled = api.cancel_session(&id, "cancelled by staff").await?;
    state.links.remove_link(&session_id);
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!(
        "Order session {} cancelled. {} reserved points released.",
        cancelled.order_session_id, cancelled.points_reserved
    ))))
}
