//! HMAC middleware for Actix Web.
//!
//! Payment providers sign every webhook delivery with HMAC-SHA256 over the raw request body,
//! using a per-tenant shared secret, and put the base64 signature in a provider-specific header.
//! This middleware verifies that signature (constant-time) before any business logic runs and
//! replays the body to the wrapped handler. Missing or invalid signatures are rejected with 403.
//!
//! Wrap each provider's webhook scope with its own factory, configured with that provider's
//! header name and [`TenantSecrets`]. Webhook paths end in `/{tenant_id}/{order_session_id}`;
//! the tenant segment selects the signing secret, falling back to the provider default for
//! tenants without one of their own.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorBadRequest, ErrorForbidden},
    web,
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};

use crate::{config::TenantSecrets, helpers::hmac_matches};

pub struct HmacMiddlewareFactory {
    hmac_header: String,
    secrets: TenantSecrets,
    // If false, then the middleware will not check the HMAC signature and always allow the call
    enabled: bool,
}

impl HmacMiddlewareFactory {
    pub fn new(hmac_header: &str, secrets: TenantSecrets, enabled: bool) -> Self {
        HmacMiddlewareFactory { hmac_header: hmac_header.into(), secrets, enabled }
    }
}

impl<S, B> Transform<S, ServiceRequest> for HmacMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = HmacMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HmacMiddlewareService {
            hmac_header: self.hmac_header.clone(),
            secrets: self.secrets.clone(),
            enabled: self.enabled,
            service: Rc::new(service),
        }))
    }
}

pub struct HmacMiddlewareService<S> {
    hmac_header: String,
    secrets: TenantSecrets,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for HmacMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let tenant = tenant_from_path(req.path()).unwrap_or_default().to_string();
        let secret = self.secrets.secret_for(&tenant).reveal().clone();
        let hmac_header = self.hmac_header.clone();
        let enabled = self.enabled;
        Box::pin(async move {
            trace!("🔐️ Checking HMAC for request");
            if !enabled {
                trace!("🔐️ HMAC checks are disabled. Allowing request.");
                return service.call(req).await;
            }
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request data: {:?}", e);
                ErrorBadRequest("Failed to extract request data.")
            })?;
            let signature = req
                .headers()
                .get(&hmac_header)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    warn!("🔐️ No HMAC signature found in request. Denying access.");
                    ErrorForbidden("No HMAC signature found.")
                })?
                .to_string();
            if hmac_matches(&secret, data.as_ref(), &signature) {
                trace!("🔐️ HMAC check for request ✅️");
                req.set_payload(bytes_to_payload(data));
                service.call(req).await
            } else {
                warn!("🔐️ Invalid HMAC signature found in request. Denying access.");
                Err(ErrorForbidden("Invalid HMAC signature."))
            }
        })
    }
}

// Webhook paths end in /{tenant_id}/{order_session_id}; the tenant is the second-to-last segment.
fn tenant_from_path(path: &str) -> Option<&str> {
    let mut segments = path.trim_end_matches('/').rsplit('/');
    segments.next()?;
    segments.next().filter(|s| !s.is_empty())
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}

#[cfg(test)]
mod test {
    use actix_web::{error::ResponseError, http::StatusCode, test, web, App, HttpResponse};
    use tss_common::Secret;

    use super::*;
    use crate::helpers::calculate_hmac;

    macro_rules! hmac_app {
        ($enabled:expr) => {
            test::init_service(App::new().service(
                web::resource("/hook/{tenant_id}/{order_session_id}")
                    .wrap(HmacMiddlewareFactory::new(
                        "x-provider-signature",
                        TenantSecrets::new(Secret::new("whsec_1".to_string()))
                            .with_tenant("t1", Secret::new("whsec_t1".to_string())),
                        $enabled,
                    ))
                    .route(web::post().to(|body: String| async move { HttpResponse::Ok().body(body) })),
            ))
            .await
        };
    }

    async fn status_of<S>(app: &S, req: actix_http::Request) -> StatusCode
    where S: actix_web::dev::Service<actix_http::Request, Response = ServiceResponse, Error = Error> {
        match app.call(req).await {
            Ok(resp) => resp.status(),
            Err(e) => e.as_response_error().status_code(),
        }
    }

    #[actix_web::test]
    async fn valid_signature_passes_and_body_is_replayed() {
        let app = hmac_app!(true);
        let body = r#"{"status":"paid"}"#;
        let req = test::TestRequest::post()
            .uri("/hook/t9/os-1")
            .insert_header(("x-provider-signature", calculate_hmac("whsec_1", body.as_bytes())))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let echoed = test::read_body(resp).await;
        assert_eq!(echoed, body.as_bytes());
    }

    #[actix_web::test]
    async fn tenant_with_its_own_secret_does_not_verify_against_the_default() {
        let app = hmac_app!(true);
        let body = r#"{"status":"paid"}"#;
        let signed_with_tenant_secret = test::TestRequest::post()
            .uri("/hook/t1/os-1")
            .insert_header(("x-provider-signature", calculate_hmac("whsec_t1", body.as_bytes())))
            .set_payload(body)
            .to_request();
        assert!(status_of(&app, signed_with_tenant_secret).await.is_success());

        let signed_with_default = test::TestRequest::post()
            .uri("/hook/t1/os-1")
            .insert_header(("x-provider-signature", calculate_hmac("whsec_1", body.as_bytes())))
            .set_payload(body)
            .to_request();
        assert_eq!(status_of(&app, signed_with_default).await, StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn invalid_signature_is_forbidden() {
        let app = hmac_app!(true);
        let req = test::TestRequest::post()
            .uri("/hook/t9/os-1")
            .insert_header(("x-provider-signature", calculate_hmac("wrong secret", b"{}")))
            .set_payload("{}")
            .to_request();
        assert_eq!(status_of(&app, req).await, StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn missing_signature_is_forbidden() {
        let app = hmac_app!(true);
        let req = test::TestRequest::post().uri("/hook/t9/os-1").set_payload("{}").to_request();
        assert_eq!(status_of(&app, req).await, StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn disabled_checks_allow_unsigned_requests() {
        let app = hmac_app!(false);
        let req = test::TestRequest::post().uri("/hook/t9/os-1").set_payload("{}").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }
}
