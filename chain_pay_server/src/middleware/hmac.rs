//! Request signature middleware.
//!
//! Passive channel pushes come from the merchant's payment-app companion rather than from a chain, so they are the
//! one way to mark an order paid without on-chain evidence. Every push carries a base64 HMAC-SHA256 of the raw
//! request body in the [`PUSH_SIGNATURE_HEADER`] header, keyed with `CPG_PUSH_HMAC_SECRET`. Requests without a valid
//! signature never reach the handler.
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
use cpg_common::Secret;
use futures::future::LocalBoxFuture;
use log::{trace, warn};

use crate::helpers::verify_hmac;

pub const PUSH_SIGNATURE_HEADER: &str = "X-Push-Signature";

/// Wraps a scope so that every request must carry a valid body signature.
pub struct HmacMiddlewareFactory {
    policy: Rc<SignaturePolicy>,
}

struct SignaturePolicy {
    header: String,
    key: Secret<String>,
    enforced: bool,
}

impl HmacMiddlewareFactory {
    /// With `enforced` false, every request passes through unchecked.
    pub fn new(hmac_header: &str, key: Secret<String>, enforced: bool) -> Self {
        let policy = SignaturePolicy { header: hmac_header.to_string(), key, enforced };
        Self { policy: Rc::new(policy) }
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
        ready(Ok(HmacMiddlewareService { policy: Rc::clone(&self.policy), service: Rc::new(service) }))
    }
}

pub struct HmacMiddlewareService<S> {
    policy: Rc<SignaturePolicy>,
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
        let policy = Rc::clone(&self.policy);
        Box::pin(async move {
            if policy.enforced {
                policy.verify(&mut req).await?;
            } else {
                trace!("🔐️ Signature checks are disabled. Allowing {}", req.path());
            }
            service.call(req).await
        })
    }
}

impl SignaturePolicy {
    /// Reads the whole body, checks it against the signature header and puts the body back for the handler.
    async fn verify(&self, req: &mut ServiceRequest) -> Result<(), Error> {
        if self.key.is_empty() {
            warn!("🔐️ No signing secret is configured. Denying {}", req.path());
            return Err(ErrorForbidden("Signed requests are not configured on this server."));
        }
        let signature = match req.headers().get(&self.header).and_then(|v| v.to_str().ok()) {
            Some(s) => s.to_string(),
            None => {
                warn!("🔐️ Request to {} is not signed. Denying access.", req.path());
                return Err(ErrorForbidden("No HMAC signature found."));
            },
        };
        let body = req.extract::<web::Bytes>().await.map_err(|e| {
            warn!("🔐️ Could not read the body of {}: {e:?}", req.path());
            ErrorBadRequest("Failed to extract request data.")
        })?;
        if !verify_hmac(self.key.reveal(), body.as_ref(), &signature) {
            warn!("🔐️ Bad signature on request to {}. Denying access.", req.path());
            return Err(ErrorForbidden("Invalid HMAC signature."));
        }
        trace!("🔐️ Signature on {} ✅️", req.path());
        req.set_payload(replay_body(body));
        Ok(())
    }
}

fn replay_body(body: web::Bytes) -> Payload {
    let (_, mut payload) = h1::Payload::create(true);
    payload.unread_data(body);
    Payload::from(payload)
}
