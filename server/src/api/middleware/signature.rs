//! HMAC-SHA256 request signature check

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::{ready, Ready};
use metrics_core::crypto::verify;
use metrics_core::protocol::{HASH_HEADER, HASH_NONE};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use super::{read_body, reject, set_body};
use crate::api::error::ApiError;

/// Verifies the `HashSHA256` header over the body as it arrives here
///
/// Skipped when no key is configured, the header is absent or it carries
/// the literal `none`.
#[derive(Clone)]
pub struct VerifySignature {
    key: Arc<str>,
}

impl VerifySignature {
    pub fn new(key: &str) -> Self {
        Self { key: Arc::from(key) }
    }
}

impl<S, B> Transform<S, ServiceRequest> for VerifySignature
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = VerifySignatureMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(VerifySignatureMiddleware {
            service: Rc::new(service),
            key: Arc::clone(&self.key),
        }))
    }
}

pub struct VerifySignatureMiddleware<S> {
    service: Rc<S>,
    key: Arc<str>,
}

impl<S, B> Service<ServiceRequest> for VerifySignatureMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let key = Arc::clone(&self.key);
        // An empty header counts as unsigned. Undecodable bytes are kept so
        // they fail verification.
        let signature = req
            .headers()
            .get(HASH_HEADER)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).trim().to_owned())
            .filter(|sig| !sig.is_empty());

        Box::pin(async move {
            match signature {
                Some(sig) if !key.is_empty() && sig != HASH_NONE => {
                    let body = read_body(&mut req).await?;
                    if let Err(e) = verify(&body, &key, &sig) {
                        return Ok(reject(req, ApiError::from(e)));
                    }
                    set_body(&mut req, body);
                }
                _ => {}
            }
            service
                .call(req)
                .await
                .map(ServiceResponse::map_into_left_body)
        })
    }
}
