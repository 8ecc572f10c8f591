//! Hybrid RSA/AES body decryption

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::{ready, Ready};
use metrics_core::crypto::{hybrid_decrypt, RsaPrivateKey};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use super::{read_body, reject, set_body};
use crate::api::error::ApiError;

/// Decrypts non-empty request bodies when a private key is configured
#[derive(Clone, Default)]
pub struct Decrypt {
    private_key: Option<Arc<RsaPrivateKey>>,
}

impl Decrypt {
    pub fn new(private_key: Option<Arc<RsaPrivateKey>>) -> Self {
        Self { private_key }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Decrypt
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = DecryptMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(DecryptMiddleware {
            service: Rc::new(service),
            private_key: self.private_key.clone(),
        }))
    }
}

pub struct DecryptMiddleware<S> {
    service: Rc<S>,
    private_key: Option<Arc<RsaPrivateKey>>,
}

impl<S, B> Service<ServiceRequest> for DecryptMiddleware<S>
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
        let private_key = self.private_key.clone();

        Box::pin(async move {
            if let Some(key) = private_key {
                let body = read_body(&mut req).await?;
                if body.is_empty() {
                    set_body(&mut req, body);
                } else {
                    match hybrid_decrypt(&key, &body) {
                        Ok(plain) => set_body(&mut req, plain.into()),
                        Err(e) => return Ok(reject(req, ApiError::from(e))),
                    }
                }
            }
            service
                .call(req)
                .await
                .map(ServiceResponse::map_into_left_body)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{
        http::StatusCode,
        test::{call_service, init_service, read_body, TestRequest},
        web, App, HttpResponse,
    };
    use metrics_core::crypto::{generate_keypair, hybrid_encrypt};

    async fn echo(body: web::Bytes) -> HttpResponse {
        HttpResponse::Ok().body(body)
    }

    #[actix_web::test]
    async fn test_decrypts_body() {
        let (private, public) = generate_keypair(1024).unwrap();
        let app = init_service(
            App::new()
                .wrap(Decrypt::new(Some(Arc::new(private))))
                .route("/", web::post().to(echo)),
        )
        .await;

        let blob = hybrid_encrypt(&public, b"secret body").unwrap();
        let req = TestRequest::post().uri("/").set_payload(blob).to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(read_body(resp).await, web::Bytes::from_static(b"secret body"));
    }

    #[actix_web::test]
    async fn test_undecryptable_body_is_rejected() {
        let (private, _) = generate_keypair(1024).unwrap();
        let app = init_service(
            App::new()
                .wrap(Decrypt::new(Some(Arc::new(private))))
                .route("/", web::post().to(echo)),
        )
        .await;

        let req = TestRequest::post()
            .uri("/")
            .set_payload("plain text, not an envelope")
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_passthrough_without_key() {
        let app = init_service(
            App::new()
                .wrap(Decrypt::default())
                .route("/", web::post().to(echo)),
        )
        .await;

        let req = TestRequest::post().uri("/").set_payload("as is").to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(read_body(resp).await, web::Bytes::from_static(b"as is"));
    }
}
