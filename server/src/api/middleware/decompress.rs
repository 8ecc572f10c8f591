//! Gzip request body inflation

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    Error,
};
use futures::future::{ready, Ready};
use metrics_core::codec;
use metrics_core::protocol::GZIP_ENCODING;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use super::{read_body, reject, set_body, MAX_BODY_SIZE};
use crate::api::error::ApiError;

/// Inflates `Content-Encoding: gzip` bodies
///
/// The header is removed afterwards so extractors read the body as plain.
/// Bodies that inflate past the limit are answered with 400.
#[derive(Clone)]
pub struct Decompress {
    limit: usize,
}

impl Decompress {
    pub fn with_limit(limit: usize) -> Self {
        Self { limit }
    }
}

impl Default for Decompress {
    fn default() -> Self {
        Self::with_limit(MAX_BODY_SIZE)
    }
}

impl<S, B> Transform<S, ServiceRequest> for Decompress
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = DecompressMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(DecompressMiddleware {
            service: Rc::new(service),
            limit: self.limit,
        }))
    }
}

pub struct DecompressMiddleware<S> {
    service: Rc<S>,
    limit: usize,
}

fn is_gzip(req: &ServiceRequest) -> bool {
    req.headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .any(|enc| enc.trim().eq_ignore_ascii_case(GZIP_ENCODING))
        })
        .unwrap_or(false)
}

impl<S, B> Service<ServiceRequest> for DecompressMiddleware<S>
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
        let gzip = is_gzip(&req);
        let limit = self.limit;

        Box::pin(async move {
            if gzip {
                let body = read_body(&mut req).await?;
                let plain = if body.is_empty() {
                    body
                } else {
                    match codec::decompress_limited(&body, limit) {
                        Ok(plain) => plain.into(),
                        Err(e) => return Ok(reject(req, ApiError::from(e))),
                    }
                };
                req.headers_mut().remove(header::CONTENT_ENCODING);
                set_body(&mut req, plain);
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
        web, App, HttpRequest, HttpResponse,
    };

    async fn echo(req: HttpRequest, body: web::Bytes) -> HttpResponse {
        assert!(req.headers().get(header::CONTENT_ENCODING).is_none());
        HttpResponse::Ok().body(body)
    }

    #[actix_web::test]
    async fn test_inflates_gzip_body() {
        let app = init_service(
            App::new()
                .wrap(Decompress::default())
                .route("/", web::post().to(echo)),
        )
        .await;

        let req = TestRequest::post()
            .uri("/")
            .insert_header((header::CONTENT_ENCODING, "gzip"))
            .set_payload(codec::compress(b"inflated").unwrap())
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(read_body(resp).await, web::Bytes::from_static(b"inflated"));
    }

    #[actix_web::test]
    async fn test_malformed_gzip_is_rejected() {
        let app = init_service(
            App::new()
                .wrap(Decompress::default())
                .route("/", web::post().to(echo)),
        )
        .await;

        let req = TestRequest::post()
            .uri("/")
            .insert_header((header::CONTENT_ENCODING, "gzip"))
            .set_payload("this is not gzip")
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_oversized_inflation_is_rejected() {
        let app = init_service(
            App::new()
                .wrap(Decompress::with_limit(1024))
                .route("/", web::post().to(echo)),
        )
        .await;

        let req = TestRequest::post()
            .uri("/")
            .insert_header((header::CONTENT_ENCODING, "gzip"))
            .set_payload(codec::compress(&[0u8; 64 * 1024]).unwrap())
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_body_at_limit_passes() {
        let app = init_service(
            App::new()
                .wrap(Decompress::with_limit(1024))
                .route("/", web::post().to(echo)),
        )
        .await;

        let req = TestRequest::post()
            .uri("/")
            .insert_header((header::CONTENT_ENCODING, "gzip"))
            .set_payload(codec::compress(&[b'a'; 1024]).unwrap())
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(read_body(resp).await.len(), 1024);
    }
}
