//! Request logging middleware

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    Error, HttpMessage, HttpRequest,
};
use futures::future::{ready, Ready};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Per-request identifier stored in the request extensions
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// API logger middleware
#[derive(Default)]
pub struct ApiLogger;

impl ApiLogger {
    pub fn new() -> Self {
        Self
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = ApiLoggerMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiLoggerMiddleware {
            service: Rc::new(service),
        }))
    }
}

/// API logger middleware service
pub struct ApiLoggerMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ApiLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let started = Instant::now();
        let method = req.method().clone();
        let path = req.path().to_owned();
        let peer = req
            .peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let encoding = req
            .headers()
            .get(header::CONTENT_ENCODING)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("identity")
            .to_owned();

        let request_id = Uuid::new_v4().to_string();
        req.extensions_mut().insert(RequestId(request_id.clone()));

        let service = Rc::clone(&self.service);
        Box::pin(async move {
            debug!(
                "Request {} - {} {} - From {} - Encoding: {}",
                request_id, method, path, peer, encoding
            );

            let result = service.call(req).await;
            let elapsed = started.elapsed();

            match &result {
                Ok(res) if res.status().is_server_error() => warn!(
                    "Response {} - {} {} - Status {} - Completed in {:?}",
                    request_id,
                    method,
                    path,
                    res.status().as_u16(),
                    elapsed
                ),
                Ok(res) => info!(
                    "Response {} - {} {} - Status {} - Completed in {:?}",
                    request_id,
                    method,
                    path,
                    res.status().as_u16(),
                    elapsed
                ),
                Err(e) => error!(
                    "Response {} - {} {} - Error: {} - Completed in {:?}",
                    request_id, method, path, e, elapsed
                ),
            }

            result
        })
    }
}

/// Request ID extraction helper for handlers
pub fn get_request_id(req: &HttpRequest) -> String {
    req.extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Client IP as seen on the socket
pub fn client_ip(req: &HttpRequest) -> String {
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
