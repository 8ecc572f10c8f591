//! API middleware components
//!
//! Incoming bodies pass through [`Decrypt`], [`VerifySignature`] and
//! [`Decompress`] in that order before reaching a handler. Each stage reads
//! the whole body, rewrites it and hands the result to the next stage, or
//! answers 400 itself.

pub mod decompress;
pub mod decrypt;
pub mod logging;
pub mod signature;

pub use decompress::Decompress;
pub use decrypt::Decrypt;
pub use logging::ApiLogger;
pub use signature::VerifySignature;

use actix_web::body::EitherBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header::{self, HeaderValue};
use actix_web::{Error, HttpMessage, ResponseError};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;

use super::error::ApiError;

/// Largest request body the middleware chain buffers
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Drain the request payload into memory
pub(crate) async fn read_body(req: &mut ServiceRequest) -> Result<Bytes, Error> {
    let mut payload = req.take_payload();
    let mut body = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > MAX_BODY_SIZE {
            return Err(ApiError::Payload(format!(
                "body exceeds {} bytes",
                MAX_BODY_SIZE
            ))
            .into());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

/// Put a (rewritten) body back on the request for the next service
pub(crate) fn set_body(req: &mut ServiceRequest, body: Bytes) {
    req.headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    let (_, mut payload) = actix_http::h1::Payload::create(true);
    payload.unread_data(body);
    req.set_payload(payload.into());
}

/// Answer the request with `err` without calling the inner service
pub(crate) fn reject<B>(req: ServiceRequest, err: ApiError) -> ServiceResponse<EitherBody<B>> {
    let response = err.error_response();
    req.into_response(response).map_into_right_body()
}
