//! API server implementation
//!
//! Assembles the middleware chain in front of the routes and runs the
//! actix-web HTTP server.

use actix_web::body::MessageBody;
use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{middleware, web, App, Error, HttpServer};
use metrics_core::crypto::RsaPrivateKey;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::error::ApiError;
use super::middleware::{ApiLogger, Decompress, Decrypt, VerifySignature, MAX_BODY_SIZE};
use super::routes::{self, AppState};

/// Keys protecting the request and response bodies
#[derive(Clone, Default)]
pub struct SecurityConfig {
    /// Shared HMAC key; empty disables signing and verification
    pub signing_key: String,
    /// Private key for hybrid decryption; `None` accepts plain bodies
    pub private_key: Option<Arc<RsaPrivateKey>>,
}

/// Build the application with the full middleware chain
///
/// Requests pass through, outermost first: response compression, request
/// logging, path normalisation, decryption, signature check, decompression.
pub fn create_app(
    state: web::Data<AppState>,
    security: SecurityConfig,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = Error,
        InitError = (),
    >,
> {
    let json_config = web::JsonConfig::default()
        .limit(MAX_BODY_SIZE)
        .content_type_required(false)
        .error_handler(|err, _req| ApiError::Payload(err.to_string()).into());

    App::new()
        .app_data(state)
        .app_data(json_config)
        .wrap(Decompress::default())
        .wrap(VerifySignature::new(&security.signing_key))
        .wrap(Decrypt::new(security.private_key))
        .wrap(middleware::NormalizePath::trim())
        .wrap(ApiLogger::new())
        .wrap(middleware::Compress::default())
        .configure(routes::configure)
}

/// API server
pub struct ApiServer {
    address: String,
    state: web::Data<AppState>,
    security: SecurityConfig,
    shutdown_timeout: Duration,
}

impl ApiServer {
    pub fn new(address: &str, state: AppState, security: SecurityConfig) -> Self {
        Self {
            address: address.to_string(),
            state: web::Data::new(state),
            security,
            shutdown_timeout: Duration::from_secs(30),
        }
    }

    /// Bound for draining in-flight requests on shutdown
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Bind and start the server
    ///
    /// Signal handling is left to the caller so that shutdown can be ordered
    /// around the HTTP drain.
    pub fn start(self) -> std::io::Result<Server> {
        let state = self.state.clone();
        let security = self.security.clone();

        info!("Starting API server on {}", self.address);
        if security.private_key.is_some() {
            info!("Request decryption is ENABLED");
        }
        if security.signing_key.is_empty() {
            info!("Request signing is DISABLED");
        }

        let server = HttpServer::new(move || create_app(state.clone(), security.clone()))
            .disable_signals()
            .shutdown_timeout(self.shutdown_timeout.as_secs())
            .bind(&self.address)?
            .run();

        info!("API server started on {}", self.address);
        Ok(server)
    }
}
