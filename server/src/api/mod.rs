//! HTTP API of the collector

mod error;
pub mod middleware;
pub mod routes;
mod server;

pub use error::{ApiError, ErrorResponse, Result};
pub use routes::AppState;
pub use server::{create_app, ApiServer, SecurityConfig};
