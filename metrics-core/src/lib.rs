// Metrics pipeline core library

// Enforce panic-free code in production
#![cfg_attr(not(test), warn(clippy::unwrap_used))]
#![cfg_attr(not(test), warn(clippy::expect_used))]
#![cfg_attr(not(test), warn(clippy::panic))]
// Test-specific allows
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod codec;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod types;

pub use crate::error::{CodecError, CryptoError, ValidationError};
pub use crate::types::{MetricBatch, MetricKind, MetricRecord};
