// Metrics agent

// Enforce panic-free code in production
#![cfg_attr(not(test), warn(clippy::unwrap_used))]
#![cfg_attr(not(test), warn(clippy::expect_used))]
#![cfg_attr(not(test), warn(clippy::panic))]
// Test-specific allows
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod collector;
pub mod config;
pub mod encoder;
pub mod error;
pub mod retry;
pub mod scheduler;
pub mod snapshot;
pub mod transport;

pub use crate::config::{AgentArgs, AgentConfig};
pub use crate::error::{AgentError, Result};
pub use crate::scheduler::{Agent, Reporter};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancel `token` on Ctrl+C or, on unix, SIGTERM
pub fn cancel_on_signal(token: CancellationToken) {
    use tokio::signal;

    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            info!("Ctrl+C received, stopping agent");
            ctrl_c_token.cancel();
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    if sigterm.recv().await.is_some() {
                        info!("SIGTERM received, stopping agent");
                        token.cancel();
                    }
                }
                Err(e) => error!("Failed to register SIGTERM handler: {}", e),
            }
        });
    }
}
