use clap::Parser;
use server::{ServerArgs, ServerConfig};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    let config = ServerConfig::load(&args)?;

    metrics_core::logging::init_logging(&config.log_level);
    tracing::info!(
        "metrics-server {} starting with {:?}",
        env!("CARGO_PKG_VERSION"),
        config.address
    );

    server::run(config).await
}
