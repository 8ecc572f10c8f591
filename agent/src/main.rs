use agent::{Agent, AgentArgs, AgentConfig};
use clap::Parser;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = AgentArgs::parse();
    let config = AgentConfig::load(&args)?;

    metrics_core::logging::init_logging(&config.log_level);
    tracing::info!(
        "metrics-agent {} reporting to {}",
        env!("CARGO_PKG_VERSION"),
        config.address
    );

    let agent = Agent::new(config)?;
    let cancel = CancellationToken::new();
    agent::cancel_on_signal(cancel.clone());

    agent.run(cancel).await;
    Ok(())
}
