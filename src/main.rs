//! Repo Agent - worker entry point
//!
//! Polls the job server until interrupted with Ctrl-C.

use repo_agent::{agent::Agent, config::Config, workspace};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repo_agent=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: agent_id={}, model={}",
        config.agent_id, config.llm_model
    );

    if config.bootstrap_repo {
        workspace::ensure_sample_repo(&config.repo_path).await?;
    }

    let agent = Agent::new(config)?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            signal.cancel();
        }
    });

    agent.run(shutdown).await;

    Ok(())
}
