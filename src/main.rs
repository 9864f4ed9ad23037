//! marco-compose agent entry point.

use log::{error, info};
use tokio::signal;

mod agent;
mod backends;
mod config;
mod marco;
mod runtime;
mod types;

use agent::Agent;
use config::Config;
use marco::HttpPublisher;
use runtime::DockerRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting marco-compose with config: {:?}", cfg);
    let discovery = cfg.discovery()?;
    let interval = cfg.interval()?;

    // Container Runtime (Docker)
    let runtime = DockerRuntime::connect(&cfg.endpoint)?;

    // Marco backend
    let publisher = HttpPublisher::new(cfg.marco.clone());

    let agent = Agent::new(runtime, publisher, discovery);
    agent
        .run(interval, async {
            match signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, shutting down..."),
                Err(err) => {
                    error!("Unable to listen for shutdown signal: {}", err);
                    std::future::pending::<()>().await;
                }
            }
        })
        .await;

    info!("Shutdown complete.");
    Ok(())
}
