//! Stratus control service binary.
//!
//! Runs the control plane for cluster lifecycle orchestration.

use tracing::info;
use tracing_subscriber::EnvFilter;

use stratus_control::{ControlConfig, ControlService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("stratus_control=info".parse()?),
        )
        .init();

    info!("Stratus control service starting");

    // Load configuration
    let config = ControlConfig::load().unwrap_or_else(|e| {
        info!(error = %e, "failed to load config, using defaults");
        ControlConfig::default()
    });

    info!(
        listen_addr = %config.server.listen_addr,
        registry = %config.services.registry.url,
        provisioner = %config.services.provisioner.url,
        installer = %config.services.installer.url,
        bus = %config.bus.url,
        "configuration loaded"
    );

    ControlService::new(config).run().await?;
    Ok(())
}
