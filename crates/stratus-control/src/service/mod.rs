//! Service lifecycle management.
//!
//! Provides the main service runner with signal handling and graceful shutdown.

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api;
use crate::bus::{EventBus, MemoryEventBus, NatsEventBus};
use crate::cluster::{ClusterManager, Collaborators};
use crate::config::{BusType, ControlConfig};
use crate::discovery::KubeDiscovery;
use crate::error::{ControlError, ControlResult};
use crate::installer::HttpInstaller;
use crate::inventory::HttpInventory;
use crate::monitor::{MonitorSettings, MonitorSupervisor};
use crate::provisioner::HttpProvisioner;
use crate::registry::HttpRegistry;

/// The control service.
///
/// Manages the lifecycle of the control plane, including:
/// - Collaborator clients and the event bus connection
/// - Operation monitors
/// - HTTP API server
/// - Signal handling and graceful shutdown
pub struct ControlService {
    config: ControlConfig,
    cancel: CancellationToken,
}

impl ControlService {
    /// Create a new control service with the given configuration.
    #[must_use]
    pub fn new(config: ControlConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Run the control service.
    ///
    /// This will:
    /// 1. Create the collaborator clients and connect the event bus
    /// 2. Create the lifecycle orchestrator
    /// 3. Start the HTTP API server
    /// 4. Wait for shutdown signal, then stop the monitors
    pub async fn run(&self) -> ControlResult<()> {
        let deps = self.create_collaborators().await?;

        let supervisor = MonitorSupervisor::new(&self.config.monitor);
        let manager = ClusterManager::new(
            deps,
            supervisor.clone(),
            self.config.timeouts,
            MonitorSettings::from(&self.config.monitor),
        );
        info!(
            max_concurrent = self.config.monitor.max_concurrent,
            "cluster manager initialised"
        );

        let app = api::router(api::AppState { manager });

        let listener = tokio::net::TcpListener::bind(self.config.server.listen_addr)
            .await
            .map_err(|e| ControlError::Config(format!("failed to bind TCP: {e}")))?;
        info!(
            listen_addr = %self.config.server.listen_addr,
            "control service listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(self.cancel.clone()))
            .await
            .map_err(|e| ControlError::Config(format!("server error: {e}")))?;

        supervisor.shutdown(self.config.monitor.shutdown_grace()).await;
        info!("control service shutdown complete");
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn create_collaborators(&self) -> ControlResult<Collaborators> {
        let services = &self.config.services;
        let registry = Arc::new(HttpRegistry::new(&services.registry)?);
        info!(url = %services.registry.url, "registry client configured");

        Ok(Collaborators {
            clusters: registry.clone(),
            nodes: registry,
            installer: Arc::new(HttpInstaller::new(&services.installer)?),
            provisioner: Arc::new(HttpProvisioner::new(&services.provisioner)?),
            inventory: Arc::new(HttpInventory::new(&services.inventory)?),
            bus: self.create_bus().await?,
            discovery: Arc::new(KubeDiscovery::new(&self.config.discovery)),
        })
    }

    async fn create_bus(&self) -> ControlResult<Arc<dyn EventBus>> {
        let bus: Arc<dyn EventBus> = match self.config.bus.bus_type {
            BusType::Nats => Arc::new(NatsEventBus::connect(&self.config.bus).await?),
            BusType::Memory => Arc::new(MemoryEventBus::new()),
        };
        info!(bus_type = ?self.config.bus.bus_type, "event bus configured");
        Ok(bus)
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
        () = cancel.cancelled() => {
            info!("shutdown requested");
        }
    }
}
