//! Configuration for stratus-control.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{ControlError, ControlResult};

/// Top-level configuration for the control service.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ControlConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Remote services the orchestrator drives.
    #[serde(default)]
    pub services: ServicesConfig,

    /// Event bus configuration.
    #[serde(default)]
    pub bus: BusConfig,

    /// Live cluster discovery configuration.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Bounds applied to remote calls.
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Operation monitor configuration.
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl ControlConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `control.toml` in the current directory (if present)
    /// 3. Environment variables with `STRATUS_CONTROL_` prefix
    pub fn load() -> ControlResult<Self> {
        Self::from_file("control.toml")
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> ControlResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("STRATUS_CONTROL_").split("__"))
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

const fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8860)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Address and client timeout of one remote service.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Base URL of the service's HTTP API.
    pub url: String,

    /// Transport-level request timeout in seconds.
    #[serde(default = "default_endpoint_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_endpoint_timeout_secs() -> u64 {
    150
}

impl EndpointConfig {
    fn local(port: u16) -> Self {
        Self {
            url: format!("http://localhost:{port}"),
            timeout_secs: default_endpoint_timeout_secs(),
        }
    }
}

/// Remote service endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    /// Cluster and node registry.
    #[serde(default = "default_registry")]
    pub registry: EndpointConfig,

    /// Platform installer.
    #[serde(default = "default_installer")]
    pub installer: EndpointConfig,

    /// Infrastructure provisioner, scaler and decommissioner.
    #[serde(default = "default_provisioner")]
    pub provisioner: EndpointConfig,

    /// Application inventory.
    #[serde(default = "default_inventory")]
    pub inventory: EndpointConfig,
}

fn default_registry() -> EndpointConfig {
    EndpointConfig::local(8800)
}

fn default_installer() -> EndpointConfig {
    EndpointConfig::local(8900)
}

fn default_provisioner() -> EndpointConfig {
    EndpointConfig::local(8930)
}

fn default_inventory() -> EndpointConfig {
    EndpointConfig::local(8910)
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            registry: default_registry(),
            installer: default_installer(),
            provisioner: default_provisioner(),
            inventory: default_inventory(),
        }
    }
}

/// Type of event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusType {
    /// NATS broker.
    #[default]
    Nats,

    /// In-process recorder for testing.
    Memory,
}

/// Event bus configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Type of bus to use.
    #[serde(default)]
    pub bus_type: BusType,

    /// Broker address.
    #[serde(default = "default_bus_url")]
    pub url: String,

    /// Subject for infrastructure state updates.
    #[serde(default = "default_events_subject")]
    pub events_subject: String,

    /// Subject for infrastructure operational commands.
    #[serde(default = "default_ops_subject")]
    pub ops_subject: String,
}

fn default_bus_url() -> String {
    "nats://localhost:4222".to_owned()
}

fn default_events_subject() -> String {
    "stratus.infrastructure.events".to_owned()
}

fn default_ops_subject() -> String {
    "stratus.infrastructure.ops".to_owned()
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bus_type: BusType::default(),
            url: default_bus_url(),
            events_subject: default_events_subject(),
            ops_subject: default_ops_subject(),
        }
    }
}

/// Live cluster discovery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Directory used to stage kubeconfig material.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Bound on one discovery pass in seconds.
    #[serde(default = "default_discovery_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir()
}

const fn default_discovery_timeout_secs() -> u64 {
    60
}

impl DiscoveryConfig {
    /// Discovery bound as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            timeout_secs: default_discovery_timeout_secs(),
        }
    }
}

/// Bounds applied to remote calls.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimeoutConfig {
    /// Registry reads/writes and event publication, in seconds.
    #[serde(default = "default_short_secs")]
    pub short_secs: u64,

    /// Calls that initiate a long-running operation, in seconds.
    #[serde(default = "default_long_secs")]
    pub long_secs: u64,
}

const fn default_short_secs() -> u64 {
    5
}

const fn default_long_secs() -> u64 {
    120
}

impl TimeoutConfig {
    /// Bound for registry and bus calls.
    #[must_use]
    pub const fn short(&self) -> Duration {
        Duration::from_secs(self.short_secs)
    }

    /// Bound for initiating calls.
    #[must_use]
    pub const fn long(&self) -> Duration {
        Duration::from_secs(self.long_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            short_secs: default_short_secs(),
            long_secs: default_long_secs(),
        }
    }
}

/// Operation monitor configuration.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MonitorConfig {
    /// Delay between status polls in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Longest a single operation is watched, in seconds.
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,

    /// Poll failures in a row after which the watch gives up.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Monitors allowed to poll at the same time.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Time given to running monitors at shutdown, in seconds.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

const fn default_poll_interval_ms() -> u64 {
    10_000
}

const fn default_max_duration_secs() -> u64 {
    3 * 60 * 60
}

const fn default_max_consecutive_failures() -> u32 {
    10
}

const fn default_max_concurrent() -> usize {
    64
}

const fn default_shutdown_grace_secs() -> u64 {
    30
}

impl MonitorConfig {
    /// Poll interval as a duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Maximum watch duration.
    #[must_use]
    pub const fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    /// Shutdown grace period.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_duration_secs: default_max_duration_secs(),
            max_consecutive_failures: default_max_consecutive_failures(),
            max_concurrent: default_max_concurrent(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}
