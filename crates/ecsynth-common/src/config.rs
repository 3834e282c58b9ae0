//! Stack configuration model.
//!
//! Every field defaults to the literal parameters in [`crate::constants`];
//! a JSON or YAML file may override any subset of them.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, StackError};
use crate::types::{ImageRef, InstanceType, Ipv4Cidr, Port};

/// Root configuration for one synthesized stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    /// Name of the stack.
    pub stack_name: String,
    /// Virtual network parameters.
    pub network: NetworkConfig,
    /// Cluster capacity parameters.
    pub capacity: CapacityConfig,
    /// Application container parameters.
    pub app: AppContainerConfig,
    /// Security-monitoring sidecar parameters.
    pub monitor: MonitorConfig,
    /// Public listener parameters.
    pub listener: ListenerConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack_name: constants::DEFAULT_STACK_NAME.to_string(),
            network: NetworkConfig::default(),
            capacity: CapacityConfig::default(),
            app: AppContainerConfig::default(),
            monitor: MonitorConfig::default(),
            listener: ListenerConfig::default(),
        }
    }
}

impl StackConfig {
    /// Loads a configuration file, choosing YAML for `.yaml`/`.yml`
    /// extensions and JSON otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "loading stack configuration");
        let content = std::fs::read_to_string(path).map_err(|e| StackError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        let config: Self = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks values that the type system does not already enforce.
    ///
    /// # Errors
    ///
    /// Returns a [`StackError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.stack_name.is_empty() {
            return Err(StackError::config("stack_name must not be empty"));
        }
        if self.network.max_azs == 0 {
            return Err(StackError::config("network.max_azs must be at least 1"));
        }
        if self.capacity.min_capacity > self.capacity.max_capacity {
            return Err(StackError::config(format!(
                "capacity.min_capacity ({}) exceeds capacity.max_capacity ({})",
                self.capacity.min_capacity, self.capacity.max_capacity
            )));
        }
        if self.app.name == self.monitor.name {
            return Err(StackError::Duplicate {
                kind: "container name",
                id: self.app.name.clone(),
            });
        }
        if !self.listener.health_check.path.starts_with('/') {
            return Err(StackError::config(format!(
                "listener.health_check.path must start with '/': {}",
                self.listener.health_check.path
            )));
        }
        Ok(())
    }
}

/// Virtual network parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// Address block of the network.
    pub cidr: Ipv4Cidr,
    /// Number of availability zones to spread subnets over.
    pub max_azs: u8,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: constants::DEFAULT_VPC_CIDR,
            max_azs: constants::DEFAULT_MAX_AZS,
        }
    }
}

/// Cluster capacity parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapacityConfig {
    /// Instance type of the auto-scaling group.
    pub instance_type: InstanceType,
    /// SSH key pair installed on instances.
    pub key_name: Option<String>,
    /// Minimum number of instances.
    pub min_capacity: u32,
    /// Maximum number of instances.
    pub max_capacity: u32,
    /// Extra bootstrap commands run once per instance at launch.
    pub user_data: Vec<String>,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            instance_type: InstanceType::literal(
                constants::DEFAULT_INSTANCE_CLASS,
                constants::DEFAULT_INSTANCE_SIZE,
            ),
            key_name: Some(constants::DEFAULT_KEY_NAME.to_string()),
            min_capacity: 1,
            max_capacity: 1,
            user_data: constants::MONITOR_AGENT_INSTALL
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Where a container's log router delivers output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogRouting {
    /// Destination log group.
    pub log_group: String,
    /// Destination log stream.
    pub log_stream: String,
    /// Whether the log group is created on first write.
    #[serde(default = "default_true")]
    pub auto_create_group: bool,
}

const fn default_true() -> bool {
    true
}

impl LogRouting {
    /// Routing to `group`/`stream` with group auto-creation.
    #[must_use]
    pub fn new(log_group: impl Into<String>, log_stream: impl Into<String>) -> Self {
        Self {
            log_group: log_group.into(),
            log_stream: log_stream.into(),
            auto_create_group: true,
        }
    }
}

/// Application container parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppContainerConfig {
    /// Container name, referenced by the load-balancer target.
    pub name: String,
    /// Container image.
    pub image: ImageRef,
    /// Hard memory limit in MiB.
    pub memory_mib: u32,
    /// Port the application listens on.
    pub container_port: Port,
    /// Host port bound to `container_port`.
    pub host_port: Port,
    /// Log routing.
    pub logging: LogRouting,
}

impl Default for AppContainerConfig {
    fn default() -> Self {
        Self {
            name: constants::APP_CONTAINER_NAME.to_string(),
            image: ImageRef::from_registry(constants::APP_IMAGE),
            memory_mib: constants::CONTAINER_MEMORY_MIB,
            container_port: constants::APP_CONTAINER_PORT,
            host_port: constants::APP_HOST_PORT,
            logging: LogRouting::new(constants::APP_LOG_GROUP, constants::APP_LOG_STREAM),
        }
    }
}

/// A host path bound into the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostMountConfig {
    /// Volume name on the task definition.
    pub volume: String,
    /// Path on the container host.
    pub source_path: String,
    /// Path inside the sidecar.
    pub container_path: String,
    /// Whether the mount is read-only.
    #[serde(default = "default_true")]
    pub read_only: bool,
}

impl From<&constants::HostMount> for HostMountConfig {
    fn from(mount: &constants::HostMount) -> Self {
        Self {
            volume: mount.volume.to_string(),
            source_path: mount.source_path.to_string(),
            container_path: mount.container_path.to_string(),
            read_only: mount.read_only,
        }
    }
}

/// Security-monitoring sidecar parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Container name.
    pub name: String,
    /// Container image.
    pub image: ImageRef,
    /// CPU shares reserved for the sidecar.
    pub cpu_shares: u32,
    /// Hard memory limit in MiB.
    pub memory_mib: u32,
    /// Whether the sidecar runs privileged.
    pub privileged: bool,
    /// Command line of the monitoring agent.
    pub command: Vec<String>,
    /// Alert log routing.
    pub logging: LogRouting,
    /// Host paths exposed to the sidecar.
    pub host_mounts: Vec<HostMountConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            name: constants::MONITOR_CONTAINER_NAME.to_string(),
            image: ImageRef::from_registry(constants::MONITOR_IMAGE),
            cpu_shares: constants::MONITOR_CPU_SHARES,
            memory_mib: constants::CONTAINER_MEMORY_MIB,
            privileged: true,
            command: constants::MONITOR_COMMAND
                .iter()
                .map(ToString::to_string)
                .collect(),
            logging: LogRouting::new(constants::MONITOR_LOG_GROUP, constants::MONITOR_LOG_STREAM),
            host_mounts: constants::MONITOR_HOST_MOUNTS
                .iter()
                .map(HostMountConfig::from)
                .collect(),
        }
    }
}

/// Public listener parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenerConfig {
    /// Listener port.
    pub port: Port,
    /// Whether the listener accepts traffic from any address.
    pub open: bool,
    /// Target health check.
    pub health_check: HealthCheckConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: constants::LISTENER_PORT,
            open: true,
            health_check: HealthCheckConfig::default(),
        }
    }
}

/// Target health-check policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthCheckConfig {
    /// Time between probes.
    #[serde(with = "crate::duration::serde_text")]
    pub interval: Duration,
    /// Time before a probe is considered failed.
    #[serde(with = "crate::duration::serde_text")]
    pub timeout: Duration,
    /// Path probed on the target.
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(constants::HEALTH_CHECK_INTERVAL_SECS),
            timeout: Duration::from_secs(constants::HEALTH_CHECK_TIMEOUT_SECS),
            path: constants::HEALTH_CHECK_PATH.to_string(),
        }
    }
}
