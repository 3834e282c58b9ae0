//! Literal parameters of the deployment and system-wide names.

use std::net::Ipv4Addr;

use crate::types::{Ipv4Cidr, Port};

/// Binary name for the CLI.
pub const BIN_NAME: &str = "ecsynth";

/// Default name of the synthesized stack.
pub const DEFAULT_STACK_NAME: &str = "EcsServiceWithAlbStack";

/// Address block of the virtual network.
pub const DEFAULT_VPC_CIDR: Ipv4Cidr = Ipv4Cidr::masked(Ipv4Addr::new(10, 101, 0, 0), 16);

/// Number of availability zones the network spans.
pub const DEFAULT_MAX_AZS: u8 = 2;

/// Instance class backing the cluster capacity.
pub const DEFAULT_INSTANCE_CLASS: &str = "t3a";

/// Instance size backing the cluster capacity.
pub const DEFAULT_INSTANCE_SIZE: &str = "large";

/// SSH key pair name installed on cluster instances.
pub const DEFAULT_KEY_NAME: &str = "rajdast-ohio.pem";

/// Public SSM parameter resolving the current ECS-optimized AMI.
pub const ECS_OPTIMIZED_AMI_PARAMETER: &str =
    "/aws/service/ecs/optimized-ami/amazon-linux-2/recommended/image_id";

/// Application container name.
pub const APP_CONTAINER_NAME: &str = "web2";

/// Application container image.
pub const APP_IMAGE: &str = "amazon/amazon-ecs-sample";

/// Log group receiving application output.
pub const APP_LOG_GROUP: &str = "plasmaglass";

/// Log stream receiving application output.
pub const APP_LOG_STREAM: &str = "appstream";

/// Port the application listens on inside its container.
pub const APP_CONTAINER_PORT: Port = Port::HTTP;

/// Host port the application port is bound to.
pub const APP_HOST_PORT: Port = Port::HTTP_ALT;

/// Memory limit shared by both containers, in MiB.
pub const CONTAINER_MEMORY_MIB: u32 = 512;

/// Security-monitoring sidecar container name.
pub const MONITOR_CONTAINER_NAME: &str = "idsContainer";

/// Security-monitoring sidecar image.
pub const MONITOR_IMAGE: &str = "falcosecurity/falco:0.17.1";

/// CPU shares reserved for the sidecar.
pub const MONITOR_CPU_SHARES: u32 = 10;

/// Sidecar entrypoint enabling JSON-formatted alerts.
pub const MONITOR_COMMAND: [&str; 4] = ["/usr/bin/falco", "-pc", "-o", "json_output=true"];

/// Log group receiving sidecar alerts.
pub const MONITOR_LOG_GROUP: &str = "falco";

/// Log stream receiving sidecar alerts.
pub const MONITOR_LOG_STREAM: &str = "alerts";

/// Instance bootstrap commands installing the kernel monitoring agent.
pub const MONITOR_AGENT_INSTALL: [&str; 4] = [
    "rpm --import https://falco.org/repo/falcosecurity-3672BA8F.asc",
    "curl -s -o /etc/yum.repos.d/falcosecurity.repo https://falco.org/repo/falcosecurity-rpm.repo",
    "yum -y install kernel-devel-$(uname -r)",
    "yum -y install falco",
];

/// A host path exposed to the sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostMount {
    /// Volume name on the task definition.
    pub volume: &'static str,
    /// Path on the container host.
    pub source_path: &'static str,
    /// Path inside the sidecar.
    pub container_path: &'static str,
    /// Whether the sidecar may only read the mount.
    pub read_only: bool,
}

/// Host paths the sidecar observes. Only the Docker socket is writable.
pub const MONITOR_HOST_MOUNTS: [HostMount; 6] = [
    HostMount {
        volume: "docker-socket",
        source_path: "/var/run/docker.sock",
        container_path: "/host/var/run/docker.sock",
        read_only: false,
    },
    HostMount {
        volume: "dev-fs",
        source_path: "/dev",
        container_path: "/host/dev",
        read_only: true,
    },
    HostMount {
        volume: "proc-fs",
        source_path: "/proc",
        container_path: "/host/proc",
        read_only: true,
    },
    HostMount {
        volume: "boot-fs",
        source_path: "/boot",
        container_path: "/host/boot",
        read_only: true,
    },
    HostMount {
        volume: "lib-modules",
        source_path: "/lib/modules",
        container_path: "/host/lib/modules",
        read_only: true,
    },
    HostMount {
        volume: "usr-fs",
        source_path: "/usr",
        container_path: "/host/usr",
        read_only: true,
    },
];

/// Public listener port.
pub const LISTENER_PORT: Port = Port::HTTP;

/// Seconds between target health checks.
pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 60;

/// Seconds before a health check is considered failed.
pub const HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

/// Path probed by target health checks.
pub const HEALTH_CHECK_PATH: &str = "/health";
