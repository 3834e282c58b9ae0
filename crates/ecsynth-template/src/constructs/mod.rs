//! Typed constructs that render template resources.
//!
//! Each construct registers its resources with a
//! [`StackBuilder`](crate::builder::StackBuilder) and hands out typed handles
//! ([`ContainerRef`], [`VolumeRef`], [`EcsTarget`]) in place of string-keyed
//! cross references. A handle used with a construct other than the one that
//! issued it is rejected with [`ForeignHandle`](ecsynth_common::error::StackError::ForeignHandle).

pub mod cluster;
pub mod iam;
pub mod load_balancer;
pub mod security_group;
pub mod service;
pub mod task_definition;
pub mod vpc;

use serde::Serialize;

pub use cluster::{CapacityOptions, Cluster};
pub use load_balancer::{AddTargetsProps, ApplicationListener, ApplicationLoadBalancer, HealthCheck, ListenerProps};
pub use service::{Ec2Service, EcsTarget};
pub use task_definition::{
    ContainerOptions, ContainerRef, Ec2TaskDefinition, LogDriver, MountPoint, PortMapping, Protocol,
    TaskDefinition, Volume, VolumeRef,
};
pub use vpc::{Subnet, Vpc, VpcProps};

/// A `Key`/`Value` resource tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// The `Name` tag shown by the provider console, set to the construct path.
    #[must_use]
    pub fn name(stack_name: &str, path: &[&str]) -> Self {
        Self {
            key: "Name".to_string(),
            value: display_path(stack_name, path),
        }
    }
}

/// `Stack/Scope/Child` rendering of a construct path.
#[must_use]
pub fn display_path(stack_name: &str, path: &[&str]) -> String {
    std::iter::once(stack_name)
        .chain(path.iter().copied())
        .collect::<Vec<_>>()
        .join("/")
}
