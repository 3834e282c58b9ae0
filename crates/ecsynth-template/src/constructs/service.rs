//! EC2-launched services.

use ecsynth_common::error::{Result, StackError};
use ecsynth_common::types::{LogicalId, Port};
use serde::Serialize;
use serde_json::Value;

use super::cluster::Cluster;
use super::security_group::PortRange;
use super::task_definition::{ContainerRef, TaskDefinition};
use crate::builder::StackBuilder;
use crate::intrinsic;
use crate::template::Resource;
use crate::validator::SERVICE_TYPE;

/// Seconds load-balancer health checks are ignored after a task starts.
pub const HEALTH_CHECK_GRACE_PERIOD_SECS: u32 = 60;

/// Upper bound on running tasks during a deployment, in percent.
pub const DEPLOYMENT_MAXIMUM_PERCENT: u32 = 200;

/// Lower bound on healthy tasks during a deployment, in percent.
pub const DEPLOYMENT_MINIMUM_HEALTHY_PERCENT: u32 = 50;

/// A container port of a service that a load balancer can route to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcsTarget {
    service: u32,
    container_name: String,
    container_port: Port,
    host_ports: PortRange,
    instance_security_group: Option<LogicalId>,
}

impl EcsTarget {
    /// Name of the target container.
    #[must_use]
    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Target container port.
    #[must_use]
    pub const fn container_port(&self) -> Port {
        self.container_port
    }

    /// Instance ports traffic arrives on.
    #[must_use]
    pub const fn host_ports(&self) -> PortRange {
        self.host_ports
    }

    /// Security group of the instances running the target.
    #[must_use]
    pub const fn instance_security_group(&self) -> Option<&LogicalId> {
        self.instance_security_group.as_ref()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct LoadBalancerBinding {
    container_name: String,
    container_port: Port,
    target_group_arn: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeploymentConfiguration {
    maximum_percent: u32,
    minimum_healthy_percent: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceProps {
    cluster: Value,
    deployment_configuration: DeploymentConfiguration,
    desired_count: u32,
    #[serde(rename = "EnableECSManagedTags")]
    enable_ecs_managed_tags: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    health_check_grace_period_seconds: Option<u32>,
    launch_type: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    load_balancers: Vec<LoadBalancerBinding>,
    scheduling_strategy: &'static str,
    task_definition: Value,
}

/// A service running a committed task definition on a cluster.
///
/// The service's logical id is reserved at creation so that listeners can
/// bind to it; [`Self::commit`] renders it.
#[derive(Debug)]
pub struct Ec2Service {
    id: LogicalId,
    name: String,
    token: u32,
    cluster: LogicalId,
    instance_security_group: Option<LogicalId>,
    task_definition: TaskDefinition,
    desired_count: u32,
    load_balancers: Vec<LoadBalancerBinding>,
    depends_on: Vec<LogicalId>,
}

impl Ec2Service {
    /// Declares a service running `task_definition` on `cluster`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is already taken.
    pub fn new(
        stack: &mut StackBuilder,
        name: &str,
        cluster: &Cluster,
        task_definition: &TaskDefinition,
    ) -> Result<Self> {
        tracing::info!(service = name, task_definition = %task_definition.id(), "declaring service");
        let token = stack.next_token();
        let id = stack.reserve(&[name, "Service"])?;
        Ok(Self {
            id,
            name: name.to_string(),
            token,
            cluster: cluster.id().clone(),
            instance_security_group: cluster.instance_security_group().cloned(),
            task_definition: task_definition.clone(),
            desired_count: 1,
            load_balancers: Vec::new(),
            depends_on: Vec::new(),
        })
    }

    /// Logical id the service is committed under.
    #[must_use]
    pub const fn id(&self) -> &LogicalId {
        &self.id
    }

    /// Sets the number of tasks kept running.
    pub const fn set_desired_count(&mut self, count: u32) {
        self.desired_count = count;
    }

    /// Exposes `container_port` of `container` as a load-balancer target.
    ///
    /// # Errors
    ///
    /// Returns an error if the container belongs to another task definition
    /// or the port is not mapped.
    pub fn load_balancer_target(&self, container: ContainerRef, container_port: Port) -> Result<EcsTarget> {
        let (container_name, mapping) = self.task_definition.mapped_port(container, container_port)?;
        Ok(EcsTarget {
            service: self.token,
            container_name: container_name.to_string(),
            container_port,
            host_ports: mapping.host_port.map_or_else(PortRange::ephemeral, PortRange::single),
            instance_security_group: self.instance_security_group.clone(),
        })
    }

    /// Whether `target` was issued by this service.
    pub(crate) const fn owns(&self, target: &EcsTarget) -> bool {
        target.service == self.token
    }

    /// Routes `target_group` to `target` and orders the service after the
    /// listener that owns the group.
    pub(crate) fn attach_load_balancer(
        &mut self,
        target: &EcsTarget,
        target_group: &LogicalId,
        listener: &LogicalId,
    ) -> Result<()> {
        if !self.owns(target) {
            return Err(StackError::ForeignHandle {
                kind: "load balancer target",
                owner: "service",
            });
        }
        self.load_balancers.push(LoadBalancerBinding {
            container_name: target.container_name.clone(),
            container_port: target.container_port,
            target_group_arn: intrinsic::ref_to(target_group),
        });
        if !self.depends_on.contains(listener) {
            self.depends_on.push(listener.clone());
        }
        Ok(())
    }

    /// Renders the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the reservation was lost.
    pub fn commit(self, stack: &mut StackBuilder) -> Result<LogicalId> {
        let load_balancers = self.load_balancers.len();
        let props = ServiceProps {
            cluster: intrinsic::ref_to(&self.cluster),
            deployment_configuration: DeploymentConfiguration {
                maximum_percent: DEPLOYMENT_MAXIMUM_PERCENT,
                minimum_healthy_percent: DEPLOYMENT_MINIMUM_HEALTHY_PERCENT,
            },
            desired_count: self.desired_count,
            enable_ecs_managed_tags: false,
            health_check_grace_period_seconds: (load_balancers > 0).then_some(HEALTH_CHECK_GRACE_PERIOD_SECS),
            launch_type: "EC2",
            load_balancers: self.load_balancers,
            scheduling_strategy: "REPLICA",
            task_definition: intrinsic::ref_to(self.task_definition.id()),
        };
        let mut resource = Resource::new(SERVICE_TYPE, &props)?;
        for listener in self.depends_on {
            resource.add_dependency(listener);
        }
        stack.commit_reserved(&self.id, resource)?;
        tracing::info!(
            service = %self.name,
            logical_id = %self.id,
            load_balancers,
            "committed service"
        );
        Ok(self.id)
    }
}
