//! Application load balancer, listeners, and target groups.

use std::time::Duration;

use ecsynth_common::config::HealthCheckConfig;
use ecsynth_common::duration::{format_duration, whole_seconds};
use ecsynth_common::error::{Result, StackError};
use ecsynth_common::types::{LogicalId, Port};
use serde::Serialize;
use serde_json::{Value, json};

use super::security_group::{self, Peer, PortRange, SecurityGroup};
use super::service::{Ec2Service, EcsTarget};
use super::vpc::Vpc;
use crate::builder::StackBuilder;
use crate::intrinsic;
use crate::template::Resource;

/// Resource type of load balancers.
pub const LOAD_BALANCER_TYPE: &str = "AWS::ElasticLoadBalancingV2::LoadBalancer";

/// Resource type of listeners.
pub const LISTENER_TYPE: &str = "AWS::ElasticLoadBalancingV2::Listener";

/// Resource type of target groups.
pub const TARGET_GROUP_TYPE: &str = "AWS::ElasticLoadBalancingV2::TargetGroup";

const MIN_INTERVAL_SECS: u64 = 5;
const MAX_INTERVAL_SECS: u64 = 300;
const MIN_TIMEOUT_SECS: u64 = 2;
const MAX_TIMEOUT_SECS: u64 = 120;

/// Health-check policy of a target group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    interval_secs: u64,
    timeout_secs: u64,
    path: String,
}

impl HealthCheck {
    /// Creates a policy probing `path` every `interval`, failing a probe
    /// after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if either duration is fractional or out of range,
    /// the timeout is not shorter than the interval, or the path is not
    /// absolute.
    pub fn new(interval: Duration, timeout: Duration, path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let interval_secs = whole_seconds(interval)?;
        let timeout_secs = whole_seconds(timeout)?;
        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&interval_secs) {
            return Err(StackError::config(format!(
                "health check interval {} must be between {MIN_INTERVAL_SECS}s and {MAX_INTERVAL_SECS}s",
                format_duration(interval)
            )));
        }
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&timeout_secs) {
            return Err(StackError::config(format!(
                "health check timeout {} must be between {MIN_TIMEOUT_SECS}s and {MAX_TIMEOUT_SECS}s",
                format_duration(timeout)
            )));
        }
        if timeout_secs >= interval_secs {
            return Err(StackError::config(format!(
                "health check timeout {} must be shorter than interval {}",
                format_duration(timeout),
                format_duration(interval)
            )));
        }
        if !path.starts_with('/') {
            return Err(StackError::config(format!(
                "health check path must start with '/': {path}"
            )));
        }
        Ok(Self {
            interval_secs,
            timeout_secs,
            path,
        })
    }

    /// Probed path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl TryFrom<&HealthCheckConfig> for HealthCheck {
    type Error = StackError;

    fn try_from(config: &HealthCheckConfig) -> Result<Self> {
        Self::new(config.interval, config.timeout, config.path.clone())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct LoadBalancerAttribute {
    key: &'static str,
    value: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct LoadBalancerProps {
    load_balancer_attributes: [LoadBalancerAttribute; 1],
    scheme: &'static str,
    security_groups: [Value; 1],
    subnets: Vec<Value>,
    #[serde(rename = "Type")]
    load_balancer_type: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TargetGroupProps<'a> {
    health_check_interval_seconds: u64,
    health_check_path: &'a str,
    health_check_timeout_seconds: u64,
    port: Port,
    protocol: &'static str,
    target_type: &'static str,
    vpc_id: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ListenerPropsRendered {
    default_actions: [Value; 1],
    load_balancer_arn: Value,
    port: Port,
    protocol: &'static str,
}

/// A declared application load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationLoadBalancer {
    id: LogicalId,
    name: String,
    vpc_id: LogicalId,
    security_group: SecurityGroup,
}

impl ApplicationLoadBalancer {
    /// Declares a load balancer and its security group in `vpc`.
    ///
    /// Internet-facing balancers are placed in the public subnets and wait
    /// for their default routes; internal ones use the private subnets.
    ///
    /// # Errors
    ///
    /// Returns an error if a path is already taken.
    pub fn new(stack: &mut StackBuilder, name: &str, vpc: &Vpc, internet_facing: bool) -> Result<Self> {
        tracing::info!(load_balancer = name, internet_facing, "declaring load balancer");
        let description = format!("Automatically created Security Group for ELB {}{name}", stack.stack_name());
        let security_group = SecurityGroup::new(
            stack,
            &[name, "SecurityGroup", "Resource"],
            Some(&description),
            vpc.id(),
            false,
        )?;

        let subnets = if internet_facing {
            vpc.public_subnets()
        } else {
            vpc.private_subnets()
        };
        let mut resource = Resource::new(
            LOAD_BALANCER_TYPE,
            &LoadBalancerProps {
                load_balancer_attributes: [LoadBalancerAttribute {
                    key: "deletion_protection.enabled",
                    value: "false",
                }],
                scheme: if internet_facing { "internet-facing" } else { "internal" },
                security_groups: [security_group.group_id()],
                subnets: subnets.iter().map(|s| intrinsic::ref_to(&s.id)).collect(),
                load_balancer_type: "application",
            },
        )?;
        if internet_facing {
            for subnet in subnets {
                resource.add_dependency(subnet.default_route.clone());
            }
        }
        let id = stack.add_resource(&[name, "Resource"], resource)?;

        Ok(Self {
            id,
            name: name.to_string(),
            vpc_id: vpc.id().clone(),
            security_group,
        })
    }

    /// Logical id of the load balancer.
    #[must_use]
    pub const fn id(&self) -> &LogicalId {
        &self.id
    }

    /// `Fn::GetAtt` of the public DNS name.
    #[must_use]
    pub fn dns_name(&self) -> Value {
        intrinsic::get_att(&self.id, "DNSName")
    }

    /// Adds an HTTP listener, open to every IPv4 address when `props.open`.
    ///
    /// The listener's id is reserved until [`ApplicationListener::commit`].
    ///
    /// # Errors
    ///
    /// Returns an error if a path is already taken.
    pub fn add_listener(
        &self,
        stack: &mut StackBuilder,
        name: &str,
        props: ListenerProps,
    ) -> Result<ApplicationListener> {
        tracing::info!(
            load_balancer = %self.name,
            listener = name,
            port = %props.port,
            open = props.open,
            "declaring listener"
        );
        let id = stack.reserve(&[self.name.as_str(), name, "Resource"])?;
        if props.open {
            let rule = format!("from {}:{}", Peer::AnyIpv4.label(), props.port);
            let _ = security_group::allow_ingress(
                stack,
                &[self.name.as_str(), "SecurityGroup", rule.as_str()],
                &self.security_group,
                &Peer::AnyIpv4,
                PortRange::single(props.port),
                &format!("Allow from anyone on port {}", props.port),
            )?;
        }
        Ok(ApplicationListener {
            id,
            name: name.to_string(),
            load_balancer: self.clone(),
            port: props.port,
            target_groups: Vec::new(),
        })
    }
}

/// Parameters of [`ApplicationLoadBalancer::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerProps {
    /// Listener port.
    pub port: Port,
    /// Whether every IPv4 address may connect.
    pub open: bool,
}

/// Parameters of [`ApplicationListener::add_targets`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddTargetsProps {
    /// Port of the target group.
    pub port: Port,
    /// Service container receiving traffic.
    pub target: EcsTarget,
    /// Health-check policy.
    pub health_check: HealthCheck,
}

/// An open listener.
#[derive(Debug)]
pub struct ApplicationListener {
    id: LogicalId,
    name: String,
    load_balancer: ApplicationLoadBalancer,
    port: Port,
    target_groups: Vec<LogicalId>,
}

impl ApplicationListener {
    /// Logical id the listener is committed under.
    #[must_use]
    pub const fn id(&self) -> &LogicalId {
        &self.id
    }

    /// Forwards traffic to a service container through a new target group.
    ///
    /// Opens the target's host ports from the load balancer's security group
    /// to the instances' security group and binds the service to the group.
    ///
    /// # Errors
    ///
    /// Returns an error if the target belongs to another service, its
    /// cluster has no capacity, or a path is already taken.
    pub fn add_targets(
        &mut self,
        stack: &mut StackBuilder,
        name: &str,
        service: &mut Ec2Service,
        props: &AddTargetsProps,
    ) -> Result<LogicalId> {
        let target = &props.target;
        if !service.owns(target) {
            return Err(StackError::ForeignHandle {
                kind: "load balancer target",
                owner: "service",
            });
        }
        let instances = target
            .instance_security_group()
            .cloned()
            .ok_or_else(|| StackError::NotFound {
                kind: "cluster capacity",
                id: format!("instances running {}", target.container_name()),
            })?;
        let lb = self.load_balancer.name.as_str();
        let group_name = format!("{name}Group");

        let target_group = stack.add_resource(
            &[lb, self.name.as_str(), group_name.as_str(), "Resource"],
            Resource::new(
                TARGET_GROUP_TYPE,
                &TargetGroupProps {
                    health_check_interval_seconds: props.health_check.interval_secs,
                    health_check_path: &props.health_check.path,
                    health_check_timeout_seconds: props.health_check.timeout_secs,
                    port: props.port,
                    protocol: "HTTP",
                    target_type: "instance",
                    vpc_id: intrinsic::ref_to(&self.load_balancer.vpc_id),
                },
            )?,
        )?;

        let ports = target.host_ports();
        let lb_group = &self.load_balancer.security_group;
        let egress_rule = format!("to {instances}:{}", ports.label());
        let ingress_rule = format!("from {}:{}", lb_group.id(), ports.label());
        // Targets on the same instances and ports share one rule pair.
        let egress_path = [lb, "SecurityGroup", egress_rule.as_str()];
        if !stack.contains_path(&egress_path) {
            let _ = security_group::allow_egress(
                stack,
                &egress_path,
                lb_group,
                &instances,
                ports,
                "Load balancer to target",
            )?;
        }
        let ingress_path = [lb, "Instances", ingress_rule.as_str()];
        if !stack.contains_path(&ingress_path) {
            let _ = security_group::allow_ingress(
                stack,
                &ingress_path,
                &SecurityGroup::existing(instances),
                &Peer::Group(lb_group.id().clone()),
                ports,
                "Load balancer to target",
            )?;
        }

        service.attach_load_balancer(target, &target_group, &self.id)?;
        tracing::info!(
            listener = %self.name,
            target_group = %target_group,
            container = target.container_name(),
            container_port = %target.container_port(),
            health_check_path = props.health_check.path(),
            "added listener target"
        );
        self.target_groups.push(target_group.clone());
        Ok(target_group)
    }

    /// Renders the listener with a forward action to its target groups.
    ///
    /// # Errors
    ///
    /// Returns an error if no target was added.
    pub fn commit(self, stack: &mut StackBuilder) -> Result<LogicalId> {
        let action = match self.target_groups.as_slice() {
            [] => {
                return Err(StackError::config(format!(
                    "listener {}/{} has no targets",
                    self.load_balancer.name, self.name
                )));
            }
            [single] => json!({
                "TargetGroupArn": intrinsic::ref_to(single),
                "Type": "forward",
            }),
            groups => json!({
                "ForwardConfig": {
                    "TargetGroups": groups
                        .iter()
                        .map(|g| json!({"TargetGroupArn": intrinsic::ref_to(g), "Weight": 1}))
                        .collect::<Vec<_>>(),
                },
                "Type": "forward",
            }),
        };
        let props = ListenerPropsRendered {
            default_actions: [action],
            load_balancer_arn: intrinsic::ref_to(&self.load_balancer.id),
            port: self.port,
            protocol: "HTTP",
        };
        stack.commit_reserved(&self.id, Resource::new(LISTENER_TYPE, &props)?)?;
        Ok(self.id)
    }
}
