//! The ECS service behind an application load balancer.
//!
//! Declares, in order: the network, the cluster and its capacity, the task
//! definition with the application container and the privileged monitoring
//! sidecar, the host volumes the sidecar observes, the service, and the
//! public load balancer routing to the application container.

use ecsynth_common::config::{AppContainerConfig, MonitorConfig, StackConfig};
use ecsynth_common::error::Result;

use crate::builder::StackBuilder;
use crate::constructs::{
    AddTargetsProps, ApplicationLoadBalancer, CapacityOptions, Cluster, ContainerOptions, ContainerRef,
    Ec2Service, Ec2TaskDefinition, HealthCheck, ListenerProps, LogDriver, MountPoint, PortMapping, Volume,
    Vpc, VpcProps,
};
use crate::template::{Output, Template};

/// Construct name of the network.
pub const VPC_NAME: &str = "MyVpc";
/// Construct name of the cluster.
pub const CLUSTER_NAME: &str = "Ec2Cluster";
/// Construct name of the cluster capacity.
pub const CAPACITY_NAME: &str = "DefaultAutoScalingGroup";
/// Construct name of the task definition.
pub const TASK_DEFINITION_NAME: &str = "TDF";
/// Construct name of the service.
pub const SERVICE_NAME: &str = "Ec2Service";
/// Construct name of the load balancer.
pub const LOAD_BALANCER_NAME: &str = "LB";
/// Construct name of the public listener.
pub const LISTENER_NAME: &str = "PublicListener";
/// Construct name of the listener target.
pub const TARGET_NAME: &str = "ECS";
/// Output exporting the load balancer DNS name.
pub const DNS_OUTPUT: &str = "LoadBalancerDNS";

const DESCRIPTION: &str = "ECS service behind an application load balancer with a security-monitoring sidecar";

/// Synthesizes the template described by `config`.
///
/// # Errors
///
/// Returns an error if any declaration is rejected or the finished template
/// fails validation.
pub fn synthesize(config: &StackConfig) -> Result<Template> {
    tracing::info!(stack = %config.stack_name, "synthesizing stack");
    let mut stack = StackBuilder::new(&config.stack_name).with_description(DESCRIPTION);

    let vpc = Vpc::new(
        &mut stack,
        VPC_NAME,
        VpcProps {
            cidr: config.network.cidr,
            max_azs: config.network.max_azs,
        },
    )?;

    let mut cluster = Cluster::new(&mut stack, CLUSTER_NAME, &vpc)?;
    cluster.add_capacity(&mut stack, CAPACITY_NAME, &CapacityOptions::from(&config.capacity))?;

    let mut task_definition = Ec2TaskDefinition::new(&mut stack, TASK_DEFINITION_NAME)?;
    let app = add_app_container(&mut task_definition, &config.app)?;
    add_monitor_container(&mut task_definition, &config.monitor)?;
    let task_definition = task_definition.commit(&mut stack)?;

    let mut service = Ec2Service::new(&mut stack, SERVICE_NAME, &cluster, &task_definition)?;

    let load_balancer = ApplicationLoadBalancer::new(&mut stack, LOAD_BALANCER_NAME, &vpc, true)?;
    let mut listener = load_balancer.add_listener(
        &mut stack,
        LISTENER_NAME,
        ListenerProps {
            port: config.listener.port,
            open: config.listener.open,
        },
    )?;
    let target = service.load_balancer_target(app, config.app.container_port)?;
    let _ = listener.add_targets(
        &mut stack,
        TARGET_NAME,
        &mut service,
        &AddTargetsProps {
            port: config.app.container_port,
            target,
            health_check: HealthCheck::try_from(&config.listener.health_check)?,
        },
    )?;
    let _ = listener.commit(&mut stack)?;
    let _ = service.commit(&mut stack)?;

    let _ = stack.add_output(
        DNS_OUTPUT,
        Output {
            value: load_balancer.dns_name(),
            description: Some("Public DNS name of the load balancer".to_string()),
        },
    )?;

    stack.build()
}

fn add_app_container(task_definition: &mut Ec2TaskDefinition, app: &AppContainerConfig) -> Result<ContainerRef> {
    let mut options = ContainerOptions::new(app.image.clone());
    options.memory_mib = Some(app.memory_mib);
    options.logging = Some(LogDriver::firelens(&app.logging));
    let container = task_definition.add_container(&app.name, options)?;
    task_definition.add_port_mappings(container, [PortMapping::tcp(app.container_port, Some(app.host_port))])?;
    Ok(container)
}

fn add_monitor_container(task_definition: &mut Ec2TaskDefinition, monitor: &MonitorConfig) -> Result<()> {
    let mut options = ContainerOptions::new(monitor.image.clone());
    options.cpu = Some(monitor.cpu_shares);
    options.memory_mib = Some(monitor.memory_mib);
    options.privileged = monitor.privileged;
    options.command.clone_from(&monitor.command);
    options.logging = Some(LogDriver::firelens(&monitor.logging));
    let container = task_definition.add_container(&monitor.name, options)?;

    let mut mounts = Vec::with_capacity(monitor.host_mounts.len());
    for mount in &monitor.host_mounts {
        let volume = task_definition.add_volume(Volume::host(&mount.volume, &mount.source_path))?;
        mounts.push(if mount.read_only {
            MountPoint::read_only(volume, &mount.container_path)
        } else {
            MountPoint::read_write(volume, &mount.container_path)
        });
    }
    task_definition.add_mount_points(container, mounts)
}
