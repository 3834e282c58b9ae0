//! EC2 task definitions, their containers, and host volumes.
//!
//! [`Ec2TaskDefinition`] is an open declaration: containers, port mappings,
//! volumes, and mount points are added through it and referenced by the
//! handles it returns. [`Ec2TaskDefinition::commit`] renders the resource and
//! yields a closed [`TaskDefinition`] that services can run.

use ecsynth_common::config::LogRouting;
use ecsynth_common::error::{Result, StackError};
use ecsynth_common::types::{ImageRef, LogicalId, Port};
use serde::Serialize;
use serde_json::Value;

use super::iam::{self, Role, Statement};
use crate::builder::StackBuilder;
use crate::intrinsic;
use crate::template::Resource;

/// Actions the task role needs so FireLens can deliver to the log sink.
const LOG_DELIVERY_ACTIONS: [&str; 4] = [
    "logs:CreateLogGroup",
    "logs:CreateLogStream",
    "logs:DescribeLogStreams",
    "logs:PutLogEvents",
];

/// Handle to a container of one task definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerRef {
    owner: u32,
    index: usize,
}

/// Handle to a volume of one task definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeRef {
    owner: u32,
    index: usize,
}

/// Transport protocol of a port mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP.
    #[default]
    Tcp,
    /// UDP.
    Udp,
}

/// A container port published on the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortMapping {
    /// Port inside the container.
    pub container_port: Port,
    /// Port on the instance; dynamic when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_port: Option<Port>,
    /// Transport protocol.
    pub protocol: Protocol,
}

impl PortMapping {
    /// A TCP mapping of `container_port` to `host_port`.
    #[must_use]
    pub const fn tcp(container_port: Port, host_port: Option<Port>) -> Self {
        Self {
            container_port,
            host_port,
            protocol: Protocol::Tcp,
        }
    }
}

/// Log driver of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDriver {
    /// FireLens routing to a CloudWatch log group and stream.
    FireLens(LogRouting),
}

impl LogDriver {
    /// FireLens routing to `routing`.
    #[must_use]
    pub fn firelens(routing: &LogRouting) -> Self {
        Self::FireLens(routing.clone())
    }

    fn render(&self) -> Value {
        match self {
            Self::FireLens(routing) => serde_json::json!({
                "LogDriver": "awsfirelens",
                "Options": {
                    "Name": "cloudwatch",
                    "region": intrinsic::region(),
                    "log_group_name": routing.log_group,
                    "log_stream_name": routing.log_stream,
                    "auto_create_group": routing.auto_create_group.to_string(),
                },
            }),
        }
    }
}

/// Settings of a container added with [`Ec2TaskDefinition::add_container`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerOptions {
    /// Container image.
    pub image: ImageRef,
    /// Hard memory limit in MiB.
    pub memory_mib: Option<u32>,
    /// Reserved CPU shares.
    pub cpu: Option<u32>,
    /// Whether the container runs privileged.
    pub privileged: bool,
    /// Command overriding the image entry point arguments.
    pub command: Vec<String>,
    /// Whether the task stops when this container stops.
    pub essential: bool,
    /// Log driver.
    pub logging: Option<LogDriver>,
}

impl ContainerOptions {
    /// An essential, unprivileged container running `image` with defaults.
    #[must_use]
    pub const fn new(image: ImageRef) -> Self {
        Self {
            image,
            memory_mib: None,
            cpu: None,
            privileged: false,
            command: Vec::new(),
            essential: true,
            logging: None,
        }
    }
}

/// A named volume of a task definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    /// Volume name, unique within the task definition.
    pub name: String,
    /// Host path backing the volume.
    pub host_source_path: Option<String>,
}

impl Volume {
    /// A bind mount of the host path `source_path`.
    #[must_use]
    pub fn host(name: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host_source_path: Some(source_path.into()),
        }
    }
}

/// A volume mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    /// Mounted volume.
    pub volume: VolumeRef,
    /// Path inside the container.
    pub container_path: String,
    /// Whether the container may only read the volume.
    pub read_only: bool,
}

impl MountPoint {
    /// A read-only mount of `volume` at `container_path`.
    #[must_use]
    pub fn read_only(volume: VolumeRef, container_path: impl Into<String>) -> Self {
        Self {
            volume,
            container_path: container_path.into(),
            read_only: true,
        }
    }

    /// A writable mount of `volume` at `container_path`.
    #[must_use]
    pub fn read_write(volume: VolumeRef, container_path: impl Into<String>) -> Self {
        Self {
            volume,
            container_path: container_path.into(),
            read_only: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Container {
    name: String,
    options: ContainerOptions,
    port_mappings: Vec<PortMapping>,
    mount_points: Vec<MountPoint>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_empty_slice<T>(items: &&[T]) -> bool {
    items.is_empty()
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerDefinitionProps<'a> {
    #[serde(skip_serializing_if = "is_empty_slice")]
    command: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    cpu: Option<u32>,
    essential: bool,
    image: &'a ImageRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_configuration: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    mount_points: Vec<MountPointProps<'a>>,
    name: &'a str,
    #[serde(skip_serializing_if = "is_empty_slice")]
    port_mappings: &'a [PortMapping],
    privileged: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct MountPointProps<'a> {
    container_path: &'a str,
    read_only: bool,
    source_volume: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct VolumeProps<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<HostProps<'a>>,
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct HostProps<'a> {
    source_path: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TaskDefinitionProps<'a> {
    container_definitions: Vec<ContainerDefinitionProps<'a>>,
    family: String,
    network_mode: &'static str,
    requires_compatibilities: [&'static str; 1],
    task_role_arn: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    volumes: Vec<VolumeProps<'a>>,
}

/// An open EC2 task definition.
#[derive(Debug)]
pub struct Ec2TaskDefinition {
    id: LogicalId,
    name: String,
    token: u32,
    task_role: Role,
    containers: Vec<Container>,
    volumes: Vec<Volume>,
}

impl Ec2TaskDefinition {
    /// Declares a task definition named `name` and its task role.
    ///
    /// The definition's logical id is reserved until [`Self::commit`].
    ///
    /// # Errors
    ///
    /// Returns an error if a path is already taken.
    pub fn new(stack: &mut StackBuilder, name: &str) -> Result<Self> {
        tracing::info!(task_definition = name, "declaring task definition");
        let token = stack.next_token();
        let id = stack.reserve(&[name, "Resource"])?;
        let task_role = Role::new(stack, &[name, "TaskRole", "Resource"], iam::ECS_TASKS_PRINCIPAL)?;
        Ok(Self {
            id,
            name: name.to_string(),
            token,
            task_role,
            containers: Vec::new(),
            volumes: Vec::new(),
        })
    }

    /// Logical id the definition is committed under.
    #[must_use]
    pub const fn id(&self) -> &LogicalId {
        &self.id
    }

    /// Adds a container.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Duplicate`] if the name is taken.
    pub fn add_container(&mut self, name: &str, options: ContainerOptions) -> Result<ContainerRef> {
        if self.containers.iter().any(|c| c.name == name) {
            return Err(StackError::Duplicate {
                kind: "container",
                id: format!("{}/{name}", self.name),
            });
        }
        tracing::debug!(
            task_definition = %self.name,
            container = name,
            image = %options.image,
            privileged = options.privileged,
            "added container"
        );
        self.containers.push(Container {
            name: name.to_string(),
            options,
            port_mappings: Vec::new(),
            mount_points: Vec::new(),
        });
        Ok(ContainerRef {
            owner: self.token,
            index: self.containers.len() - 1,
        })
    }

    /// Adds a host volume.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Duplicate`] if the name is taken.
    pub fn add_volume(&mut self, volume: Volume) -> Result<VolumeRef> {
        if self.volumes.iter().any(|v| v.name == volume.name) {
            return Err(StackError::Duplicate {
                kind: "volume",
                id: format!("{}/{}", self.name, volume.name),
            });
        }
        tracing::debug!(task_definition = %self.name, volume = %volume.name, "added volume");
        self.volumes.push(volume);
        Ok(VolumeRef {
            owner: self.token,
            index: self.volumes.len() - 1,
        })
    }

    /// Publishes container ports on the instance.
    ///
    /// # Errors
    ///
    /// Returns an error if `container` belongs to another task definition or
    /// a container port is already mapped.
    pub fn add_port_mappings(
        &mut self,
        container: ContainerRef,
        mappings: impl IntoIterator<Item = PortMapping>,
    ) -> Result<()> {
        let definition = self.name.clone();
        let target = self.container_mut(container)?;
        for mapping in mappings {
            if target
                .port_mappings
                .iter()
                .any(|m| m.container_port == mapping.container_port && m.protocol == mapping.protocol)
            {
                return Err(StackError::Duplicate {
                    kind: "port mapping",
                    id: format!("{definition}/{}:{}", target.name, mapping.container_port),
                });
            }
            target.port_mappings.push(mapping);
        }
        Ok(())
    }

    /// Mounts volumes into a container.
    ///
    /// # Errors
    ///
    /// Returns an error if `container` or a mount's volume belongs to another
    /// task definition, or a container path is mounted twice.
    pub fn add_mount_points(
        &mut self,
        container: ContainerRef,
        mounts: impl IntoIterator<Item = MountPoint>,
    ) -> Result<()> {
        let token = self.token;
        let definition = self.name.clone();
        let target = self.container_mut(container)?;
        for mount in mounts {
            if mount.volume.owner != token {
                return Err(StackError::ForeignHandle {
                    kind: "volume",
                    owner: "task definition",
                });
            }
            if target
                .mount_points
                .iter()
                .any(|m| m.container_path == mount.container_path)
            {
                return Err(StackError::Duplicate {
                    kind: "mount point",
                    id: format!("{definition}/{}:{}", target.name, mount.container_path),
                });
            }
            target.mount_points.push(mount);
        }
        Ok(())
    }

    fn container_mut(&mut self, container: ContainerRef) -> Result<&mut Container> {
        if container.owner != self.token {
            return Err(StackError::ForeignHandle {
                kind: "container",
                owner: "task definition",
            });
        }
        let name = &self.name;
        self.containers
            .get_mut(container.index)
            .ok_or_else(|| StackError::NotFound {
                kind: "container",
                id: format!("{name}#{}", container.index),
            })
    }

    /// Renders the task definition and closes it to further changes.
    ///
    /// Grants the task role log delivery when a container routes logs
    /// through FireLens.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition has no containers or a mount
    /// names an unknown volume.
    pub fn commit(self, stack: &mut StackBuilder) -> Result<TaskDefinition> {
        if self.containers.is_empty() {
            return Err(StackError::config(format!(
                "task definition {} has no containers",
                self.name
            )));
        }

        let uses_firelens = self
            .containers
            .iter()
            .any(|c| matches!(c.options.logging, Some(LogDriver::FireLens(_))));
        if uses_firelens {
            let _ = self.task_role.attach_policy(
                stack,
                &[self.name.as_str(), "TaskRole", "DefaultPolicy", "Resource"],
                vec![Statement::allow(&LOG_DELIVERY_ACTIONS)],
            )?;
        }

        let container_definitions = self
            .containers
            .iter()
            .map(|c| self.render_container(c))
            .collect::<Result<Vec<_>>>()?;
        let props = TaskDefinitionProps {
            container_definitions,
            family: format!("{}{}", stack.stack_name(), self.name),
            network_mode: "bridge",
            requires_compatibilities: ["EC2"],
            task_role_arn: self.task_role.arn(),
            volumes: self
                .volumes
                .iter()
                .map(|v| VolumeProps {
                    host: v
                        .host_source_path
                        .as_deref()
                        .map(|source_path| HostProps { source_path }),
                    name: &v.name,
                })
                .collect(),
        };
        stack.commit_reserved(
            &self.id,
            Resource::new(crate::validator::TASK_DEFINITION_TYPE, &props)?,
        )?;

        tracing::info!(
            task_definition = %self.name,
            logical_id = %self.id,
            containers = self.containers.len(),
            volumes = self.volumes.len(),
            "committed task definition"
        );
        Ok(TaskDefinition {
            id: self.id,
            token: self.token,
            containers: self
                .containers
                .into_iter()
                .map(|c| CommittedContainer {
                    name: c.name,
                    port_mappings: c.port_mappings,
                })
                .collect(),
        })
    }

    fn render_container<'a>(&'a self, container: &'a Container) -> Result<ContainerDefinitionProps<'a>> {
        let mount_points = container
            .mount_points
            .iter()
            .map(|m| {
                let volume = self.volumes.get(m.volume.index).ok_or_else(|| StackError::NotFound {
                    kind: "volume",
                    id: format!("{}#{}", self.name, m.volume.index),
                })?;
                Ok(MountPointProps {
                    container_path: &m.container_path,
                    read_only: m.read_only,
                    source_volume: &volume.name,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let options = &container.options;
        Ok(ContainerDefinitionProps {
            command: &options.command,
            cpu: options.cpu,
            essential: options.essential,
            image: &options.image,
            log_configuration: options.logging.as_ref().map(LogDriver::render),
            memory: options.memory_mib,
            mount_points,
            name: &container.name,
            port_mappings: &container.port_mappings,
            privileged: options.privileged,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CommittedContainer {
    name: String,
    port_mappings: Vec<PortMapping>,
}

/// A committed task definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    id: LogicalId,
    token: u32,
    containers: Vec<CommittedContainer>,
}

impl TaskDefinition {
    /// Logical id of the definition.
    #[must_use]
    pub const fn id(&self) -> &LogicalId {
        &self.id
    }

    /// Resolves a container handle and one of its mapped ports.
    ///
    /// Returns the container name and the mapping of `container_port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle belongs to another task definition or
    /// the port is not mapped.
    pub fn mapped_port(&self, container: ContainerRef, container_port: Port) -> Result<(&str, PortMapping)> {
        if container.owner != self.token {
            return Err(StackError::ForeignHandle {
                kind: "container",
                owner: "task definition",
            });
        }
        let target = self.containers.get(container.index).ok_or_else(|| StackError::NotFound {
            kind: "container",
            id: format!("{}#{}", self.id, container.index),
        })?;
        let mapping = target
            .port_mappings
            .iter()
            .find(|m| m.container_port == container_port)
            .ok_or_else(|| StackError::NotFound {
                kind: "port mapping",
                id: format!("{}:{container_port}", target.name),
            })?;
        Ok((&target.name, *mapping))
    }
}
