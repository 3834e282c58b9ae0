//! Static analysis of a finished template.
//!
//! Checks for dangling references, broken task-definition cross references,
//! and dependency cycles before the template leaves the process.

use std::collections::HashSet;

use ecsynth_common::error::{Result, StackError};
use ecsynth_common::types::LogicalId;
use serde_json::Value;

use crate::graph::DependencyGraph;
use crate::intrinsic;
use crate::template::{Resource, Template};

/// Resource type of ECS task definitions.
pub const TASK_DEFINITION_TYPE: &str = "AWS::ECS::TaskDefinition";

/// Resource type of ECS services.
pub const SERVICE_TYPE: &str = "AWS::ECS::Service";

/// Validates a template for reference integrity.
///
/// # Checks performed
///
/// 1. Every `DependsOn` entry names a declared resource.
/// 2. Every `Ref` / `Fn::GetAtt` target is a resource, a parameter, or a
///    pseudo-parameter; outputs are checked the same way.
/// 3. Task definitions have unique container and volume names, and every
///    mount point names a declared volume.
/// 4. Every service load-balancer binding names a container of its task
///    definition and one of that container's mapped ports.
/// 5. The resource graph is acyclic.
///
/// # Errors
///
/// Returns an error describing the first failed check.
pub fn validate(template: &Template) -> Result<()> {
    tracing::debug!(resources = template.resources.len(), "validating template");
    check_depends_on(template)?;
    check_references(template)?;
    for (id, resource) in template.resources_of_type(TASK_DEFINITION_TYPE) {
        check_task_definition(id, resource)?;
    }
    for (id, resource) in template.resources_of_type(SERVICE_TYPE) {
        check_service_bindings(template, id, resource)?;
    }
    let _ = DependencyGraph::from_template(template).resolve_order()?;
    Ok(())
}

fn check_depends_on(template: &Template) -> Result<()> {
    for (id, resource) in &template.resources {
        for dependency in &resource.depends_on {
            if !template.resources.contains_key(dependency) {
                return Err(StackError::DanglingReference {
                    from: id.to_string(),
                    to: dependency.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn check_references(template: &Template) -> Result<()> {
    let resolvable = |name: &str| intrinsic::is_pseudo_parameter(name) || template.declares(name);

    for (id, resource) in &template.resources {
        if let Some(missing) = intrinsic::references(&resource.properties)
            .into_iter()
            .find(|name| !resolvable(name))
        {
            return Err(StackError::DanglingReference {
                from: id.to_string(),
                to: missing,
            });
        }
    }
    for (id, output) in &template.outputs {
        if let Some(missing) = intrinsic::references(&output.value)
            .into_iter()
            .find(|name| !resolvable(name))
        {
            return Err(StackError::DanglingReference {
                from: format!("output {id}"),
                to: missing,
            });
        }
    }
    Ok(())
}

fn array<'a>(resource: &'a Resource, name: &str) -> &'a [Value] {
    resource
        .property(name)
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

fn str_field<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value.get(name).and_then(Value::as_str)
}

fn check_task_definition(id: &LogicalId, resource: &Resource) -> Result<()> {
    let mut volumes = HashSet::new();
    for volume in array(resource, "Volumes") {
        let name = str_field(volume, "Name").unwrap_or_default();
        if !volumes.insert(name) {
            return Err(StackError::Duplicate {
                kind: "volume",
                id: format!("{id}/{name}"),
            });
        }
    }

    let mut containers = HashSet::new();
    for container in array(resource, "ContainerDefinitions") {
        let name = str_field(container, "Name").unwrap_or_default();
        if !containers.insert(name) {
            return Err(StackError::Duplicate {
                kind: "container",
                id: format!("{id}/{name}"),
            });
        }
        let mounts = container
            .get("MountPoints")
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice);
        for mount in mounts {
            let volume = str_field(mount, "SourceVolume").unwrap_or_default();
            if !volumes.contains(volume) {
                return Err(StackError::NotFound {
                    kind: "volume",
                    id: format!("{volume} (mounted by {id}/{name})"),
                });
            }
        }
    }
    Ok(())
}

fn check_service_bindings(template: &Template, id: &LogicalId, service: &Resource) -> Result<()> {
    let bindings = array(service, "LoadBalancers");
    if bindings.is_empty() {
        return Ok(());
    }
    let task_definition = service
        .property("TaskDefinition")
        .map(intrinsic::references)
        .and_then(|refs| refs.into_iter().next())
        .and_then(|name| template.resource(&LogicalId::new(name)))
        .ok_or_else(|| StackError::NotFound {
            kind: "task definition",
            id: format!("referenced by {id}"),
        })?;

    for binding in bindings {
        let container_name = str_field(binding, "ContainerName").unwrap_or_default();
        let container_port = binding.get("ContainerPort").and_then(Value::as_u64);
        let container = array(task_definition, "ContainerDefinitions")
            .iter()
            .find(|c| str_field(c, "Name") == Some(container_name))
            .ok_or_else(|| StackError::NotFound {
                kind: "container",
                id: format!("{container_name} (load balancer target of {id})"),
            })?;
        let mapped = container
            .get("PortMappings")
            .and_then(Value::as_array)
            .is_some_and(|mappings| {
                mappings
                    .iter()
                    .any(|m| m.get("ContainerPort").and_then(Value::as_u64) == container_port)
            });
        if !mapped {
            return Err(StackError::NotFound {
                kind: "port mapping",
                id: format!(
                    "{container_name}:{} (load balancer target of {id})",
                    container_port.unwrap_or_default()
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::template::Output;

    fn insert(template: &mut Template, id: &str, resource: Resource) {
        let _ = template.resources.insert(LogicalId::new(id), resource);
    }

    fn task_definition(volumes: &Value, containers: &Value) -> Resource {
        Resource::new(
            TASK_DEFINITION_TYPE,
            &json!({"Volumes": volumes, "ContainerDefinitions": containers}),
        )
        .expect("resource")
    }

    #[test]
    fn validate_empty_template_succeeds() {
        assert!(validate(&Template::default()).is_ok());
    }

    #[test]
    fn pseudo_parameter_references_are_allowed() {
        let mut template = Template::default();
        insert(
            &mut template,
            "Td",
            task_definition(
                &json!([]),
                &json!([{"Name": "app", "LogConfiguration": {"Options": {"region": {"Ref": "AWS::Region"}}}}]),
            ),
        );
        assert!(validate(&template).is_ok());
    }

    #[test]
    fn dangling_depends_on_fails() {
        let mut template = Template::default();
        insert(
            &mut template,
            "Service",
            Resource::new("AWS::ECS::Cluster", &json!({}))
                .expect("resource")
                .depends_on(LogicalId::new("Ghost")),
        );
        let err = validate(&template).unwrap_err();
        assert!(err.to_string().contains("Ghost"), "got: {err}");
    }

    #[test]
    fn dangling_output_reference_fails() {
        let mut template = Template::default();
        let _ = template.outputs.insert(
            LogicalId::new("Dns"),
            Output {
                value: json!({"Fn::GetAtt": ["Ghost", "DNSName"]}),
                description: None,
            },
        );
        assert!(matches!(
            validate(&template),
            Err(StackError::DanglingReference { .. })
        ));
    }

    #[test]
    fn mount_point_naming_unknown_volume_fails() {
        let mut template = Template::default();
        insert(
            &mut template,
            "Td",
            task_definition(
                &json!([{"Name": "proc-fs", "Host": {"SourcePath": "/proc"}}]),
                &json!([{"Name": "ids", "MountPoints": [{"SourceVolume": "docker-socket", "ContainerPath": "/host/var/run/docker.sock", "ReadOnly": false}]}]),
            ),
        );
        let err = validate(&template).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("docker-socket"), "got: {msg}");
    }

    #[test]
    fn duplicate_container_names_fail() {
        let mut template = Template::default();
        insert(
            &mut template,
            "Td",
            task_definition(&json!([]), &json!([{"Name": "web"}, {"Name": "web"}])),
        );
        assert!(matches!(
            validate(&template),
            Err(StackError::Duplicate { kind: "container", .. })
        ));
    }

    #[test]
    fn duplicate_volume_names_fail() {
        let mut template = Template::default();
        insert(
            &mut template,
            "Td",
            task_definition(
                &json!([{"Name": "usr-fs"}, {"Name": "usr-fs"}]),
                &json!([]),
            ),
        );
        assert!(matches!(
            validate(&template),
            Err(StackError::Duplicate { kind: "volume", .. })
        ));
    }

    fn service_template(container_name: &str, container_port: u16) -> Template {
        let mut template = Template::default();
        insert(
            &mut template,
            "Td",
            task_definition(
                &json!([]),
                &json!([{"Name": "web2", "PortMappings": [{"ContainerPort": 80, "HostPort": 8080, "Protocol": "tcp"}]}]),
            ),
        );
        insert(
            &mut template,
            "Tg",
            Resource::new("AWS::ElasticLoadBalancingV2::TargetGroup", &json!({})).expect("resource"),
        );
        insert(
            &mut template,
            "Service",
            Resource::new(
                SERVICE_TYPE,
                &json!({
                    "TaskDefinition": {"Ref": "Td"},
                    "LoadBalancers": [{
                        "ContainerName": container_name,
                        "ContainerPort": container_port,
                        "TargetGroupArn": {"Ref": "Tg"},
                    }],
                }),
            )
            .expect("resource"),
        );
        template
    }

    #[test]
    fn service_binding_to_mapped_port_succeeds() {
        assert!(validate(&service_template("web2", 80)).is_ok());
    }

    #[test]
    fn service_binding_to_unknown_container_fails() {
        let err = validate(&service_template("web3", 80)).unwrap_err();
        assert!(err.to_string().contains("web3"), "got: {err}");
    }

    #[test]
    fn service_binding_to_unmapped_port_fails() {
        let err = validate(&service_template("web2", 443)).unwrap_err();
        assert!(err.to_string().contains("port mapping"), "got: {err}");
    }

    #[test]
    fn reference_cycle_fails() {
        let mut template = Template::default();
        insert(
            &mut template,
            "A",
            Resource::new("AWS::EC2::SecurityGroup", &json!({"Peer": {"Ref": "B"}})).expect("resource"),
        );
        insert(
            &mut template,
            "B",
            Resource::new("AWS::EC2::SecurityGroup", &json!({"Peer": {"Fn::GetAtt": ["A", "GroupId"]}}))
                .expect("resource"),
        );
        assert!(matches!(validate(&template), Err(StackError::Cycle { .. })));
    }
}
