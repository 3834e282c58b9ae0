//! Container cluster and its instance capacity.

use ecsynth_common::config::CapacityConfig;
use ecsynth_common::constants;
use ecsynth_common::error::{Result, StackError};
use ecsynth_common::types::{InstanceType, LogicalId};
use serde::Serialize;
use serde_json::{Value, json};

use super::iam::{self, Role, Statement};
use super::security_group::SecurityGroup;
use super::vpc::Vpc;
use super::display_path;
use crate::builder::StackBuilder;
use crate::intrinsic;
use crate::template::{Parameter, Resource};

/// Name of the parameter resolving the ECS-optimized machine image.
pub const AMI_PARAMETER: &str = "SsmParameterValueEcsOptimizedAmiImageId";

/// Actions instances need to join the cluster and ship agent logs.
const INSTANCE_ACTIONS: [&str; 9] = [
    "ecs:DeregisterContainerInstance",
    "ecs:RegisterContainerInstance",
    "ecs:Submit*",
    "ecs:Poll",
    "ecs:StartTelemetrySession",
    "ecs:DiscoverPollEndpoint",
    "ecr:GetAuthorizationToken",
    "logs:CreateLogStream",
    "logs:PutLogEvents",
];

/// Instance capacity added to a [`Cluster`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityOptions {
    /// Instance type of the auto-scaling group.
    pub instance_type: InstanceType,
    /// SSH key pair installed on instances.
    pub key_name: Option<String>,
    /// Minimum number of instances.
    pub min_capacity: u32,
    /// Maximum number of instances.
    pub max_capacity: u32,
    /// Commands run after the instance registers with the cluster.
    pub user_data: Vec<String>,
}

impl From<&CapacityConfig> for CapacityOptions {
    fn from(config: &CapacityConfig) -> Self {
        Self {
            instance_type: config.instance_type.clone(),
            key_name: config.key_name.clone(),
            min_capacity: config.min_capacity,
            max_capacity: config.max_capacity,
            user_data: config.user_data.clone(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct LaunchConfigurationProps {
    iam_instance_profile: Value,
    image_id: Value,
    instance_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_name: Option<String>,
    security_groups: Vec<Value>,
    user_data: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AsgTag {
    key: String,
    propagate_at_launch: bool,
    value: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AutoScalingGroupProps {
    launch_configuration_name: Value,
    // The provider expects sizes as strings.
    max_size: String,
    min_size: String,
    tags: Vec<AsgTag>,
    #[serde(rename = "VPCZoneIdentifier")]
    vpc_zone_identifier: Vec<Value>,
}

/// A declared cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    id: LogicalId,
    name: String,
    vpc_id: LogicalId,
    private_subnets: Vec<LogicalId>,
    instance_security_group: Option<LogicalId>,
}

impl Cluster {
    /// Declares a cluster attached to `vpc`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is already taken.
    pub fn new(stack: &mut StackBuilder, name: &str, vpc: &Vpc) -> Result<Self> {
        tracing::info!(cluster = name, "declaring cluster");
        let id = stack.add_resource(&[name, "Resource"], Resource::new("AWS::ECS::Cluster", &json!({}))?)?;
        Ok(Self {
            id,
            name: name.to_string(),
            vpc_id: vpc.id().clone(),
            private_subnets: vpc.private_subnets().iter().map(|s| s.id.clone()).collect(),
            instance_security_group: None,
        })
    }

    /// Adds an auto-scaling group of instances that register with this
    /// cluster at boot and then run `options.user_data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster already has capacity, the sizes are
    /// inconsistent, or a path is already taken.
    pub fn add_capacity(
        &mut self,
        stack: &mut StackBuilder,
        name: &str,
        options: &CapacityOptions,
    ) -> Result<()> {
        if self.instance_security_group.is_some() {
            return Err(StackError::Duplicate {
                kind: "capacity",
                id: format!("{}/{name}", self.name),
            });
        }
        if options.min_capacity > options.max_capacity {
            return Err(StackError::config(format!(
                "capacity {name}: min {} exceeds max {}",
                options.min_capacity, options.max_capacity
            )));
        }
        tracing::info!(
            cluster = %self.name,
            capacity = name,
            instance_type = %options.instance_type,
            commands = options.user_data.len(),
            "declaring cluster capacity"
        );

        let cluster = self.name.as_str();
        let group = SecurityGroup::new(
            stack,
            &[cluster, name, "InstanceSecurityGroup", "Resource"],
            None,
            &self.vpc_id,
            true,
        )?;

        let role = Role::new(stack, &[cluster, name, "InstanceRole", "Resource"], iam::EC2_PRINCIPAL)?;
        let policy = role.attach_policy(
            stack,
            &[cluster, name, "InstanceRole", "DefaultPolicy", "Resource"],
            vec![Statement::allow(&INSTANCE_ACTIONS)],
        )?;
        let profile = stack.add_resource(
            &[cluster, name, "InstanceProfile"],
            Resource::new(
                iam::INSTANCE_PROFILE_TYPE,
                &json!({ "Roles": [intrinsic::ref_to(role.id())] }),
            )?,
        )?;

        let ami = stack.add_parameter(
            AMI_PARAMETER,
            Parameter {
                parameter_type: "AWS::SSM::Parameter::Value<AWS::EC2::Image::Id>".to_string(),
                default: Some(Value::String(constants::ECS_OPTIMIZED_AMI_PARAMETER.to_string())),
                description: Some("ECS-optimized Amazon Linux 2 image".to_string()),
            },
        )?;

        let launch_config = Resource::new(
            "AWS::AutoScaling::LaunchConfiguration",
            &LaunchConfigurationProps {
                iam_instance_profile: intrinsic::ref_to(&profile),
                image_id: intrinsic::ref_to(&ami),
                instance_type: options.instance_type.to_string(),
                key_name: options.key_name.clone(),
                security_groups: vec![group.group_id()],
                user_data: self.user_data(&options.user_data),
            },
        )?
        .depends_on(role.id().clone())
        .depends_on(policy);
        let launch_config = stack.add_resource(&[cluster, name, "LaunchConfig"], launch_config)?;

        let stack_name = stack.stack_name().to_string();
        let _ = stack.add_resource(
            &[cluster, name, "ASG"],
            Resource::new(
                "AWS::AutoScaling::AutoScalingGroup",
                &AutoScalingGroupProps {
                    launch_configuration_name: intrinsic::ref_to(&launch_config),
                    max_size: options.max_capacity.to_string(),
                    min_size: options.min_capacity.to_string(),
                    tags: vec![AsgTag {
                        key: "Name".to_string(),
                        propagate_at_launch: true,
                        value: display_path(&stack_name, &[cluster, name]),
                    }],
                    vpc_zone_identifier: self.private_subnets.iter().map(intrinsic::ref_to).collect(),
                },
            )?,
        )?;

        self.instance_security_group = Some(group.id().clone());
        Ok(())
    }

    /// Boot script: register with the cluster, then run `commands`.
    fn user_data(&self, commands: &[String]) -> Value {
        let mut tail = String::from(" >> /etc/ecs/ecs.config\n");
        for command in commands {
            tail.push_str(command);
            tail.push('\n');
        }
        intrinsic::base64(intrinsic::join(
            "",
            vec![
                Value::String("#!/bin/bash\necho ECS_CLUSTER=".to_string()),
                intrinsic::ref_to(&self.id),
                Value::String(tail),
            ],
        ))
    }

    /// Logical id of the cluster.
    #[must_use]
    pub const fn id(&self) -> &LogicalId {
        &self.id
    }

    /// Security group of the cluster's instances, once capacity is added.
    #[must_use]
    pub const fn instance_security_group(&self) -> Option<&LogicalId> {
        self.instance_security_group.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use ecsynth_common::types::Ipv4Cidr;

    use super::*;
    use crate::constructs::vpc::VpcProps;

    fn cluster_with_capacity() -> (StackBuilder, Cluster) {
        let mut stack = StackBuilder::new("Stack");
        let cidr: Ipv4Cidr = "10.101.0.0/16".parse().expect("cidr");
        let vpc = Vpc::new(&mut stack, "MyVpc", VpcProps { cidr, max_azs: 2 }).expect("vpc");
        let mut cluster = Cluster::new(&mut stack, "Ec2Cluster", &vpc).expect("cluster");
        cluster
            .add_capacity(
                &mut stack,
                "DefaultAutoScalingGroup",
                &CapacityOptions::from(&CapacityConfig::default()),
            )
            .expect("capacity");
        (stack, cluster)
    }

    fn find<'a>(template: &'a crate::template::Template, ty: &str) -> &'a Resource {
        template.resources_of_type(ty).next().map(|(_, r)| r).expect(ty)
    }

    #[test]
    fn capacity_records_instance_security_group() {
        let (_, cluster) = cluster_with_capacity();
        let group = cluster.instance_security_group().expect("group");
        assert!(group.as_str().starts_with("Ec2ClusterDefaultAutoScalingGroupInstanceSecurityGroup"));
    }

    #[test]
    fn user_data_registers_then_installs_agent() {
        let (stack, cluster) = cluster_with_capacity();
        let template = stack.build().expect("build");
        let launch = find(&template, "AWS::AutoScaling::LaunchConfiguration");
        assert_eq!(launch.property("InstanceType"), Some(&json!("t3a.large")));
        assert_eq!(launch.property("KeyName"), Some(&json!("rajdast-ohio.pem")));

        let parts = &launch.properties["UserData"]["Fn::Base64"]["Fn::Join"][1];
        assert_eq!(parts[0], json!("#!/bin/bash\necho ECS_CLUSTER="));
        assert_eq!(parts[1], json!({"Ref": cluster.id().as_str()}));
        let script = parts[2].as_str().expect("script");
        assert!(script.starts_with(" >> /etc/ecs/ecs.config\nrpm --import"));
        assert!(script.contains("yum -y install kernel-devel-$(uname -r)\n"));
        assert!(script.ends_with("yum -y install falco\n"));
    }

    #[test]
    fn group_spans_private_subnets_with_fixed_size() {
        let (stack, _) = cluster_with_capacity();
        let template = stack.build().expect("build");
        let asg = find(&template, "AWS::AutoScaling::AutoScalingGroup");
        assert_eq!(asg.property("MinSize"), Some(&json!("1")));
        assert_eq!(asg.property("MaxSize"), Some(&json!("1")));
        let zones = asg.properties["VPCZoneIdentifier"].as_array().expect("zones");
        assert_eq!(zones.len(), 2);
        for zone in zones {
            let subnet = zone["Ref"].as_str().expect("ref");
            assert!(subnet.starts_with("MyVpcPrivateSubnet"), "got: {subnet}");
        }
    }

    #[test]
    fn image_comes_from_ssm_parameter() {
        let (stack, _) = cluster_with_capacity();
        let template = stack.build().expect("build");
        let parameter = template
            .parameters
            .get(&LogicalId::new(AMI_PARAMETER))
            .expect("parameter");
        assert_eq!(
            parameter.default,
            Some(json!(constants::ECS_OPTIMIZED_AMI_PARAMETER))
        );
    }

    #[test]
    fn second_capacity_is_rejected() {
        let (mut stack, mut cluster) = cluster_with_capacity();
        let err = cluster
            .add_capacity(
                &mut stack,
                "Other",
                &CapacityOptions::from(&CapacityConfig::default()),
            )
            .unwrap_err();
        assert!(matches!(err, StackError::Duplicate { kind: "capacity", .. }));
    }

    #[test]
    fn inverted_sizes_are_rejected() {
        let mut stack = StackBuilder::new("Stack");
        let cidr: Ipv4Cidr = "10.101.0.0/16".parse().expect("cidr");
        let vpc = Vpc::new(&mut stack, "MyVpc", VpcProps { cidr, max_azs: 1 }).expect("vpc");
        let mut cluster = Cluster::new(&mut stack, "Ec2Cluster", &vpc).expect("cluster");
        let mut options = CapacityOptions::from(&CapacityConfig::default());
        options.min_capacity = 3;
        assert!(cluster.add_capacity(&mut stack, "Asg", &options).is_err());
    }
}
