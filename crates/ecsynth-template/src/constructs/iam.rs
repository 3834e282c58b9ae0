//! IAM roles assumed by instances and tasks.

use ecsynth_common::error::Result;
use ecsynth_common::types::LogicalId;
use serde::Serialize;
use serde_json::Value;

use crate::builder::StackBuilder;
use crate::intrinsic;
use crate::template::Resource;

/// Resource type of roles.
pub const ROLE_TYPE: &str = "AWS::IAM::Role";

/// Resource type of inline policies.
pub const POLICY_TYPE: &str = "AWS::IAM::Policy";

/// Resource type of instance profiles.
pub const INSTANCE_PROFILE_TYPE: &str = "AWS::IAM::InstanceProfile";

/// Service principal of EC2 instances.
pub const EC2_PRINCIPAL: &str = "ec2.amazonaws.com";

/// Service principal of ECS tasks.
pub const ECS_TASKS_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";

const POLICY_VERSION: &str = "2012-10-17";

/// One `Allow` statement over every resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    /// Allowed actions.
    pub action: Vec<String>,
    effect: &'static str,
    resource: &'static str,
}

impl Statement {
    /// Allows `actions` on `*`.
    #[must_use]
    pub fn allow(actions: &[&str]) -> Self {
        Self {
            action: actions.iter().map(ToString::to_string).collect(),
            effect: "Allow",
            resource: "*",
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyDocument<T> {
    statement: Vec<T>,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleStatement<'a> {
    action: &'static str,
    effect: &'static str,
    principal: ServicePrincipal<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ServicePrincipal<'a> {
    service: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RoleProps<'a> {
    assume_role_policy_document: PolicyDocument<AssumeRoleStatement<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyProps {
    policy_document: PolicyDocument<Statement>,
    policy_name: String,
    roles: Vec<Value>,
}

/// A declared role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    id: LogicalId,
}

impl Role {
    /// Declares a role assumable by `service_principal`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is already taken.
    pub fn new(stack: &mut StackBuilder, path: &[&str], service_principal: &str) -> Result<Self> {
        let props = RoleProps {
            assume_role_policy_document: PolicyDocument {
                statement: vec![AssumeRoleStatement {
                    action: "sts:AssumeRole",
                    effect: "Allow",
                    principal: ServicePrincipal {
                        service: service_principal,
                    },
                }],
                version: POLICY_VERSION,
            },
        };
        let id = stack.add_resource(path, Resource::new(ROLE_TYPE, &props)?)?;
        Ok(Self { id })
    }

    /// Logical id of the role.
    #[must_use]
    pub const fn id(&self) -> &LogicalId {
        &self.id
    }

    /// `Fn::GetAtt` of the role ARN.
    #[must_use]
    pub fn arn(&self) -> Value {
        intrinsic::get_att(&self.id, "Arn")
    }

    /// Attaches an inline policy at `path`, naming the policy after its
    /// logical id.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is already taken.
    pub fn attach_policy(
        &self,
        stack: &mut StackBuilder,
        path: &[&str],
        statements: Vec<Statement>,
    ) -> Result<LogicalId> {
        let policy_name = crate::logical_id::from_path(path).to_string();
        let props = PolicyProps {
            policy_document: PolicyDocument {
                statement: statements,
                version: POLICY_VERSION,
            },
            policy_name,
            roles: vec![intrinsic::ref_to(&self.id)],
        };
        stack.add_resource(path, Resource::new(POLICY_TYPE, &props)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn role_trusts_service_principal() {
        let mut stack = StackBuilder::new("Stack");
        let role = Role::new(&mut stack, &["TDF", "TaskRole", "Resource"], ECS_TASKS_PRINCIPAL)
            .expect("role");
        let resource = stack.resource_mut(role.id()).expect("declared");
        assert_eq!(
            resource.property("AssumeRolePolicyDocument"),
            Some(&json!({
                "Statement": [{
                    "Action": "sts:AssumeRole",
                    "Effect": "Allow",
                    "Principal": {"Service": "ecs-tasks.amazonaws.com"},
                }],
                "Version": "2012-10-17",
            }))
        );
    }

    #[test]
    fn policy_refers_to_role() {
        let mut stack = StackBuilder::new("Stack");
        let role = Role::new(&mut stack, &["Role"], EC2_PRINCIPAL).expect("role");
        let policy = role
            .attach_policy(
                &mut stack,
                &["Role", "DefaultPolicy"],
                vec![Statement::allow(&["ecs:Poll"])],
            )
            .expect("policy");
        let resource = stack.resource_mut(&policy).expect("declared");
        assert_eq!(
            resource.property("Roles"),
            Some(&json!([{"Ref": role.id().as_str()}]))
        );
        assert_eq!(
            resource.property("PolicyName"),
            Some(&json!(policy.as_str()))
        );
    }
}
