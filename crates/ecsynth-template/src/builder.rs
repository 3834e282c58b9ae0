//! Explicit accumulation of declared resources.
//!
//! Constructs register their resources with a [`StackBuilder`] instead of an
//! ambient context. Constructs that accept further declarations after they
//! are created (task definitions, services, listeners) reserve their logical
//! id up front and register when committed; [`StackBuilder::build`] refuses
//! to produce a template while any reservation is outstanding.

use std::collections::{BTreeMap, BTreeSet};

use ecsynth_common::error::{Result, StackError};
use ecsynth_common::types::LogicalId;

use crate::logical_id;
use crate::template::{Output, Parameter, Resource, Template};
use crate::validator;

/// Accumulates resources for one stack.
#[derive(Debug)]
pub struct StackBuilder {
    stack_name: String,
    description: Option<String>,
    parameters: BTreeMap<LogicalId, Parameter>,
    resources: BTreeMap<LogicalId, Resource>,
    outputs: BTreeMap<LogicalId, Output>,
    reserved: BTreeSet<LogicalId>,
    next_token: u32,
}

impl StackBuilder {
    /// Creates an empty builder for the named stack.
    #[must_use]
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            description: None,
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
            reserved: BTreeSet::new(),
            next_token: 0,
        }
    }

    /// Sets the template description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Name of the stack being built.
    #[must_use]
    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    /// Issues a token that identifies one construct's handles.
    pub const fn next_token(&mut self) -> u32 {
        let token = self.next_token;
        self.next_token += 1;
        token
    }

    /// Reserves the logical id of a construct that will be committed later.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Duplicate`] if the id is already taken.
    pub fn reserve(&mut self, path: &[&str]) -> Result<LogicalId> {
        let id = logical_id::from_path(path);
        if self.resources.contains_key(&id) || !self.reserved.insert(id.clone()) {
            return Err(StackError::Duplicate {
                kind: "construct",
                id: path.join("/"),
            });
        }
        tracing::debug!(logical_id = %id, path = %path.join("/"), "reserved logical id");
        Ok(id)
    }

    /// Registers a resource at `path` and returns its logical id.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Duplicate`] if the path was already used.
    pub fn add_resource(&mut self, path: &[&str], resource: Resource) -> Result<LogicalId> {
        let id = logical_id::from_path(path);
        if self.reserved.contains(&id) {
            return Err(StackError::Duplicate {
                kind: "construct",
                id: path.join("/"),
            });
        }
        self.insert(id.clone(), path, resource)?;
        Ok(id)
    }

    /// Registers the resource of a previously reserved logical id.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::NotFound`] if `id` was never reserved.
    pub fn commit_reserved(&mut self, id: &LogicalId, resource: Resource) -> Result<()> {
        if !self.reserved.remove(id) {
            return Err(StackError::NotFound {
                kind: "reservation",
                id: id.to_string(),
            });
        }
        self.insert(id.clone(), &[id.as_str()], resource)
    }

    fn insert(&mut self, id: LogicalId, path: &[&str], resource: Resource) -> Result<()> {
        if self.resources.contains_key(&id) {
            return Err(StackError::Duplicate {
                kind: "resource",
                id: path.join("/"),
            });
        }
        tracing::debug!(
            logical_id = %id,
            resource_type = %resource.resource_type,
            "declared resource"
        );
        let _ = self.resources.insert(id, resource);
        Ok(())
    }

    /// Registers a deployment-time parameter under a fixed name.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Duplicate`] if the name is taken.
    pub fn add_parameter(&mut self, name: &str, parameter: Parameter) -> Result<LogicalId> {
        let id = LogicalId::new(name);
        if self.parameters.contains_key(&id) || self.resources.contains_key(&id) {
            return Err(StackError::Duplicate {
                kind: "parameter",
                id: name.to_string(),
            });
        }
        let _ = self.parameters.insert(id.clone(), parameter);
        Ok(id)
    }

    /// Registers a stack output under a fixed name.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Duplicate`] if the name is taken.
    pub fn add_output(&mut self, name: &str, output: Output) -> Result<LogicalId> {
        let id = LogicalId::new(name);
        if self.outputs.contains_key(&id) {
            return Err(StackError::Duplicate {
                kind: "output",
                id: name.to_string(),
            });
        }
        let _ = self.outputs.insert(id.clone(), output);
        Ok(id)
    }

    /// Whether a resource is registered at `path`.
    #[must_use]
    pub fn contains_path(&self, path: &[&str]) -> bool {
        self.resources.contains_key(&logical_id::from_path(path))
    }

    /// Mutable access to a registered resource.
    pub fn resource_mut(&mut self, id: &LogicalId) -> Option<&mut Resource> {
        self.resources.get_mut(id)
    }

    /// Number of registered resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether no resource has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Finishes the stack, validates it, and returns the template.
    ///
    /// # Errors
    ///
    /// Returns an error if a reserved construct was never committed or the
    /// template fails validation.
    pub fn build(self) -> Result<Template> {
        if let Some(pending) = self.reserved.first() {
            return Err(StackError::config(format!(
                "construct {pending} was declared but never committed"
            )));
        }
        let template = Template {
            description: self.description,
            parameters: self.parameters,
            resources: self.resources,
            outputs: self.outputs,
        };
        validator::validate(&template)?;
        tracing::info!(
            stack = %self.stack_name,
            resources = template.resources.len(),
            "synthesized template"
        );
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::intrinsic;

    fn vpc() -> Resource {
        Resource::new("AWS::EC2::VPC", &json!({"CidrBlock": "10.0.0.0/16"})).expect("resource")
    }

    #[test]
    fn empty_builder_builds_empty_template() {
        let template = StackBuilder::new("Empty").build().expect("should build");
        assert!(template.resources.is_empty());
    }

    #[test]
    fn add_resource_returns_path_derived_id() {
        let mut stack = StackBuilder::new("Test");
        let id = stack.add_resource(&["MyVpc", "Resource"], vpc()).expect("add");
        assert_eq!(id, logical_id::from_path(&["MyVpc", "Resource"]));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn duplicate_path_is_rejected() {
        let mut stack = StackBuilder::new("Test");
        let _ = stack.add_resource(&["MyVpc"], vpc()).expect("add");
        let err = stack.add_resource(&["MyVpc"], vpc()).unwrap_err();
        assert!(err.to_string().contains("duplicate"), "got: {err}");
    }

    #[test]
    fn uncommitted_reservation_fails_build() {
        let mut stack = StackBuilder::new("Test");
        let _ = stack.reserve(&["TDF"]).expect("reserve");
        let err = stack.build().unwrap_err();
        assert!(err.to_string().contains("never committed"), "got: {err}");
    }

    #[test]
    fn committed_reservation_builds() {
        let mut stack = StackBuilder::new("Test");
        let id = stack.reserve(&["MyVpc"]).expect("reserve");
        stack.commit_reserved(&id, vpc()).expect("commit");
        let template = stack.build().expect("should build");
        assert!(template.resource(&id).is_some());
    }

    #[test]
    fn reserved_path_cannot_be_added_directly() {
        let mut stack = StackBuilder::new("Test");
        let _ = stack.reserve(&["MyVpc"]).expect("reserve");
        assert!(stack.add_resource(&["MyVpc"], vpc()).is_err());
        assert!(stack.reserve(&["MyVpc"]).is_err());
    }

    #[test]
    fn build_rejects_dangling_reference() {
        let mut stack = StackBuilder::new("Test");
        let subnet = Resource::new(
            "AWS::EC2::Subnet",
            &json!({"VpcId": intrinsic::ref_to(&LogicalId::new("Missing"))}),
        )
        .expect("resource");
        let _ = stack.add_resource(&["Subnet"], subnet).expect("add");
        assert!(matches!(
            stack.build(),
            Err(StackError::DanglingReference { .. })
        ));
    }

    #[test]
    fn contains_path_sees_registered_resources_only() {
        let mut stack = StackBuilder::new("Test");
        let _ = stack.reserve(&["TDF"]).expect("reserve");
        let _ = stack.add_resource(&["MyVpc"], vpc()).expect("add");
        assert!(stack.contains_path(&["MyVpc"]));
        assert!(!stack.contains_path(&["TDF"]));
        assert!(!stack.contains_path(&["Other"]));
    }

    #[test]
    fn tokens_are_unique() {
        let mut stack = StackBuilder::new("Test");
        let a = stack.next_token();
        let b = stack.next_token();
        assert_ne!(a, b);
    }
}
