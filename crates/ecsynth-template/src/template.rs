//! The template document handed to the provisioning engine.

use std::collections::BTreeMap;

use ecsynth_common::error::Result;
use ecsynth_common::types::LogicalId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A synthesized deployment template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    /// Free-form description of the stack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Values supplied at deployment time.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<LogicalId, Parameter>,
    /// Declared resources keyed by logical id.
    #[serde(default)]
    pub resources: BTreeMap<LogicalId, Resource>,
    /// Values exported after deployment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<LogicalId, Output>,
}

impl Template {
    /// Looks up a resource by logical id.
    #[must_use]
    pub fn resource(&self, id: &LogicalId) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Iterates over resources of the given type, in logical-id order.
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &str,
    ) -> impl Iterator<Item = (&'a LogicalId, &'a Resource)> {
        self.resources
            .iter()
            .filter(move |(_, resource)| resource.resource_type == resource_type)
    }

    /// Whether `name` is a declared resource or parameter.
    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        let id = LogicalId::new(name);
        self.resources.contains_key(&id) || self.parameters.contains_key(&id)
    }

    /// Converts the template to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Renders the template as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Renders the template as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parses a template from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid template document.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// One declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    /// Provider resource type, e.g. `AWS::ECS::Service`.
    #[serde(rename = "Type")]
    pub resource_type: String,
    /// Resource properties.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,
    /// Resources that must be created first, beyond implicit references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<LogicalId>,
}

impl Resource {
    /// Creates a resource from serializable properties.
    ///
    /// # Errors
    ///
    /// Returns an error if the properties cannot be serialized.
    pub fn new(resource_type: impl Into<String>, properties: &impl Serialize) -> Result<Self> {
        Ok(Self {
            resource_type: resource_type.into(),
            properties: serde_json::to_value(properties)?,
            depends_on: Vec::new(),
        })
    }

    /// Adds an explicit dependency, keeping the list sorted and unique.
    #[must_use]
    pub fn depends_on(mut self, id: LogicalId) -> Self {
        self.add_dependency(id);
        self
    }

    /// Adds an explicit dependency in place.
    pub fn add_dependency(&mut self, id: LogicalId) {
        if let Err(pos) = self.depends_on.binary_search(&id) {
            self.depends_on.insert(pos, id);
        }
    }

    /// Returns a top-level property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// A deployment-time parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    /// Parameter type, e.g. `String`.
    #[serde(rename = "Type")]
    pub parameter_type: String,
    /// Value used when none is supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A value exported from the stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    /// Exported value, usually an intrinsic.
    pub value: Value,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_template_serializes_resources_only() {
        let template = Template::default();
        let value = template.to_value().expect("serialize");
        assert_eq!(value, json!({"Resources": {}}));
    }

    #[test]
    fn resource_uses_provider_field_names() {
        let resource = Resource::new("AWS::EC2::VPC", &json!({"CidrBlock": "10.0.0.0/16"}))
            .expect("resource")
            .depends_on(LogicalId::new("B"))
            .depends_on(LogicalId::new("A"))
            .depends_on(LogicalId::new("B"));
        let value = serde_json::to_value(&resource).expect("serialize");
        assert_eq!(
            value,
            json!({
                "Type": "AWS::EC2::VPC",
                "Properties": {"CidrBlock": "10.0.0.0/16"},
                "DependsOn": ["A", "B"],
            })
        );
    }

    #[test]
    fn resources_of_type_filters() {
        let mut template = Template::default();
        for (id, ty) in [("A", "AWS::EC2::Subnet"), ("B", "AWS::EC2::VPC"), ("C", "AWS::EC2::Subnet")] {
            let _ = template.resources.insert(
                LogicalId::new(id),
                Resource::new(ty, &json!({})).expect("resource"),
            );
        }
        let ids: Vec<&str> = template
            .resources_of_type("AWS::EC2::Subnet")
            .map(|(id, _)| id.as_str())
            .collect();
        assert_eq!(ids, vec!["A", "C"]);
    }

    #[test]
    fn json_text_parses_back() {
        let text = r#"{"Resources": {"Vpc": {"Type": "AWS::EC2::VPC", "Properties": {}}}}"#;
        let template = Template::from_json(text).expect("parse");
        assert!(template.declares("Vpc"));
        assert!(!template.declares("Other"));
    }

    #[test]
    fn yaml_rendering_contains_type() {
        let mut template = Template::default();
        let _ = template.resources.insert(
            LogicalId::new("Cluster"),
            Resource::new("AWS::ECS::Cluster", &json!({})).expect("resource"),
        );
        let yaml = template.to_yaml().expect("yaml");
        assert!(yaml.contains("Type: AWS::ECS::Cluster"), "got: {yaml}");
    }
}
