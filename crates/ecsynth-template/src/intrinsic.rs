//! Intrinsic functions and pseudo-parameters of the template language.
//!
//! References between resources are written with these helpers so that
//! [`references`] can later recover every edge of the resource graph.

use ecsynth_common::types::LogicalId;
use serde_json::{Value, json};

/// Region the stack is deployed into.
pub const AWS_REGION: &str = "AWS::Region";

/// Prefix shared by all provider pseudo-parameters.
pub const PSEUDO_PREFIX: &str = "AWS::";

/// `{"Ref": id}`.
#[must_use]
pub fn ref_to(id: &LogicalId) -> Value {
    json!({ "Ref": id.as_str() })
}

/// `{"Ref": "AWS::Region"}`.
#[must_use]
pub fn region() -> Value {
    json!({ "Ref": AWS_REGION })
}

/// `{"Fn::GetAtt": [id, attribute]}`.
#[must_use]
pub fn get_att(id: &LogicalId, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [id.as_str(), attribute] })
}

/// `{"Fn::Base64": value}`.
#[must_use]
pub fn base64(value: Value) -> Value {
    json!({ "Fn::Base64": value })
}

/// `{"Fn::Join": [separator, parts]}`.
#[must_use]
pub fn join(separator: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [separator, parts] })
}

/// The `index`-th availability zone of the deployment region.
#[must_use]
pub fn availability_zone(index: usize) -> Value {
    json!({ "Fn::Select": [index, { "Fn::GetAZs": "" }] })
}

/// Whether `name` is a provider pseudo-parameter such as `AWS::Region`.
#[must_use]
pub fn is_pseudo_parameter(name: &str) -> bool {
    name.starts_with(PSEUDO_PREFIX)
}

/// Collects every logical id named by a `Ref` or `Fn::GetAtt` inside
/// `value`, in document order. Pseudo-parameters are included.
#[must_use]
pub fn references(value: &Value) -> Vec<String> {
    let mut found = Vec::new();
    collect_references(value, &mut found);
    found
}

fn collect_references(value: &Value, found: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(target)) = map.get("Ref") {
                    found.push(target.clone());
                    return;
                }
                if let Some(Value::Array(args)) = map.get("Fn::GetAtt") {
                    if let Some(Value::String(target)) = args.first() {
                        found.push(target.clone());
                    }
                    return;
                }
            }
            for nested in map.values() {
                collect_references(nested, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, found);
            }
        }
        _ => {}
    }
}
