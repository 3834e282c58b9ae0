//! Assertions over a synthesized template.
//!
//! [`TemplateAssertions::matches`] compares a template against a baseline
//! document; the query helpers check individual resources the way unit tests
//! of infrastructure code usually do.

use std::fmt;
use std::str::FromStr;

use ecsynth_common::error::{Result, StackError};
use ecsynth_common::types::LogicalId;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::template::{Resource, Template};

/// How a template is compared against a baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchStyle {
    /// Template and baseline are identical documents.
    #[default]
    Exact,
    /// Every baseline resource exists in the template with an identical
    /// definition; extra template resources are allowed.
    Superset,
}

impl FromStr for MatchStyle {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exact" => Ok(Self::Exact),
            "superset" => Ok(Self::Superset),
            other => Err(StackError::config(format!(
                "unknown match style \"{other}\" (expected exact or superset)"
            ))),
        }
    }
}

impl fmt::Display for MatchStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Superset => write!(f, "superset"),
        }
    }
}

/// One difference between a template and its baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    /// The baseline has a value the template lacks.
    Missing {
        /// Location in the document.
        path: String,
        /// Baseline value.
        expected: Value,
    },
    /// The template has a value the baseline lacks.
    Unexpected {
        /// Location in the document.
        path: String,
        /// Template value.
        actual: Value,
    },
    /// Both documents have a value at `path` and they differ.
    Different {
        /// Location in the document.
        path: String,
        /// Baseline value.
        expected: Value,
        /// Template value.
        actual: Value,
    },
    /// An empty baseline was used for a superset comparison.
    EmptyBaseline,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { path, expected } => write!(f, "{path}: missing, expected {expected}"),
            Self::Unexpected { path, actual } => write!(f, "{path}: unexpected {actual}"),
            Self::Different { path, expected, actual } => {
                write!(f, "{path}: expected {expected}, found {actual}")
            }
            Self::EmptyBaseline => write!(f, "/Resources: baseline declares no resources to match"),
        }
    }
}

/// A failed template assertion.
#[derive(Debug, Error)]
pub enum AssertionError {
    /// The template differs from the baseline.
    #[error("template does not match baseline ({style}): {} difference(s)", .mismatches.len())]
    Mismatch {
        /// Comparison style used.
        style: MatchStyle,
        /// Every difference found.
        mismatches: Vec<Mismatch>,
    },

    /// The number of resources of a type differs.
    #[error("expected {expected} {resource_type} resource(s), found {actual}")]
    Count {
        /// Resource type counted.
        resource_type: String,
        /// Expected count.
        expected: usize,
        /// Actual count.
        actual: usize,
    },

    /// No resource of a type has the expected properties.
    #[error("no {resource_type} resource matches the expected properties ({candidates} candidate(s))")]
    NoMatch {
        /// Resource type searched.
        resource_type: String,
        /// Number of resources of that type.
        candidates: usize,
    },
}

/// Assertions bound to one template.
#[derive(Debug)]
pub struct TemplateAssertions<'a> {
    template: &'a Template,
    document: Value,
}

impl<'a> TemplateAssertions<'a> {
    /// Prepares assertions over `template`.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be serialized.
    pub fn new(template: &'a Template) -> Result<Self> {
        Ok(Self {
            template,
            document: template.to_value()?,
        })
    }

    /// Compares the template against `baseline`.
    ///
    /// An empty baseline (`{"Resources": {}}`) is a placeholder: it matches
    /// only an empty template under [`MatchStyle::Exact`] and never under
    /// [`MatchStyle::Superset`].
    ///
    /// # Errors
    ///
    /// Returns [`AssertionError::Mismatch`] listing every difference.
    pub fn matches(&self, baseline: &Value, style: MatchStyle) -> std::result::Result<(), AssertionError> {
        let mut mismatches = Vec::new();
        match style {
            MatchStyle::Exact => diff(&self.document, baseline, "", &mut mismatches),
            MatchStyle::Superset => {
                let expected = resources_of(baseline);
                if expected.is_none_or(Map::is_empty) {
                    mismatches.push(Mismatch::EmptyBaseline);
                }
                let actual = resources_of(&self.document);
                for (id, definition) in expected.into_iter().flatten() {
                    let path = format!("/Resources/{id}");
                    match actual.and_then(|resources| resources.get(id)) {
                        Some(found) => diff(found, definition, &path, &mut mismatches),
                        None => mismatches.push(Mismatch::Missing {
                            path,
                            expected: definition.clone(),
                        }),
                    }
                }
            }
        }
        if mismatches.is_empty() {
            tracing::debug!(%style, "template matches baseline");
            Ok(())
        } else {
            tracing::debug!(%style, differences = mismatches.len(), "template differs from baseline");
            Err(AssertionError::Mismatch { style, mismatches })
        }
    }

    /// Asserts the template declares exactly `count` resources of a type.
    ///
    /// # Errors
    ///
    /// Returns [`AssertionError::Count`] on a different count.
    pub fn resource_count_is(&self, resource_type: &str, count: usize) -> std::result::Result<(), AssertionError> {
        let actual = self.template.resources_of_type(resource_type).count();
        if actual == count {
            Ok(())
        } else {
            Err(AssertionError::Count {
                resource_type: resource_type.to_string(),
                expected: count,
                actual,
            })
        }
    }

    /// Asserts some resource of a type has properties containing `props`.
    ///
    /// Objects match when every expected key matches; arrays match
    /// element-wise and must have the same length.
    ///
    /// # Errors
    ///
    /// Returns [`AssertionError::NoMatch`] if no resource matches.
    pub fn has_resource_properties(&self, resource_type: &str, props: &Value) -> std::result::Result<(), AssertionError> {
        if self.find_resources_with(resource_type, props).is_empty() {
            Err(AssertionError::NoMatch {
                resource_type: resource_type.to_string(),
                candidates: self.template.resources_of_type(resource_type).count(),
            })
        } else {
            Ok(())
        }
    }

    /// Every resource of a type, in logical-id order.
    #[must_use]
    pub fn find_resources(&self, resource_type: &str) -> Vec<(&'a LogicalId, &'a Resource)> {
        self.template.resources_of_type(resource_type).collect()
    }

    /// Resources of a type whose properties contain `props`.
    #[must_use]
    pub fn find_resources_with(&self, resource_type: &str, props: &Value) -> Vec<(&'a LogicalId, &'a Resource)> {
        self.template
            .resources_of_type(resource_type)
            .filter(|(_, resource)| contains(&resource.properties, props))
            .collect()
    }
}

fn resources_of(document: &Value) -> Option<&Map<String, Value>> {
    document.get("Resources").and_then(Value::as_object)
}

/// Whether `actual` contains `expected` as a deep subset.
#[must_use]
pub fn contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => expected
            .iter()
            .all(|(key, value)| actual.get(key).is_some_and(|found| contains(found, value))),
        (Value::Array(actual), Value::Array(expected)) => {
            actual.len() == expected.len() && actual.iter().zip(expected).all(|(a, e)| contains(a, e))
        }
        _ => actual == expected,
    }
}

fn diff(actual: &Value, expected: &Value, path: &str, out: &mut Vec<Mismatch>) {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => {
            for (key, value) in expected {
                let child = format!("{path}/{key}");
                match actual.get(key) {
                    Some(found) => diff(found, value, &child, out),
                    None => out.push(Mismatch::Missing {
                        path: child,
                        expected: value.clone(),
                    }),
                }
            }
            for (key, value) in actual {
                if !expected.contains_key(key) {
                    out.push(Mismatch::Unexpected {
                        path: format!("{path}/{key}"),
                        actual: value.clone(),
                    });
                }
            }
        }
        (Value::Array(a), Value::Array(e)) if a.len() == e.len() => {
            for (index, (found, value)) in a.iter().zip(e).enumerate() {
                diff(found, value, &format!("{path}/{index}"), out);
            }
        }
        _ if actual != expected => out.push(Mismatch::Different {
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            expected: expected.clone(),
            actual: actual.clone(),
        }),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn template() -> Template {
        Template::from_json(
            &json!({
                "Resources": {
                    "Cluster": {"Type": "AWS::ECS::Cluster", "Properties": {}},
                    "Td": {
                        "Type": "AWS::ECS::TaskDefinition",
                        "Properties": {
                            "NetworkMode": "bridge",
                            "ContainerDefinitions": [
                                {"Name": "web2", "Memory": 512},
                                {"Name": "idsContainer", "Privileged": true},
                            ],
                        },
                    },
                },
            })
            .to_string(),
        )
        .expect("template")
    }

    #[test]
    fn exact_match_of_identical_document() {
        let template = template();
        let assertions = TemplateAssertions::new(&template).expect("assertions");
        let baseline = template.to_value().expect("value");
        assert!(assertions.matches(&baseline, MatchStyle::Exact).is_ok());
    }

    #[test]
    fn empty_baseline_only_matches_empty_template() {
        let placeholder = json!({"Resources": {}});
        let empty = Template::default();
        let assertions = TemplateAssertions::new(&empty).expect("assertions");
        assert!(assertions.matches(&placeholder, MatchStyle::Exact).is_ok());
        assert!(assertions.matches(&placeholder, MatchStyle::Superset).is_err());

        let full = template();
        let assertions = TemplateAssertions::new(&full).expect("assertions");
        let Err(AssertionError::Mismatch { mismatches, .. }) = assertions.matches(&placeholder, MatchStyle::Exact)
        else {
            panic!("expected mismatch");
        };
        assert_eq!(mismatches.len(), 2);
        assert!(mismatches.iter().all(|m| matches!(m, Mismatch::Unexpected { .. })));
    }

    #[test]
    fn superset_ignores_extra_resources() {
        let template = template();
        let assertions = TemplateAssertions::new(&template).expect("assertions");
        let baseline = json!({"Resources": {"Cluster": {"Type": "AWS::ECS::Cluster", "Properties": {}}}});
        assert!(assertions.matches(&baseline, MatchStyle::Superset).is_ok());
        assert!(assertions.matches(&baseline, MatchStyle::Exact).is_err());
    }

    #[test]
    fn superset_reports_changed_property_path() {
        let template = template();
        let assertions = TemplateAssertions::new(&template).expect("assertions");
        let mut baseline = template.to_value().expect("value");
        baseline["Resources"]["Td"]["Properties"]["NetworkMode"] = json!("awsvpc");
        let Err(AssertionError::Mismatch { mismatches, .. }) = assertions.matches(&baseline, MatchStyle::Superset)
        else {
            panic!("expected mismatch");
        };
        assert_eq!(
            mismatches,
            vec![Mismatch::Different {
                path: "/Resources/Td/Properties/NetworkMode".to_string(),
                expected: json!("awsvpc"),
                actual: json!("bridge"),
            }]
        );
    }

    #[test]
    fn resource_count_is_checks_type() {
        let template = template();
        let assertions = TemplateAssertions::new(&template).expect("assertions");
        assert!(assertions.resource_count_is("AWS::ECS::Cluster", 1).is_ok());
        assert!(assertions.resource_count_is("AWS::ECS::Service", 0).is_ok());
        let err = assertions.resource_count_is("AWS::ECS::Cluster", 2).unwrap_err();
        assert!(err.to_string().contains("found 1"), "got: {err}");
    }

    #[test]
    fn has_resource_properties_matches_subsets() {
        let template = template();
        let assertions = TemplateAssertions::new(&template).expect("assertions");
        assert!(
            assertions
                .has_resource_properties(
                    "AWS::ECS::TaskDefinition",
                    &json!({"ContainerDefinitions": [{"Name": "web2"}, {"Privileged": true}]}),
                )
                .is_ok()
        );
        // Arrays must match element-wise, not as a subsequence.
        assert!(
            assertions
                .has_resource_properties(
                    "AWS::ECS::TaskDefinition",
                    &json!({"ContainerDefinitions": [{"Name": "web2"}]}),
                )
                .is_err()
        );
        assert_eq!(
            assertions
                .find_resources_with("AWS::ECS::TaskDefinition", &json!({"NetworkMode": "bridge"}))
                .len(),
            1
        );
        assert_eq!(assertions.find_resources("AWS::ECS::TaskDefinition").len(), 1);
    }

    #[test]
    fn match_style_parses() {
        assert_eq!("exact".parse::<MatchStyle>().expect("style"), MatchStyle::Exact);
        assert_eq!("superset".parse::<MatchStyle>().expect("style"), MatchStyle::Superset);
        assert!("fuzzy".parse::<MatchStyle>().is_err());
    }
}
