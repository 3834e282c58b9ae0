//! Unified error types for the ecsynth workspace.
//!
//! Every failure of template synthesis, from a malformed CIDR in a config
//! file to a mount point naming a volume of another task definition, is
//! reported through [`StackError`].

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum StackError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A CIDR block could not be parsed or carved.
    #[error("invalid CIDR block {cidr}: {reason}")]
    InvalidCidr {
        /// The offending CIDR text.
        cidr: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A referenced declaration does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of the missing declaration.
        kind: &'static str,
        /// Identifier of the missing declaration.
        id: String,
    },

    /// Two declarations share a name that must be unique.
    #[error("duplicate {kind}: {id}")]
    Duplicate {
        /// Kind of the duplicated declaration.
        kind: &'static str,
        /// The duplicated name.
        id: String,
    },

    /// A handle issued by one construct was used with another.
    #[error("{kind} handle belongs to a different {owner}")]
    ForeignHandle {
        /// Kind of handle that was misused.
        kind: &'static str,
        /// Kind of construct the handle should belong to.
        owner: &'static str,
    },

    /// A resource refers to a logical id that is not declared.
    #[error("resource {from} refers to undeclared {to}")]
    DanglingReference {
        /// Logical id of the referring resource.
        from: String,
        /// The missing target.
        to: String,
    },

    /// The resource dependency graph contains a cycle.
    #[error("cyclic dependency detected in resource graph at {id}")]
    Cycle {
        /// A logical id participating in the cycle.
        id: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// YAML serialization or deserialization failed.
    #[error("YAML error: {source}")]
    Yaml {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },
}

impl StackError {
    /// Shorthand for a [`StackError::Config`] with a formatted message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, StackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_kind_and_id() {
        let err = StackError::NotFound {
            kind: "volume",
            id: "docker-socket".into(),
        };
        assert_eq!(err.to_string(), "volume not found: docker-socket");
    }

    #[test]
    fn foreign_handle_message_names_owner() {
        let err = StackError::ForeignHandle {
            kind: "container",
            owner: "task definition",
        };
        assert_eq!(
            err.to_string(),
            "container handle belongs to a different task definition"
        );
    }

    #[test]
    fn json_errors_convert() {
        let source = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: StackError = source.into();
        assert!(err.to_string().starts_with("serialization error"));
    }
}
