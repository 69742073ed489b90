//! Unified error types for the unitsmith workspace.
//!
//! Every failure is fatal to the current resolution. Variants carry the
//! service, field, and offending value so a message can be traced back to
//! its place in the manifest.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum UnitsmithError {
    /// A dependency, network-mode peer, network, or volume does not exist.
    #[error("service \"{service}\" depends on non-existent {kind} \"{name}\"")]
    UnresolvedReference {
        /// Service holding the reference.
        service: String,
        /// Kind of the referenced resource (`service`, `network`, `volume`).
        kind: &'static str,
        /// Name that failed to resolve.
        name: String,
    },

    /// A manifest value falls outside the supported grammar.
    #[error("service \"{service}\": unsupported {field}: \"{value}\"")]
    UnsupportedValue {
        /// Service holding the value.
        service: String,
        /// Manifest field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },

    /// A label in the reserved namespace does not match the override pattern.
    #[error("invalid label specified for service \"{service}\": \"{label}\" ({reason})")]
    MalformedLabel {
        /// Service carrying the label.
        service: String,
        /// Full label key.
        label: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A required input file does not exist.
    #[error("service \"{service}\": env file does not exist: {}", path.display())]
    MissingInput {
        /// Service that references the file (empty for CLI-supplied files).
        service: String,
        /// Absolute path that was checked.
        path: PathBuf,
    },

    /// Services depend on each other in a loop.
    #[error("cyclic dependency detected between services: {services}")]
    CyclicDependency {
        /// Services participating in the cycle.
        services: String,
    },

    /// The manifest could not be loaded or a short-syntax value is malformed.
    #[error("invalid manifest: {message}")]
    Manifest {
        /// Description of the problem.
        message: String,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl UnitsmithError {
    /// Shorthand for an [`UnitsmithError::UnsupportedValue`].
    pub fn unsupported(
        service: impl Into<String>,
        field: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self::UnsupportedValue {
            service: service.into(),
            field,
            value: value.into(),
        }
    }

    /// Shorthand for an [`UnitsmithError::Manifest`].
    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, UnitsmithError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_reference_names_both_services() {
        let err = UnitsmithError::UnresolvedReference {
            service: "web".into(),
            kind: "service",
            name: "db".into(),
        };
        assert_eq!(
            err.to_string(),
            "service \"web\" depends on non-existent service \"db\""
        );
    }

    #[test]
    fn unsupported_value_carries_field_and_value() {
        let msg = UnitsmithError::unsupported("web", "restart", "sometimes").to_string();
        assert!(msg.contains("restart"), "got: {msg}");
        assert!(msg.contains("sometimes"), "got: {msg}");
    }

    #[test]
    fn missing_input_displays_path() {
        let err = UnitsmithError::MissingInput {
            service: "web".into(),
            path: PathBuf::from("/nope/.env"),
        };
        assert!(err.to_string().contains("/nope/.env"));
    }
}
