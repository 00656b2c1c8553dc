//! Error types for APM instrumentation injection
//!
//! Skipping a pod that an injector does not handle is not an error; those
//! paths return `Ok(())`. Everything here is surfaced to the admission layer,
//! which decides how to report it.

use std::fmt;

use thiserror::Error;

use crate::crd::Language;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Where a marker environment variable was found
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvLocation {
    /// The env list of the container being instrumented
    Container,
    /// The `spec.agent.env` list of the Instrumentation resource
    InstrumentationSpec,
}

impl fmt::Display for EnvLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container => f.write_str("container"),
            Self::InstrumentationSpec => f.write_str("instrumentation spec"),
        }
    }
}

/// Main error type for injection operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Instrumentation resource is missing a required field or has a malformed one
    #[error("validation error for {instrumentation}: {message}")]
    Validation {
        /// Name of the offending Instrumentation
        instrumentation: String,
        /// Field path (e.g., "spec.agent.image")
        field: Option<String>,
        /// Description of what's invalid
        message: String,
    },

    /// A marker variable shows the pod was already instrumented
    #[error("{variable} environment variable is already set in the {location}")]
    Conflict {
        /// Name of the marker variable
        variable: String,
        /// Where the marker was found
        location: EnvLocation,
    },

    /// An injector for this language is already registered
    #[error("an injector for language {0} is already registered")]
    DuplicateLanguage(Language),

    /// No injector is registered for this language
    #[error("no injector registered for language {0}")]
    UnknownLanguage(Language),

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a validation error without instrumentation context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            instrumentation: UNKNOWN_CONTEXT.to_string(),
            field: None,
            message: msg.into(),
        }
    }

    /// Create a validation error naming the instrumentation and field path
    pub fn validation_for_field(
        instrumentation: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            instrumentation: instrumentation.into(),
            field: Some(field.into()),
            message: msg.into(),
        }
    }

    /// Create a conflict error for a marker variable
    pub fn conflict(variable: impl Into<String>, location: EnvLocation) -> Self {
        Self::Conflict {
            variable: variable.into(),
            location,
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Whether this error means the pod already carries instrumentation
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_variable_and_location() {
        let err = Error::conflict("CORECLR_NEWRELIC_HOME", EnvLocation::Container);
        assert_eq!(
            err.to_string(),
            "CORECLR_NEWRELIC_HOME environment variable is already set in the container"
        );
        assert!(err.is_conflict());

        let err = Error::conflict("NEWRELIC_HOME", EnvLocation::InstrumentationSpec);
        assert!(err.to_string().ends_with("in the instrumentation spec"));
    }

    #[test]
    fn validation_error_carries_field() {
        let err = Error::validation_for_field("dotnet", "spec.agent.image", "must not be empty");
        match &err {
            Error::Validation {
                instrumentation,
                field,
                ..
            } => {
                assert_eq!(instrumentation, "dotnet");
                assert_eq!(field.as_deref(), Some("spec.agent.image"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("dotnet"));
        assert!(!err.is_conflict());
    }

    #[test]
    fn plain_validation_uses_unknown_context() {
        let err = Error::validation("bad");
        assert!(err.to_string().contains(UNKNOWN_CONTEXT));
    }

    #[test]
    fn registry_errors_name_language() {
        let err = Error::DuplicateLanguage(Language::DotnetEdgeWindows);
        assert!(err.to_string().contains("dotnet-edge-windows"));
        let err = Error::UnknownLanguage(Language::DotnetEdgeWindows);
        assert!(err.to_string().contains("no injector"));
    }

    #[test]
    fn serde_errors_become_serialization() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(err.to_string().starts_with("serialization error"));
    }
}
