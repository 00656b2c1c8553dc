//! APM agent injection for Kubernetes pods
//!
//! Mutates pod specs so that an APM agent is loaded into the application
//! container, driven by `Instrumentation` custom resources.
//!
//! # Modules
//!
//! - [`crd`] - The Instrumentation CRD and the [`crd::Language`] tag
//! - [`apm`] - Injector trait, per-flavor tables, and the injector registry
//! - [`webhook`] - Admission request → patched admission response
//! - [`config`] - Operator configuration
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod apm;
pub mod config;
pub mod crd;
pub mod error;
pub mod telemetry;
pub mod webhook;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
