//! Custom Resource Definitions
//!
//! The Instrumentation CRD drives every injection.

mod instrumentation;

pub use instrumentation::{
    Agent, AgentEnvVar, AgentResources, Instrumentation, InstrumentationSpec, LabelSelector,
    Language, DEFAULT_LICENSE_KEY_SECRET,
};
