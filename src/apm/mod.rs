//! APM agent injection
//!
//! An [`Injector`] mutates a pod so that the agent for one runtime flavor is
//! loaded when the application starts: profiler environment on the first
//! container, a shared `emptyDir` volume, and an init container that copies
//! the agent payload out of the Instrumentation's image.
//!
//! # Ownership
//!
//! Injection mutates the caller's pod in place. All checks run before the
//! first write, so when `inject` returns an error the pod is exactly as it
//! was passed in. Callers that need the original (for example to compute a
//! JSON patch) clone it first.
//!
//! # Flavors
//!
//! Every flavor is served by [`ProfileInjector`] reading a [`FlavorProfile`]
//! table; [`InjectorRegistry`] maps each [`Language`] to its injector.

pub mod base;
pub mod config;
pub mod env;
pub mod injector;
pub mod profile;
pub mod registry;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod};

use crate::crd::{Instrumentation, Language};
use crate::Result;

pub use config::{ConfigInjector, NewrelicConfigInjector};
pub use injector::ProfileInjector;
pub use profile::FlavorProfile;
pub use registry::InjectorRegistry;

/// Mutation policy for one runtime flavor
#[async_trait]
pub trait Injector: Send + Sync {
    /// Language this injector is registered under
    fn language(&self) -> Language;

    /// Instrument `pod` according to `inst`.
    ///
    /// Returns `Ok(())` without touching the pod when the instrumentation is
    /// for another language or the pod has no containers. Returns
    /// [`crate::Error::Validation`] for a malformed Instrumentation and
    /// [`crate::Error::Conflict`] when a marker variable shows the pod is
    /// already instrumented; in both cases the pod is unchanged.
    async fn inject(&self, inst: &Instrumentation, namespace: &Namespace, pod: &mut Pod)
        -> Result<()>;
}
