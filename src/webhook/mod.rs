//! Pod admission mutation
//!
//! Turns an `AdmissionRequest<Pod>` into an `AdmissionResponse` carrying a
//! JSON patch with the injected instrumentation. Serving the requests over
//! HTTPS is left to the embedding binary; everything here works on the
//! decoded admission types. The `review` CLI command drives
//! [`review_pod`] with a [`KubeInstrumentationSource`] against the live
//! cluster.

pub mod pod;

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ListParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;

use crate::apm::InjectorRegistry;
use crate::crd::Instrumentation;
use crate::Result;

pub use pod::{apply_instrumentations, build_patch, mutate_pod, review_pod};

/// Where the admission layer finds namespaces and Instrumentations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InstrumentationSource: Send + Sync {
    /// Fetch the namespace a pod is being created in
    async fn namespace(&self, name: &str) -> Result<Namespace>;

    /// All Instrumentations in `namespace`
    async fn instrumentations(&self, namespace: &str) -> Result<Vec<Instrumentation>>;
}

/// [`InstrumentationSource`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeInstrumentationSource {
    client: Client,
}

impl KubeInstrumentationSource {
    /// Create a source using `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InstrumentationSource for KubeInstrumentationSource {
    async fn namespace(&self, name: &str) -> Result<Namespace> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get(name).await?)
    }

    async fn instrumentations(&self, namespace: &str) -> Result<Vec<Instrumentation>> {
        let api: Api<Instrumentation> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }
}

/// Shared state for pod mutation
#[derive(Clone)]
pub struct WebhookState {
    /// Injectors by language
    pub registry: Arc<InjectorRegistry>,
    /// Namespace and Instrumentation lookup
    pub source: Arc<dyn InstrumentationSource>,
}

impl WebhookState {
    /// Create a new webhook state
    pub fn new(registry: Arc<InjectorRegistry>, source: Arc<dyn InstrumentationSource>) -> Self {
        Self { registry, source }
    }
}
