//! Instrumentation CRD
//!
//! An Instrumentation tells the injector which APM agent to stage into
//! matching pods: the runtime flavor, the image carrying the agent payload,
//! extra environment for the application container, and the secret holding
//! the license key.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::core::v1::{EnvVar, Namespace, Pod, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Secret name used when `licenseKeySecret` is omitted
pub const DEFAULT_LICENSE_KEY_SECRET: &str = "newrelic-key-secret";

/// Instrumentation selects pods and describes the agent to inject into them.
///
/// Example:
/// ```yaml
/// apiVersion: newrelic.com/v1alpha2
/// kind: Instrumentation
/// metadata:
///   name: dotnet-windows
///   namespace: apps
/// spec:
///   agent:
///     language: dotnet-edge-windows
///     image: newrelic/newrelic-dotnet-windows-init:latest
///     env:
///       - name: NEW_RELIC_LOG_LEVEL
///         value: debug
///   licenseKeySecret: newrelic-key-secret
///   podLabelSelector:
///     matchLabels:
///       app.kubernetes.io/part-of: storefront
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "newrelic.com",
    version = "v1alpha2",
    kind = "Instrumentation",
    namespaced,
    printcolumn = r#"{"name":"Language","type":"string","jsonPath":".spec.agent.language"}"#,
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.agent.image"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentationSpec {
    /// Agent to inject
    pub agent: Agent,

    /// Name of the secret holding the license key
    #[serde(default = "default_license_key_secret")]
    pub license_key_secret: String,

    /// Only pods whose labels match are instrumented
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_label_selector: Option<LabelSelector>,

    /// Only pods in namespaces whose labels match are instrumented
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_label_selector: Option<LabelSelector>,
}

fn default_license_key_secret() -> String {
    DEFAULT_LICENSE_KEY_SECRET.to_string()
}

/// Agent description
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// Runtime flavor; selects the injector
    pub language: Language,

    /// Image whose filesystem carries the agent payload
    pub image: String,

    /// Environment appended to the application container when absent
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<AgentEnvVar>,

    /// Resources for the staging init container
    #[serde(default, skip_serializing_if = "AgentResources::is_empty")]
    pub resources: AgentResources,
}

/// Runtime flavors the operator knows how to instrument
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub enum Language {
    /// .NET Framework and .NET (Core) on Windows nodes
    #[serde(rename = "dotnet-edge-windows")]
    DotnetEdgeWindows,
}

impl Language {
    /// Every language, in registration order
    pub const ALL: &'static [Language] = &[Language::DotnetEdgeWindows];

    /// Wire name as used in `spec.agent.language`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DotnetEdgeWindows => "dotnet-edge-windows",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| crate::Error::validation(format!("unsupported language '{s}'")))
    }
}

/// A plain name/value environment variable
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct AgentEnvVar {
    /// Variable name
    pub name: String,
    /// Variable value
    #[serde(default)]
    pub value: String,
}

impl AgentEnvVar {
    /// Create a new env var
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Convert to the core/v1 representation
    pub fn to_env_var(&self) -> EnvVar {
        EnvVar {
            name: self.name.clone(),
            value: Some(self.value.clone()),
            value_from: None,
        }
    }
}

/// Resource limits and requests for the init container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct AgentResources {
    /// Resource limits (e.g., `cpu: 500m`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,

    /// Resource requests (e.g., `memory: 64Mi`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

impl AgentResources {
    /// True when neither limits nor requests are set
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty() && self.requests.is_empty()
    }

    /// Convert to core/v1 requirements
    pub fn to_requirements(&self) -> ResourceRequirements {
        fn quantities(map: &BTreeMap<String, String>) -> Option<BTreeMap<String, Quantity>> {
            if map.is_empty() {
                return None;
            }
            Some(
                map.iter()
                    .map(|(k, v)| (k.clone(), Quantity(v.clone())))
                    .collect(),
            )
        }

        ResourceRequirements {
            limits: quantities(&self.limits),
            requests: quantities(&self.requests),
            ..Default::default()
        }
    }
}

/// Equality-based label selector.
///
/// Only `matchLabels` is supported. `matchExpressions` is not part of the
/// schema, so the API server prunes it on admission and it has no effect on
/// selection.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Labels that must all be present with these values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Whether `labels` satisfies every `matchLabels` entry.
    /// An empty selector matches everything.
    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
    }
}

impl Instrumentation {
    /// Resource name, or "unknown" for objects built without metadata
    pub fn name(&self) -> &str {
        self.metadata
            .name
            .as_deref()
            .unwrap_or(crate::error::UNKNOWN_CONTEXT)
    }

    /// Whether this instrumentation selects `pod` running in `namespace`
    pub fn selects(&self, namespace: &Namespace, pod: &Pod) -> bool {
        let pod_ok = self
            .spec
            .pod_label_selector
            .as_ref()
            .is_none_or(|s| s.matches(pod.metadata.labels.as_ref()));
        let ns_ok = self
            .spec
            .namespace_label_selector
            .as_ref()
            .is_none_or(|s| s.matches(namespace.metadata.labels.as_ref()));
        pod_ok && ns_ok
    }
}
