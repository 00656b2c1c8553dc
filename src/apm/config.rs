//! Agent configuration delegated after structural injection
//!
//! Injectors hand the mutated pod to a [`ConfigInjector`], which attaches the
//! license key reference and whatever identifying environment the agent needs.
//! The contract has no error path: implementations must be idempotent and
//! leave the pod usable whatever they find.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, Namespace, ObjectFieldSelector, Pod, SecretKeySelector,
};
#[cfg(test)]
use mockall::automock;

use super::env::{push_env_var_if_absent, set_env_var};
use crate::crd::AgentResources;

/// Key inside the license secret
pub const LICENSE_KEY: &str = "new_relic_license_key";

/// Application name reported by the agent
pub const ENV_APP_NAME: &str = "NEW_RELIC_APP_NAME";
/// License key, resolved from the secret
pub const ENV_LICENSE_KEY: &str = "NEW_RELIC_LICENSE_KEY";
/// Tells the agent it was configured by the operator
pub const ENV_OPERATOR_ENABLED: &str = "NEW_RELIC_K8S_OPERATOR_ENABLED";
/// Cluster name metadata
pub const ENV_CLUSTER_NAME: &str = "NEW_RELIC_METADATA_KUBERNETES_CLUSTER_NAME";
/// Node name metadata
pub const ENV_NODE_NAME: &str = "NEW_RELIC_METADATA_KUBERNETES_NODE_NAME";
/// Namespace metadata
pub const ENV_NAMESPACE_NAME: &str = "NEW_RELIC_METADATA_KUBERNETES_NAMESPACE_NAME";
/// Pod name metadata
pub const ENV_POD_NAME: &str = "NEW_RELIC_METADATA_KUBERNETES_POD_NAME";
/// Container name metadata
pub const ENV_CONTAINER_NAME: &str = "NEW_RELIC_METADATA_KUBERNETES_CONTAINER_NAME";

const POD_TEMPLATE_HASH_LABEL: &str = "pod-template-hash";

/// Collaborator that finishes agent configuration on the target container
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigInjector: Send + Sync {
    /// Configure `pod.spec.containers[container_index]`.
    ///
    /// `license_key_secret` names the secret holding the license key;
    /// `resources` are the agent resources from the Instrumentation.
    async fn inject(
        &self,
        resources: &AgentResources,
        namespace: &Namespace,
        pod: &mut Pod,
        container_index: usize,
        license_key_secret: &str,
    );
}

/// Workload kinds that can own a pod, directly or through a ReplicaSet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadKind {
    /// apps/v1 Deployment
    Deployment,
    /// apps/v1 StatefulSet
    StatefulSet,
    /// apps/v1 DaemonSet
    DaemonSet,
    /// batch/v1 CronJob
    CronJob,
    /// batch/v1 Job
    Job,
    /// apps/v1 ReplicaSet
    ReplicaSet,
}

impl WorkloadKind {
    /// Metadata env var carrying this owner's name
    pub fn metadata_env(&self) -> &'static str {
        match self {
            Self::Deployment => "NEW_RELIC_METADATA_KUBERNETES_DEPLOYMENT_NAME",
            Self::StatefulSet => "NEW_RELIC_METADATA_KUBERNETES_STATEFULSET_NAME",
            Self::DaemonSet => "NEW_RELIC_METADATA_KUBERNETES_DAEMONSET_NAME",
            Self::CronJob => "NEW_RELIC_METADATA_KUBERNETES_CRONJOB_NAME",
            Self::Job => "NEW_RELIC_METADATA_KUBERNETES_JOB_NAME",
            Self::ReplicaSet => "NEW_RELIC_METADATA_KUBERNETES_REPLICASET_NAME",
        }
    }
}

/// Owners of `pod`, outermost first.
///
/// Only the controller reference is followed (the first reference when none
/// is marked). Deployments are derived from the ReplicaSet name and the
/// `pod-template-hash` label, which the Deployment controller always sets.
/// A Job's own owner is not visible from the pod, so Jobs are reported as
/// themselves even when a CronJob created them.
pub fn resolve_owners(pod: &Pod) -> Vec<(WorkloadKind, String)> {
    let Some(refs) = pod.metadata.owner_references.as_deref() else {
        return vec![];
    };
    let Some(owner) = refs
        .iter()
        .find(|r| r.controller == Some(true))
        .or_else(|| refs.first())
    else {
        return vec![];
    };

    let name = owner.name.clone();
    match owner.kind.as_str() {
        "ReplicaSet" => {
            let hash = pod
                .metadata
                .labels
                .as_ref()
                .and_then(|l| l.get(POD_TEMPLATE_HASH_LABEL));
            let deployment = hash.and_then(|h| name.strip_suffix(&format!("-{h}")));
            match deployment {
                Some(d) if !d.is_empty() => vec![
                    (WorkloadKind::Deployment, d.to_string()),
                    (WorkloadKind::ReplicaSet, name),
                ],
                _ => vec![(WorkloadKind::ReplicaSet, name)],
            }
        }
        "Job" => vec![(WorkloadKind::Job, name)],
        "CronJob" => vec![(WorkloadKind::CronJob, name)],
        "StatefulSet" => vec![(WorkloadKind::StatefulSet, name)],
        "DaemonSet" => vec![(WorkloadKind::DaemonSet, name)],
        _ => vec![],
    }
}

/// Name the agent reports for the application in `container`.
///
/// Outermost workload owner, then pod name, then `generateName` without its
/// trailing dash, then the container name.
pub fn resolve_app_name(pod: &Pod, container: &Container) -> String {
    if let Some((_, name)) = resolve_owners(pod).into_iter().next() {
        return name;
    }
    if let Some(name) = pod.metadata.name.as_deref().filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    if let Some(generate) = pod
        .metadata
        .generate_name
        .as_deref()
        .map(|g| g.trim_end_matches('-'))
        .filter(|g| !g.is_empty())
    {
        return generate.to_string();
    }
    container.name.clone()
}

fn field_ref(path: &str) -> Option<EnvVarSource> {
    Some(EnvVarSource {
        field_ref: Some(ObjectFieldSelector {
            field_path: path.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Default collaborator: license key reference, app name and Kubernetes
/// metadata for the New Relic agent.
#[derive(Clone, Debug, Default)]
pub struct NewrelicConfigInjector {
    cluster_name: Option<String>,
}

impl NewrelicConfigInjector {
    /// Create a config injector; `cluster_name` is reported when set
    pub fn new(cluster_name: Option<String>) -> Self {
        Self { cluster_name }
    }

    fn configure(
        &self,
        namespace: &Namespace,
        pod: &mut Pod,
        container_index: usize,
        license_key_secret: &str,
    ) {
        let owners = resolve_owners(pod);
        let Some(app_name) = pod
            .spec
            .as_ref()
            .and_then(|s| s.containers.get(container_index))
            .map(|c| resolve_app_name(pod, c))
        else {
            return;
        };
        let Some(container) = pod
            .spec
            .as_mut()
            .and_then(|s| s.containers.get_mut(container_index))
        else {
            return;
        };

        set_env_var(container, ENV_APP_NAME, &app_name);

        push_env_var_if_absent(
            container,
            EnvVar {
                name: ENV_LICENSE_KEY.to_string(),
                value: None,
                value_from: Some(EnvVarSource {
                    secret_key_ref: Some(SecretKeySelector {
                        name: license_key_secret.to_string(),
                        key: LICENSE_KEY.to_string(),
                        optional: Some(true),
                    }),
                    ..Default::default()
                }),
            },
        );

        set_env_var(container, ENV_OPERATOR_ENABLED, "true");

        if let Some(cluster) = self.cluster_name.as_deref() {
            set_env_var(container, ENV_CLUSTER_NAME, cluster);
        }
        push_env_var_if_absent(
            container,
            EnvVar {
                name: ENV_NODE_NAME.to_string(),
                value: None,
                value_from: field_ref("spec.nodeName"),
            },
        );
        if let Some(ns) = namespace.metadata.name.as_deref() {
            set_env_var(container, ENV_NAMESPACE_NAME, ns);
        }
        push_env_var_if_absent(
            container,
            EnvVar {
                name: ENV_POD_NAME.to_string(),
                value: None,
                value_from: field_ref("metadata.name"),
            },
        );
        let container_name = container.name.clone();
        set_env_var(container, ENV_CONTAINER_NAME, &container_name);

        for (kind, name) in owners {
            set_env_var(container, kind.metadata_env(), &name);
        }
    }
}

#[async_trait]
impl ConfigInjector for NewrelicConfigInjector {
    async fn inject(
        &self,
        _resources: &AgentResources,
        namespace: &Namespace,
        pod: &mut Pod,
        container_index: usize,
        license_key_secret: &str,
    ) {
        self.configure(namespace, pod, container_index, license_key_secret);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn owner(kind: &str, name: &str) -> OwnerReference {
        OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: "uid".to_string(),
            controller: Some(true),
            ..Default::default()
        }
    }

    fn pod(owners: Vec<OwnerReference>, labels: &[(&str, &str)]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("web-7d4b9c6f5-x2x9z".to_string()),
                owner_references: Some(owners),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "app".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn namespace(name: &str) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn env_value<'a>(pod: &'a Pod, name: &str) -> Option<&'a EnvVar> {
        pod.spec.as_ref()?.containers[0]
            .env
            .as_ref()?
            .iter()
            .find(|e| e.name == name)
    }

    #[test]
    fn deployment_is_derived_from_replicaset_hash() {
        let p = pod(
            vec![owner("ReplicaSet", "web-7d4b9c6f5")],
            &[("pod-template-hash", "7d4b9c6f5")],
        );
        assert_eq!(
            resolve_owners(&p),
            vec![
                (WorkloadKind::Deployment, "web".to_string()),
                (WorkloadKind::ReplicaSet, "web-7d4b9c6f5".to_string()),
            ]
        );
    }

    #[test]
    fn bare_replicaset_without_hash_label() {
        let p = pod(vec![owner("ReplicaSet", "web-7d4b9c6f5")], &[]);
        assert_eq!(
            resolve_owners(&p),
            vec![(WorkloadKind::ReplicaSet, "web-7d4b9c6f5".to_string())]
        );
    }

    #[test]
    fn job_is_reported_as_itself() {
        let p = pod(vec![owner("Job", "migrate-db")], &[]);
        assert_eq!(
            resolve_owners(&p),
            vec![(WorkloadKind::Job, "migrate-db".to_string())]
        );
    }

    #[test]
    fn numeric_suffixed_job_is_not_mistaken_for_cronjob() {
        let p = pod(vec![owner("Job", "backup-20240101")], &[]);
        assert_eq!(
            resolve_owners(&p),
            vec![(WorkloadKind::Job, "backup-20240101".to_string())]
        );
        let container = &p.spec.as_ref().unwrap().containers[0];
        assert_eq!(resolve_app_name(&p, container), "backup-20240101");
    }

    #[tokio::test]
    async fn plain_job_gets_no_cronjob_metadata() {
        let mut p = pod(vec![owner("Job", "backup-20240101")], &[]);
        NewrelicConfigInjector::default()
            .inject(&AgentResources::default(), &namespace("apps"), &mut p, 0, "s")
            .await;

        assert!(env_value(&p, WorkloadKind::CronJob.metadata_env()).is_none());
        assert_eq!(
            env_value(&p, WorkloadKind::Job.metadata_env())
                .unwrap()
                .value
                .as_deref(),
            Some("backup-20240101")
        );
        assert_eq!(
            env_value(&p, ENV_APP_NAME).unwrap().value.as_deref(),
            Some("backup-20240101")
        );
    }

    #[test]
    fn controller_reference_is_preferred() {
        let mut not_controller = owner("DaemonSet", "agent");
        not_controller.controller = None;
        let p = pod(vec![not_controller, owner("StatefulSet", "db")], &[]);
        assert_eq!(
            resolve_owners(&p),
            vec![(WorkloadKind::StatefulSet, "db".to_string())]
        );
    }

    #[test]
    fn app_name_fallbacks() {
        let mut p = pod(vec![], &[]);
        let container = Container {
            name: "app".to_string(),
            ..Default::default()
        };
        assert_eq!(resolve_app_name(&p, &container), "web-7d4b9c6f5-x2x9z");

        p.metadata.name = None;
        p.metadata.generate_name = Some("web-".to_string());
        assert_eq!(resolve_app_name(&p, &container), "web");

        p.metadata.generate_name = None;
        assert_eq!(resolve_app_name(&p, &container), "app");
    }

    #[tokio::test]
    async fn newrelic_config_sets_license_and_metadata() {
        let mut p = pod(
            vec![owner("ReplicaSet", "web-7d4b9c6f5")],
            &[("pod-template-hash", "7d4b9c6f5")],
        );
        let injector = NewrelicConfigInjector::new(Some("prod-east".to_string()));

        injector
            .inject(
                &AgentResources::default(),
                &namespace("apps"),
                &mut p,
                0,
                "my-secret",
            )
            .await;

        assert_eq!(
            env_value(&p, ENV_APP_NAME).unwrap().value.as_deref(),
            Some("web")
        );
        let license = env_value(&p, ENV_LICENSE_KEY).unwrap();
        let selector = license
            .value_from
            .as_ref()
            .unwrap()
            .secret_key_ref
            .as_ref()
            .unwrap();
        assert_eq!(selector.name, "my-secret");
        assert_eq!(selector.key, LICENSE_KEY);
        assert_eq!(selector.optional, Some(true));

        assert_eq!(
            env_value(&p, ENV_CLUSTER_NAME).unwrap().value.as_deref(),
            Some("prod-east")
        );
        assert_eq!(
            env_value(&p, ENV_NAMESPACE_NAME).unwrap().value.as_deref(),
            Some("apps")
        );
        assert_eq!(
            env_value(&p, "NEW_RELIC_METADATA_KUBERNETES_DEPLOYMENT_NAME")
                .unwrap()
                .value
                .as_deref(),
            Some("web")
        );
        let node = env_value(&p, ENV_NODE_NAME).unwrap();
        assert_eq!(
            node.value_from.as_ref().unwrap().field_ref.as_ref().unwrap().field_path,
            "spec.nodeName"
        );
    }

    #[tokio::test]
    async fn newrelic_config_respects_user_values_and_is_idempotent() {
        let mut p = pod(vec![], &[]);
        p.spec.as_mut().unwrap().containers[0].env = Some(vec![EnvVar {
            name: ENV_APP_NAME.to_string(),
            value: Some("custom".to_string()),
            value_from: None,
        }]);
        let injector = NewrelicConfigInjector::default();
        let ns = namespace("apps");

        injector
            .inject(&AgentResources::default(), &ns, &mut p, 0, "s")
            .await;
        let once = p.clone();
        injector
            .inject(&AgentResources::default(), &ns, &mut p, 0, "s")
            .await;

        assert_eq!(p, once);
        assert_eq!(
            env_value(&p, ENV_APP_NAME).unwrap().value.as_deref(),
            Some("custom")
        );
        assert!(env_value(&p, ENV_CLUSTER_NAME).is_none());
    }

    #[tokio::test]
    async fn out_of_range_container_is_ignored() {
        let mut p = pod(vec![], &[]);
        let before = p.clone();
        NewrelicConfigInjector::default()
            .inject(&AgentResources::default(), &namespace("apps"), &mut p, 3, "s")
            .await;
        assert_eq!(p, before);
    }
}
