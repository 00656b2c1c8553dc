//! Pod mutation for admission requests
//!
//! For each Instrumentation that selects the pod, the matching injector is
//! looked up and applied to a copy of the pod. The response carries the
//! JSON patch from the original to the instrumented copy.
//!
//! Injection failures never block a pod: a conflicting or invalid
//! Instrumentation is logged and skipped. Failing to read namespaces or
//! Instrumentations denies the request so the API server retries it.

use std::collections::HashSet;

use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use tracing::{debug, error, info, warn};

use super::WebhookState;
use crate::apm::{Injector, InjectorRegistry};
use crate::crd::Instrumentation;
use crate::Result;

/// Handle a full admission review for a pod
pub async fn review_pod(
    state: &WebhookState,
    review: AdmissionReview<Pod>,
) -> AdmissionReview<DynamicObject> {
    let request: AdmissionRequest<Pod> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return AdmissionResponse::invalid(e.to_string()).into_review();
        }
    };

    mutate_pod(state, &request).await.into_review()
}

/// Process a single pod admission request
pub async fn mutate_pod(
    state: &WebhookState,
    request: &AdmissionRequest<Pod>,
) -> AdmissionResponse {
    let uid = &request.uid;

    let Some(pod) = request.object.as_ref() else {
        debug!(uid = %uid, "No pod object in request, allowing unchanged");
        return AdmissionResponse::from(request);
    };

    let Some(ns_name) = request
        .namespace
        .clone()
        .or_else(|| pod.metadata.namespace.clone())
    else {
        debug!(uid = %uid, "Pod has no namespace, allowing unchanged");
        return AdmissionResponse::from(request);
    };

    let namespace = match state.source.namespace(&ns_name).await {
        Ok(ns) => ns,
        Err(e) => {
            error!(uid = %uid, namespace = %ns_name, error = %e, "Failed to read namespace");
            return AdmissionResponse::from(request).deny(e.to_string());
        }
    };

    let instrumentations = match state.source.instrumentations(&ns_name).await {
        Ok(list) => list,
        Err(e) => {
            error!(uid = %uid, namespace = %ns_name, error = %e, "Failed to list instrumentations");
            return AdmissionResponse::from(request).deny(e.to_string());
        }
    };

    let mut mutated = pod.clone();
    let applied =
        apply_instrumentations(&state.registry, &instrumentations, &namespace, &mut mutated).await;
    if applied.is_empty() {
        debug!(uid = %uid, namespace = %ns_name, "No instrumentation applied, allowing unchanged");
        return AdmissionResponse::from(request);
    }

    let patch = match build_patch(pod, &mutated) {
        Ok(patch) => patch,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to build pod patch");
            return AdmissionResponse::from(request).deny(e.to_string());
        }
    };

    info!(
        uid = %uid,
        namespace = %ns_name,
        pod = ?pod.metadata.name,
        instrumentations = ?applied,
        patch_ops = patch.0.len(),
        "Instrumenting pod"
    );

    match AdmissionResponse::from(request).with_patch(patch) {
        Ok(response) => response,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to serialize patch");
            AdmissionResponse::from(request).deny(format!("patch serialization error: {e}"))
        }
    }
}

/// Apply every Instrumentation that selects `pod`, returning the names of
/// those that were applied.
///
/// Candidates are taken in name order and at most one per language is
/// applied. A candidate that fails to inject does not claim its language, so
/// the next one in order is tried.
pub async fn apply_instrumentations(
    registry: &InjectorRegistry,
    instrumentations: &[Instrumentation],
    namespace: &Namespace,
    pod: &mut Pod,
) -> Vec<String> {
    let target: &Pod = pod;
    let mut candidates: Vec<&Instrumentation> = instrumentations
        .iter()
        .filter(|inst| inst.selects(namespace, target))
        .collect();
    candidates.sort_by(|a, b| a.name().cmp(b.name()));

    let mut seen = HashSet::new();
    let mut applied = Vec::new();
    for inst in candidates {
        let language = inst.spec.agent.language;
        if seen.contains(&language) {
            warn!(
                instrumentation = %inst.name(),
                language = %language,
                "Another instrumentation for this language was already applied, skipping"
            );
            continue;
        }

        let injector = match registry.lookup(language) {
            Ok(injector) => injector,
            Err(e) => {
                warn!(instrumentation = %inst.name(), error = %e, "No injector for instrumentation");
                continue;
            }
        };

        match injector.inject(inst, namespace, pod).await {
            Ok(()) => {
                seen.insert(language);
                applied.push(inst.name().to_string());
            }
            Err(e) if e.is_conflict() => {
                info!(instrumentation = %inst.name(), reason = %e, "Pod already instrumented");
            }
            Err(e) => {
                warn!(instrumentation = %inst.name(), error = %e, "Failed to inject instrumentation");
            }
        }
    }
    applied
}

/// JSON patch turning `original` into `mutated`
pub fn build_patch(original: &Pod, mutated: &Pod) -> Result<json_patch::Patch> {
    let before = serde_json::to_value(original)?;
    let after = serde_json::to_value(mutated)?;
    Ok(json_patch::diff(&before, &after))
}
