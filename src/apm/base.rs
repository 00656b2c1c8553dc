//! Checks shared by every injector: acceptability, structural validation of
//! the Instrumentation, and marker-based conflict detection.
//!
//! All of these run before the first mutation, so a failure here leaves the
//! pod exactly as the caller passed it.

use std::collections::HashSet;

use k8s_openapi::api::core::v1::{Container, Pod};

use super::env::has_env_var;
use super::profile::FlavorProfile;
use crate::crd::{Instrumentation, Language};
use crate::error::EnvLocation;
use crate::{Error, Result};

/// Whether an injector for `language` should touch `pod` at all.
///
/// Language mismatch and pods without containers are skipped silently.
pub fn acceptable(language: Language, inst: &Instrumentation, pod: &Pod) -> bool {
    if inst.spec.agent.language != language {
        return false;
    }
    pod.spec.as_ref().is_some_and(|s| !s.containers.is_empty())
}

/// Structural validation of the fields injection depends on
pub fn validate(inst: &Instrumentation) -> Result<()> {
    let name = inst.name();
    let agent = &inst.spec.agent;

    if agent.image.trim().is_empty() {
        return Err(Error::validation_for_field(
            name,
            "spec.agent.image",
            "agent image must not be empty",
        ));
    }
    if agent.image.chars().any(char::is_whitespace) {
        return Err(Error::validation_for_field(
            name,
            "spec.agent.image",
            format!("agent image '{}' must not contain whitespace", agent.image),
        ));
    }

    if inst.spec.license_key_secret.trim().is_empty() {
        return Err(Error::validation_for_field(
            name,
            "spec.licenseKeySecret",
            "license key secret must not be empty",
        ));
    }

    let mut seen = HashSet::new();
    for (i, var) in agent.env.iter().enumerate() {
        if var.name.is_empty() {
            return Err(Error::validation_for_field(
                name,
                format!("spec.agent.env[{i}].name"),
                "env var name must not be empty",
            ));
        }
        if !seen.insert(var.name.as_str()) {
            return Err(Error::validation_for_field(
                name,
                format!("spec.agent.env[{i}].name"),
                format!("env var '{}' is listed more than once", var.name),
            ));
        }
    }

    let resources = &agent.resources;
    for (section, map) in [("limits", &resources.limits), ("requests", &resources.requests)] {
        if let Some((key, _)) = map.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(Error::validation_for_field(
                name,
                format!("spec.agent.resources.{section}.{key}"),
                "resource quantity must not be empty",
            ));
        }
    }

    Ok(())
}

/// Refuse to inject when any marker variable is already present.
///
/// For each runtime in profile order, the container is checked before the
/// instrumentation spec.
pub fn check_markers(
    profile: &FlavorProfile,
    inst: &Instrumentation,
    container: &Container,
) -> Result<()> {
    for marker in profile.marker_vars() {
        if has_env_var(container, marker) {
            return Err(Error::conflict(marker, EnvLocation::Container));
        }
        if inst.spec.agent.env.iter().any(|e| e.name == marker) {
            return Err(Error::conflict(marker, EnvLocation::InstrumentationSpec));
        }
    }
    Ok(())
}
