//! The table-driven injector shared by every runtime flavor

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, Namespace, Pod, Volume, VolumeMount,
};

use super::base::{acceptable, check_markers, validate};
use super::config::ConfigInjector;
use super::env::{
    add_init_container_if_absent, add_pod_volume_if_absent, add_volume_mount_if_absent,
    push_env_var_if_absent, set_env_var,
};
use super::profile::{FlavorProfile, StagedMount};
use super::Injector;
use crate::crd::{Instrumentation, Language};
use crate::Result;

/// Only the first application container is instrumented
const FIRST_CONTAINER: usize = 0;

/// Injector driven by a [`FlavorProfile`]
pub struct ProfileInjector {
    profile: &'static FlavorProfile,
    config: Arc<dyn ConfigInjector>,
}

impl ProfileInjector {
    /// Injector for `profile`, delegating agent config to `config`
    pub fn new(profile: &'static FlavorProfile, config: Arc<dyn ConfigInjector>) -> Self {
        Self { profile, config }
    }

    /// Injector for the built-in profile of `language`
    pub fn for_language(language: Language, config: Arc<dyn ConfigInjector>) -> Self {
        Self::new(FlavorProfile::for_language(language), config)
    }

    fn volume_mount(mount: &StagedMount) -> VolumeMount {
        VolumeMount {
            name: mount.volume_name.to_string(),
            mount_path: mount.mount_path.to_string(),
            ..Default::default()
        }
    }

    fn staging_init_container(&self, inst: &Instrumentation) -> Container {
        let resources = &inst.spec.agent.resources;
        Container {
            name: self.profile.init_container_name(),
            image: Some(inst.spec.agent.image.clone()),
            command: Some(
                self.profile
                    .copy_command
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
            volume_mounts: Some(self.profile.mounts().map(Self::volume_mount).collect()),
            resources: (!resources.is_empty()).then(|| resources.to_requirements()),
            ..Default::default()
        }
    }

    /// Apply env, mounts, volumes and the init container. Infallible once the
    /// checks in `inject` have passed.
    fn mutate(&self, inst: &Instrumentation, pod: &mut Pod) {
        let init = self.staging_init_container(inst);
        let Some(spec) = pod.spec.as_mut() else {
            return;
        };

        let container = &mut spec.containers[FIRST_CONTAINER];
        for var in &inst.spec.agent.env {
            push_env_var_if_absent(container, var.to_env_var());
        }
        for (name, value) in self.profile.fixed_env() {
            set_env_var(container, name, value);
        }
        for mount in self.profile.mounts() {
            add_volume_mount_if_absent(container, Self::volume_mount(mount));
        }

        for mount in self.profile.mounts() {
            add_pod_volume_if_absent(
                spec,
                Volume {
                    name: mount.volume_name.to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                },
            );
        }
        add_init_container_if_absent(spec, init);
    }
}

#[async_trait]
impl Injector for ProfileInjector {
    fn language(&self) -> Language {
        self.profile.language
    }

    async fn inject(
        &self,
        inst: &Instrumentation,
        namespace: &Namespace,
        pod: &mut Pod,
    ) -> Result<()> {
        if !acceptable(self.language(), inst, pod) {
            return Ok(());
        }
        validate(inst)?;

        // acceptable() guarantees a spec with at least one container
        if let Some(container) = pod
            .spec
            .as_ref()
            .and_then(|s| s.containers.get(FIRST_CONTAINER))
        {
            check_markers(self.profile, inst, container)?;
        }

        self.mutate(inst, pod);

        self.config
            .inject(
                &inst.spec.agent.resources,
                namespace,
                pod,
                FIRST_CONTAINER,
                &inst.spec.license_key_secret,
            )
            .await;

        Ok(())
    }
}
