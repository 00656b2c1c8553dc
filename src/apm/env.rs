//! Set-if-absent helpers for containers and pod specs
//!
//! Every setter here is a no-op when an entry with the same name already
//! exists, which is what keeps repeated injection from duplicating anything.

use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, Volume, VolumeMount};

/// Position of the env var called `name`, if any
pub fn env_index(env: &[EnvVar], name: &str) -> Option<usize> {
    env.iter().position(|e| e.name == name)
}

/// Whether the container defines an env var called `name`
pub fn has_env_var(container: &Container, name: &str) -> bool {
    container
        .env
        .as_deref()
        .is_some_and(|env| env_index(env, name).is_some())
}

/// Append `var` unless the container already defines a var of that name.
/// Returns true when the var was added.
pub fn push_env_var_if_absent(container: &mut Container, var: EnvVar) -> bool {
    if has_env_var(container, &var.name) {
        return false;
    }
    container.env.get_or_insert_with(Vec::new).push(var);
    true
}

/// Append a plain `name=value` var unless one of that name exists
pub fn set_env_var(container: &mut Container, name: &str, value: &str) -> bool {
    push_env_var_if_absent(
        container,
        EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            value_from: None,
        },
    )
}

/// Whether the container has no mount called `name`
pub fn is_container_volume_missing(container: &Container, name: &str) -> bool {
    !container
        .volume_mounts
        .as_deref()
        .is_some_and(|mounts| mounts.iter().any(|m| m.name == name))
}

/// Append a mount unless one of that name exists
pub fn add_volume_mount_if_absent(container: &mut Container, mount: VolumeMount) -> bool {
    if !is_container_volume_missing(container, &mount.name) {
        return false;
    }
    container.volume_mounts.get_or_insert_with(Vec::new).push(mount);
    true
}

/// Whether the pod has no volume called `name`
pub fn is_pod_volume_missing(spec: &PodSpec, name: &str) -> bool {
    !spec
        .volumes
        .as_deref()
        .is_some_and(|volumes| volumes.iter().any(|v| v.name == name))
}

/// Append a volume unless one of that name exists
pub fn add_pod_volume_if_absent(spec: &mut PodSpec, volume: Volume) -> bool {
    if !is_pod_volume_missing(spec, &volume.name) {
        return false;
    }
    spec.volumes.get_or_insert_with(Vec::new).push(volume);
    true
}

/// Whether the pod has no init container called `name`
pub fn is_init_container_missing(spec: &PodSpec, name: &str) -> bool {
    !spec
        .init_containers
        .as_deref()
        .is_some_and(|inits| inits.iter().any(|c| c.name == name))
}

/// Append an init container unless one of that name exists
pub fn add_init_container_if_absent(spec: &mut PodSpec, init: Container) -> bool {
    if !is_init_container_missing(spec, &init.name) {
        return false;
    }
    spec.init_containers.get_or_insert_with(Vec::new).push(init);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::EmptyDirVolumeSource;

    fn env(name: &str, value: &str) -> EnvVar {
        EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            value_from: None,
        }
    }

    #[test]
    fn set_env_var_never_overwrites() {
        let mut c = Container {
            name: "app".to_string(),
            env: Some(vec![env("COR_PROFILER", "{custom}")]),
            ..Default::default()
        };

        assert!(!set_env_var(&mut c, "COR_PROFILER", "{other}"));
        assert!(set_env_var(&mut c, "COR_ENABLE_PROFILING", "1"));
        assert!(!set_env_var(&mut c, "COR_ENABLE_PROFILING", "0"));

        let env = c.env.unwrap();
        assert_eq!(env.len(), 2);
        assert_eq!(env[0].value.as_deref(), Some("{custom}"));
        assert_eq!(env[1].value.as_deref(), Some("1"));
    }

    #[test]
    fn set_env_var_creates_missing_list() {
        let mut c = Container::default();
        assert!(c.env.is_none());
        set_env_var(&mut c, "A", "1");
        assert_eq!(env_index(c.env.as_deref().unwrap(), "A"), Some(0));
        assert!(has_env_var(&c, "A"));
        assert!(!has_env_var(&c, "B"));
    }

    #[test]
    fn volume_mount_guard() {
        let mut c = Container::default();
        let mount = VolumeMount {
            name: "shared".to_string(),
            mount_path: "/shared".to_string(),
            ..Default::default()
        };
        assert!(is_container_volume_missing(&c, "shared"));
        assert!(add_volume_mount_if_absent(&mut c, mount.clone()));
        assert!(!add_volume_mount_if_absent(&mut c, mount));
        assert_eq!(c.volume_mounts.unwrap().len(), 1);
    }

    #[test]
    fn pod_volume_and_init_container_guards() {
        let mut spec = PodSpec::default();
        let volume = Volume {
            name: "shared".to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        };
        assert!(add_pod_volume_if_absent(&mut spec, volume.clone()));
        assert!(!add_pod_volume_if_absent(&mut spec, volume));
        assert!(!is_pod_volume_missing(&spec, "shared"));

        let init = Container {
            name: "stage".to_string(),
            ..Default::default()
        };
        assert!(is_init_container_missing(&spec, "stage"));
        assert!(add_init_container_if_absent(&mut spec, init.clone()));
        assert!(!add_init_container_if_absent(&mut spec, init));
        assert_eq!(spec.init_containers.unwrap().len(), 1);
        assert_eq!(spec.volumes.unwrap().len(), 1);
    }
}
