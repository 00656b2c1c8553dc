//! Per-flavor injection tables
//!
//! A [`FlavorProfile`] holds everything that differs between runtime flavors:
//! which profiler variables to set, where the agent payload lives, which
//! volumes to stage and how the init container copies the payload. The
//! injection algorithm itself lives in [`super::injector`] and is shared.

use crate::crd::Language;

/// Volume shared between the staging init container and the application
pub const VOLUME_NAME: &str = "newrelic-instrumentation";

/// Prefix of every staging init container name
pub const INIT_CONTAINER_NAME: &str = "newrelic-instrumentation";

/// Profiler settings for one managed runtime.
///
/// The home variable doubles as the marker: if it is already present the
/// runtime is treated as instrumented.
#[derive(Debug, PartialEq, Eq)]
pub struct ProfilerRuntime {
    /// Enable-profiling flag variable
    pub enable_var: &'static str,
    /// Value that turns profiling on
    pub enable_value: &'static str,
    /// Profiler CLSID variable
    pub profiler_var: &'static str,
    /// Profiler CLSID
    pub profiler_id: &'static str,
    /// Profiler DLL path variable
    pub profiler_path_var: &'static str,
    /// Profiler DLL path
    pub profiler_path: &'static str,
    /// Agent home variable (marker)
    pub home_var: &'static str,
    /// Agent home directory
    pub home_path: &'static str,
}

impl ProfilerRuntime {
    /// Fixed variables in injection order
    pub fn fixed_env(&self) -> [(&'static str, &'static str); 4] {
        [
            (self.enable_var, self.enable_value),
            (self.profiler_var, self.profiler_id),
            (self.profiler_path_var, self.profiler_path),
            (self.home_var, self.home_path),
        ]
    }
}

/// A named volume mounted into both the application and the init container
#[derive(Debug, PartialEq, Eq)]
pub struct StagedMount {
    /// Volume and mount name
    pub volume_name: &'static str,
    /// Mount path in both containers
    pub mount_path: &'static str,
}

/// Everything one runtime flavor needs injected
#[derive(Debug, PartialEq, Eq)]
pub struct FlavorProfile {
    /// Language this profile serves
    pub language: Language,
    /// Appended to [`INIT_CONTAINER_NAME`] with a dash
    pub init_container_suffix: &'static str,
    /// Runtimes to configure; marker checks and fixed vars follow this order
    pub runtimes: &'static [ProfilerRuntime],
    /// The shared payload volume
    pub payload_mount: StagedMount,
    /// Additional staged volumes (e.g., web-server scripts)
    pub extra_mounts: &'static [StagedMount],
    /// Init container command copying the payload into the mounts
    pub copy_command: &'static [&'static str],
}

impl FlavorProfile {
    /// Profile for `language`
    pub fn for_language(language: Language) -> &'static FlavorProfile {
        match language {
            Language::DotnetEdgeWindows => &DOTNET_EDGE_WINDOWS,
        }
    }

    /// Full init container name
    pub fn init_container_name(&self) -> String {
        format!("{}-{}", INIT_CONTAINER_NAME, self.init_container_suffix)
    }

    /// Marker variables, one per runtime
    pub fn marker_vars(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.runtimes.iter().map(|r| r.home_var)
    }

    /// Fixed variables across all runtimes, in injection order
    pub fn fixed_env(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.runtimes.iter().flat_map(|r| r.fixed_env())
    }

    /// Payload mount followed by the extra mounts
    pub fn mounts(&self) -> impl Iterator<Item = &StagedMount> + '_ {
        std::iter::once(&self.payload_mount).chain(self.extra_mounts.iter())
    }
}

/// .NET (Core) runtime on Windows
pub const DOTNET_CORE_WINDOWS: ProfilerRuntime = ProfilerRuntime {
    enable_var: "CORECLR_ENABLE_PROFILING",
    enable_value: "1",
    profiler_var: "CORECLR_PROFILER",
    profiler_id: "{36032161-FFC0-4B61-B559-F6C5D41BAE5A}",
    profiler_path_var: "CORECLR_PROFILER_PATH",
    profiler_path: "C:\\newrelic-instrumentation\\netcore\\NewRelic.Profiler.dll",
    home_var: "CORECLR_NEWRELIC_HOME",
    home_path: "C:\\newrelic-instrumentation\\netcore",
};

/// .NET Framework runtime on Windows
pub const DOTNET_FRAMEWORK_WINDOWS: ProfilerRuntime = ProfilerRuntime {
    enable_var: "COR_ENABLE_PROFILING",
    enable_value: "1",
    profiler_var: "COR_PROFILER",
    profiler_id: "{71DA0A04-7777-4EC6-9643-7D28B46A8A41}",
    profiler_path_var: "COR_PROFILER_PATH",
    profiler_path: "C:\\newrelic-instrumentation\\netframework\\NewRelic.Profiler.dll",
    home_var: "NEWRELIC_HOME",
    home_path: "C:\\newrelic-instrumentation\\netframework",
};

static DOTNET_EDGE_WINDOWS: FlavorProfile = FlavorProfile {
    language: Language::DotnetEdgeWindows,
    init_container_suffix: "dotnetEdge-windows",
    runtimes: &[DOTNET_CORE_WINDOWS, DOTNET_FRAMEWORK_WINDOWS],
    payload_mount: StagedMount {
        volume_name: VOLUME_NAME,
        mount_path: "C:\\newrelic-instrumentation",
    },
    extra_mounts: &[],
    copy_command: &[
        "cmd",
        "/C",
        "xcopy C:\\instrumentation C:\\newrelic-instrumentation /E /I /H /Y",
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_language_has_a_matching_profile() {
        for lang in Language::ALL {
            assert_eq!(FlavorProfile::for_language(*lang).language, *lang);
        }
    }

    #[test]
    fn dotnet_edge_windows_table() {
        let profile = FlavorProfile::for_language(Language::DotnetEdgeWindows);
        assert_eq!(
            profile.init_container_name(),
            "newrelic-instrumentation-dotnetEdge-windows"
        );
        assert_eq!(
            profile.marker_vars().collect::<Vec<_>>(),
            ["CORECLR_NEWRELIC_HOME", "NEWRELIC_HOME"]
        );

        let names: Vec<_> = profile.fixed_env().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            [
                "CORECLR_ENABLE_PROFILING",
                "CORECLR_PROFILER",
                "CORECLR_PROFILER_PATH",
                "CORECLR_NEWRELIC_HOME",
                "COR_ENABLE_PROFILING",
                "COR_PROFILER",
                "COR_PROFILER_PATH",
                "NEWRELIC_HOME",
            ]
        );
        assert_eq!(profile.mounts().count(), 1);
    }

    #[test]
    fn profiler_paths_live_under_home() {
        for runtime in FlavorProfile::for_language(Language::DotnetEdgeWindows).runtimes {
            assert!(runtime.profiler_path.starts_with(runtime.home_path));
            assert_eq!(runtime.enable_value, "1");
        }
    }
}
