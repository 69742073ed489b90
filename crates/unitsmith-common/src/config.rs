//! Generator configuration model.

use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_PROJECT_SEPARATOR;
use crate::types::{ContainerRuntime, Project};

/// Switches that control how a manifest is resolved into the unit model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Project name used to prefix generated resources; empty for none.
    pub project: String,
    /// Separator between the project name and resource names.
    pub project_separator: String,
    /// Runtime the generated units drive.
    pub runtime: ContainerRuntime,
    /// Root for relative bind-mount sources and env files. Falls back to the
    /// working directory.
    pub root_path: Option<PathBuf>,
    /// Env files supplied on the command line.
    pub env_files: Vec<PathBuf>,
    /// Reference env files from the containers instead of only inlining.
    pub include_env_files: bool,
    /// Inline no environment; reference the CLI env files instead.
    pub env_files_only: bool,
    /// Skip env files that do not exist instead of failing.
    pub ignore_missing_env_files: bool,
    /// Default auto-start flag for every container.
    pub auto_start: bool,
    /// Always honour the manifest's log driver, even Compose's default.
    pub use_compose_log_driver: bool,
    /// Keep networks and volumes that no container references.
    pub keep_unused_resources: bool,
    /// Wait for host mount units that cover bind and volume paths.
    pub check_systemd_mounts: bool,
    /// Remove managed volumes when their unit stops.
    pub remove_volumes: bool,
    /// Group every generated unit under a root target.
    pub create_root_target: bool,
    /// Ask the renderer to emit runtime setup alongside the units.
    pub write_runtime_setup: bool,
    /// Emit uphold edges for explicit dependencies (needs systemd 249+).
    pub use_upheld_by: bool,
    /// Mimic Docker's restart backoff curve when targeting Docker.
    pub docker_restart_backoff: bool,
    /// Only resolve services whose name matches this pattern.
    #[serde(with = "pattern")]
    pub service_include: Option<Regex>,
}

impl GeneratorConfig {
    /// Returns the project identity derived from this configuration.
    #[must_use]
    pub fn project(&self) -> Project {
        Project::with_separator(self.project.clone(), self.project_separator.clone())
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            project_separator: DEFAULT_PROJECT_SEPARATOR.to_owned(),
            runtime: ContainerRuntime::default(),
            root_path: None,
            env_files: Vec::new(),
            include_env_files: false,
            env_files_only: false,
            ignore_missing_env_files: false,
            auto_start: true,
            use_compose_log_driver: false,
            keep_unused_resources: false,
            check_systemd_mounts: false,
            remove_volumes: false,
            create_root_target: true,
            write_runtime_setup: false,
            use_upheld_by: false,
            docker_restart_backoff: true,
            service_include: None,
        }
    }
}

/// Serde adapter storing a [`Regex`] as its source pattern.
mod pattern {
    use regex::Regex;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(re: &Option<Regex>, s: S) -> Result<S::Ok, S::Error> {
        re.as_ref().map(Regex::as_str).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Regex>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|p| Regex::new(&p).map_err(D::Error::custom))
            .transpose()
    }
}
