//! CLI command definitions and dispatch.

pub mod convert;
pub mod plan;

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use regex::Regex;
use unitsmith_common::config::GeneratorConfig;
use unitsmith_common::constants::DEFAULT_PROJECT_SEPARATOR;
use unitsmith_common::error::UnitsmithError;
use unitsmith_common::types::ContainerRuntime;
use unitsmith_compose::{ComposeModel, Generator, MountProvider, NoMounts, envfile, manifest};

use crate::mounts::SystemctlMounts;

/// unitsmith: resolve Compose manifests into systemd units.
#[derive(Parser, Debug)]
#[command(name = "unitsmith", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve manifests and write the unit model as JSON.
    Convert(convert::ConvertArgs),
    /// Display the startup order and unit relationships.
    Plan(plan::PlanArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Convert(args) => convert::execute(args),
        Command::Plan(args) => plan::execute(args),
    }
}

/// Generator switches shared by every command that resolves a manifest.
#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct GeneratorArgs {
    /// Project name prefixed to every generated resource.
    #[arg(short, long, env = "UNITSMITH_PROJECT", default_value = "")]
    pub project: String,

    /// Separator between the project name and resource names.
    #[arg(long, env = "UNITSMITH_PROJECT_SEPARATOR", default_value = DEFAULT_PROJECT_SEPARATOR)]
    pub project_separator: String,

    /// Runtime the generated units drive (podman or docker).
    #[arg(short, long, env = "UNITSMITH_RUNTIME", default_value = "podman")]
    pub runtime: ContainerRuntime,

    /// Root for relative bind mounts and env files (default: working directory).
    #[arg(long, env = "UNITSMITH_ROOT")]
    pub root: Option<PathBuf>,

    /// Env file supplying variable values; may be repeated.
    #[arg(long = "env-file", env = "UNITSMITH_ENV_FILES", value_delimiter = ',')]
    pub env_files: Vec<PathBuf>,

    /// Reference env files from the containers instead of inlining them.
    #[arg(long, env = "UNITSMITH_INCLUDE_ENV_FILES")]
    pub include_env_files: bool,

    /// Inline no environment; containers reference the CLI env files instead.
    #[arg(long, env = "UNITSMITH_ENV_FILES_ONLY")]
    pub env_files_only: bool,

    /// Do not fill unset variables from the process environment.
    #[arg(long, env = "UNITSMITH_NO_PROCESS_ENV")]
    pub no_process_env: bool,

    /// Only resolve services whose name matches this regex.
    #[arg(long, env = "UNITSMITH_SERVICE_INCLUDE")]
    pub service_include: Option<Regex>,

    /// Skip env files that do not exist.
    #[arg(long, env = "UNITSMITH_IGNORE_MISSING_ENV_FILES")]
    pub ignore_missing_env_files: bool,

    /// Do not start containers with the root target by default.
    #[arg(long, env = "UNITSMITH_NO_AUTO_START")]
    pub no_auto_start: bool,

    /// Honour the manifest's log driver even when it is Compose's default.
    #[arg(long, env = "UNITSMITH_USE_COMPOSE_LOG_DRIVER")]
    pub use_compose_log_driver: bool,

    /// Keep networks and volumes that no container references.
    #[arg(long, env = "UNITSMITH_KEEP_UNUSED")]
    pub keep_unused: bool,

    /// Wait for host mount units covering bind and volume paths.
    #[arg(long, env = "UNITSMITH_CHECK_SYSTEMD_MOUNTS")]
    pub check_systemd_mounts: bool,

    /// Remove managed volumes when their unit stops.
    #[arg(long, env = "UNITSMITH_REMOVE_VOLUMES")]
    pub remove_volumes: bool,

    /// Do not group the units under a root target.
    #[arg(long, env = "UNITSMITH_NO_ROOT_TARGET")]
    pub no_root_target: bool,

    /// Ask the renderer to emit runtime setup alongside the units.
    #[arg(long, env = "UNITSMITH_WRITE_RUNTIME_SETUP")]
    pub write_runtime_setup: bool,

    /// Keep dependencies running with uphold edges (systemd 249+).
    #[arg(long, env = "UNITSMITH_USE_UPHELD_BY")]
    pub use_upheld_by: bool,

    /// Do not mimic Docker's restart backoff.
    #[arg(long, env = "UNITSMITH_NO_DOCKER_BACKOFF")]
    pub no_docker_backoff: bool,
}

impl GeneratorArgs {
    /// Builds the generator configuration these flags describe.
    #[must_use]
    pub fn to_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            project: self.project.clone(),
            project_separator: self.project_separator.clone(),
            runtime: self.runtime,
            root_path: self.root.clone(),
            env_files: self.env_files.clone(),
            include_env_files: self.include_env_files,
            env_files_only: self.env_files_only,
            ignore_missing_env_files: self.ignore_missing_env_files,
            auto_start: !self.no_auto_start,
            use_compose_log_driver: self.use_compose_log_driver,
            keep_unused_resources: self.keep_unused,
            check_systemd_mounts: self.check_systemd_mounts,
            remove_volumes: self.remove_volumes,
            create_root_target: !self.no_root_target,
            write_runtime_setup: self.write_runtime_setup,
            use_upheld_by: self.use_upheld_by,
            docker_restart_backoff: !self.no_docker_backoff,
            service_include: self.service_include.clone(),
        }
    }
}

/// Loads `inputs` and resolves them into a unit model.
///
/// # Errors
///
/// Returns an error if a manifest or env file cannot be read, the host
/// mounts cannot be listed, or resolution fails.
pub fn resolve(inputs: &[PathBuf], args: &GeneratorArgs) -> anyhow::Result<ComposeModel> {
    for input in inputs {
        if !input.exists() {
            anyhow::bail!("file not found: {}", input.display());
        }
    }
    let config = args.to_config();
    let project = manifest::load_files(inputs)?;
    let env = env_overrides(&config, !args.no_process_env)?;

    let systemctl;
    let mounts: &dyn MountProvider = if config.check_systemd_mounts {
        systemctl = SystemctlMounts::load().context("listing host mount units")?;
        &systemctl
    } else {
        &NoMounts
    };

    let model = Generator::new(config, mounts)
        .with_env_overrides(env)
        .run(&project)?;
    Ok(model)
}

/// Collects values for variables the manifest declares without one.
///
/// CLI env files are read in order; the process environment is layered on
/// top when `process_env` is set.
fn env_overrides(
    config: &GeneratorConfig,
    process_env: bool,
) -> anyhow::Result<BTreeMap<String, String>> {
    let mut env = BTreeMap::new();
    for path in &config.env_files {
        if !path.exists() {
            if config.ignore_missing_env_files {
                tracing::warn!(path = %path.display(), "env file does not exist; skipping");
                continue;
            }
            return Err(UnitsmithError::MissingInput {
                service: String::new(),
                path: path.clone(),
            }
            .into());
        }
        env.extend(envfile::read(path)?);
    }
    if process_env {
        env.extend(std::env::vars());
    }
    tracing::debug!(variables = env.len(), "collected env overrides");
    Ok(env)
}
