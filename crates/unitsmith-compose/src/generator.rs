//! The resolution pipeline.
//!
//! Runs name resolution, attribute mapping, the Podman device-volume
//! rewrite, pruning, relationship construction, validation, cycle checks,
//! and finally the label overlays, producing a [`ComposeModel`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use regex::Regex;
use unitsmith_common::config::GeneratorConfig;
use unitsmith_common::constants::DEFAULT_NETWORK;
use unitsmith_common::error::{Result, UnitsmithError};
use unitsmith_common::types::{ContainerRuntime, Project};

use crate::attributes::Mapper;
use crate::graph::DependencyGraph;
use crate::labels::LabelOverrides;
use crate::manifest::ComposeProject;
use crate::manifest::types::{NetworkDef, VolumeDef};
use crate::model::{self, ComposeModel, IpamConfig, Network, UnitRelations, Volume};
use crate::mounts::MountProvider;
use crate::naming::NameTable;
use crate::{prune, relations};

/// Resolves manifests into the unit model.
pub struct Generator<'a> {
    config: GeneratorConfig,
    env_overrides: BTreeMap<String, String>,
    mounts: &'a dyn MountProvider,
}

impl std::fmt::Debug for Generator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("config", &self.config)
            .field("env_overrides", &self.env_overrides.len())
            .finish_non_exhaustive()
    }
}

impl<'a> Generator<'a> {
    /// Creates a generator that asks `mounts` about host mount units.
    #[must_use]
    pub const fn new(config: GeneratorConfig, mounts: &'a dyn MountProvider) -> Self {
        Self {
            config,
            env_overrides: BTreeMap::new(),
            mounts,
        }
    }

    /// Supplies values for environment variables declared without one.
    #[must_use]
    pub fn with_env_overrides(mut self, env: BTreeMap<String, String>) -> Self {
        self.env_overrides = env;
        self
    }

    /// The configuration this generator runs with.
    #[must_use]
    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Resolves `manifest` into a unit model.
    ///
    /// # Errors
    ///
    /// Returns the first error hit by any stage; nothing is partially
    /// emitted.
    pub fn run(&self, manifest: &ComposeProject) -> Result<ComposeModel> {
        let filtered;
        let manifest = match &self.config.service_include {
            Some(pattern) => {
                filtered = included(manifest, pattern);
                &filtered
            }
            None => manifest,
        };
        let runtime = self.config.runtime;
        let project = self.project(manifest);
        let root = self.root()?;
        tracing::info!(
            project = %project.name,
            runtime = %runtime,
            services = manifest.services.len(),
            "resolving compose manifest"
        );

        let names = NameTable::build(&project, manifest)?;
        let mapper = Mapper::new(&self.config, &names, &root, &self.env_overrides);
        let mut overrides: BTreeMap<String, LabelOverrides> = BTreeMap::new();
        let mut containers = Vec::with_capacity(manifest.services.len());
        for service in manifest.services.values() {
            let mapped = mapper.map(service)?;
            let _ = overrides.insert(mapped.container.name.clone(), mapped.overrides);
            containers.push(mapped.container);
        }
        containers.sort_by(|a, b| a.name.cmp(&b.name));

        let startup_order = DependencyGraph::from_containers(&containers).resolve_order()?;

        let implicit_default = NetworkDef::default();
        let default_network = (!manifest.networks.contains_key(DEFAULT_NETWORK)
            && manifest
                .services
                .values()
                .any(|s| s.networks.contains_key(DEFAULT_NETWORK)))
        .then_some((DEFAULT_NETWORK, &implicit_default));
        let mut networks = manifest
            .networks
            .iter()
            .map(|(key, def)| (key.as_str(), def))
            .chain(default_network)
            .map(|(key, def)| self.network(&names, key, def))
            .collect::<Result<Vec<_>>>()?;
        let mut volumes = manifest
            .volumes
            .iter()
            .map(|(key, def)| self.volume(&names, key, def))
            .collect::<Result<Vec<_>>>()?;

        if runtime == ContainerRuntime::Podman {
            prune::rewrite_device_volumes(&mut containers, &mut volumes);
        }
        prune::prune(
            &containers,
            &mut networks,
            &mut volumes,
            self.config.keep_unused_resources,
        );
        networks.sort_by(|a, b| a.name.cmp(&b.name));
        volumes.sort_by(|a, b| a.name.cmp(&b.name));

        let root_target = self
            .config
            .create_root_target
            .then(|| model::root_target(runtime, &project));
        relations::link(
            &self.config,
            root_target.as_deref(),
            self.mounts,
            &mut containers,
            &mut networks,
            &mut volumes,
        )?;

        let mut model = ComposeModel {
            project,
            runtime,
            containers,
            networks,
            volumes,
            root_target,
            auto_start: self.config.auto_start,
            write_runtime_setup: self.config.write_runtime_setup,
            startup_order,
        };
        relations::validate(&model)?;

        for container in &mut model.containers {
            if let Some(o) = overrides.get(&container.name) {
                o.apply(&mut container.systemd);
            }
        }

        tracing::info!(
            containers = model.containers.len(),
            networks = model.networks.len(),
            volumes = model.volumes.len(),
            "resolved unit model"
        );
        Ok(model)
    }

    /// Configured project, else the manifest's top-level `name:`.
    fn project(&self, manifest: &ComposeProject) -> Project {
        let project = self.config.project();
        match &manifest.name {
            Some(name) if project.is_empty() => {
                Project::with_separator(name.clone(), project.separator)
            }
            _ => project,
        }
    }

    fn root(&self) -> Result<PathBuf> {
        match &self.config.root_path {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir().map_err(|e| UnitsmithError::Io {
                path: PathBuf::from("."),
                source: e,
            }),
        }
    }

    fn network(&self, names: &NameTable, key: &str, def: &NetworkDef) -> Result<Network> {
        let runtime = self.config.runtime;
        let name = names.network(key, key)?.to_owned();
        let mut ipam_configs = Vec::new();
        if let Some(ipam) = &def.ipam {
            for pool in &ipam.config {
                let aux_addresses = if runtime == ContainerRuntime::Docker {
                    pool.aux_addresses
                        .iter()
                        .map(|(host, ip)| format!("{host}={ip}"))
                        .collect()
                } else {
                    if !pool.aux_addresses.is_empty() {
                        tracing::warn!(
                            network = %name,
                            "podman does not support IPAM aux addresses; dropping them"
                        );
                    }
                    Vec::new()
                };
                ipam_configs.push(IpamConfig {
                    subnet: pool.subnet.clone(),
                    ip_range: pool.ip_range.clone(),
                    gateway: pool.gateway.clone(),
                    aux_addresses,
                });
            }
        }
        let mut extra_options = BTreeSet::new();
        if def.internal {
            let _ = extra_options.insert("--internal".to_owned());
        }
        if def.enable_ipv6 {
            let _ = extra_options.insert("--ipv6".to_owned());
        }
        Ok(Network {
            runtime,
            name,
            original_name: key.to_owned(),
            driver: def.driver.clone(),
            driver_opts: def.driver_opts.clone(),
            external: def.external.enabled,
            labels: def.labels.clone(),
            ipam_driver: def.ipam.as_ref().and_then(|i| i.driver.clone()),
            ipam_configs,
            extra_options,
            relations: UnitRelations::default(),
        })
    }

    fn volume(&self, names: &NameTable, key: &str, def: &VolumeDef) -> Result<Volume> {
        Ok(Volume {
            runtime: self.config.runtime,
            name: names.volume(key, key)?.to_owned(),
            original_name: key.to_owned(),
            driver: def.driver.clone(),
            driver_opts: def.driver_opts.clone(),
            external: def.external.enabled,
            labels: def.labels.clone(),
            remove_on_stop: self.config.remove_volumes,
            relations: UnitRelations::default(),
        })
    }
}

/// Copy of `manifest` keeping only services whose name matches `pattern`.
fn included(manifest: &ComposeProject, pattern: &Regex) -> ComposeProject {
    let mut kept = manifest.clone();
    kept.services.retain(|name, _| {
        let keep = pattern.is_match(name);
        if !keep {
            tracing::info!(
                service = %name,
                pattern = %pattern,
                "skipping service excluded by include pattern"
            );
        }
        keep
    });
    kept
}
