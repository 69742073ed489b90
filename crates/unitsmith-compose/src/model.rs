//! The resolved unit model handed to renderers.
//!
//! Every collection exposed here is ordered: sets and maps are `BTree*`
//! and container, network, and volume lists are sorted by name, so two
//! resolutions of the same manifest serialize byte-for-byte identically.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};
use unitsmith_common::types::{ContainerRuntime, Project};

use crate::restart::RestartConfig;

/// Unit name of the container called `name`.
#[must_use]
pub fn container_unit(runtime: ContainerRuntime, name: &str) -> String {
    format!("{runtime}-{name}.service")
}

/// Unit name of the network setup service for `name`.
#[must_use]
pub fn network_unit(runtime: ContainerRuntime, name: &str) -> String {
    format!("{runtime}-network-{name}.service")
}

/// Unit name of the volume setup service for `name`.
#[must_use]
pub fn volume_unit(runtime: ContainerRuntime, name: &str) -> String {
    format!("{runtime}-volume-{name}.service")
}

/// Name of the aggregate target every generated unit belongs to.
#[must_use]
pub fn root_target(runtime: ContainerRuntime, project: &Project) -> String {
    format!("{runtime}-compose-{}.target", project.with("root"))
}

/// Systemd relationships attached to one generated unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitRelations {
    /// `After=`.
    pub after: BTreeSet<String>,
    /// `Requires=`.
    pub requires: BTreeSet<String>,
    /// `PartOf=`.
    pub part_of: BTreeSet<String>,
    /// `WantedBy=`.
    pub wanted_by: BTreeSet<String>,
    /// `UpheldBy=`.
    pub upheld_by: BTreeSet<String>,
    /// `RequiresMountsFor=` (paths, not unit names).
    pub requires_mounts_for: BTreeSet<String>,
}

impl UnitRelations {
    /// Orders after and hard-requires `unit`.
    pub fn require(&mut self, unit: &str) {
        let _ = self.after.insert(unit.to_owned());
        let _ = self.requires.insert(unit.to_owned());
    }

    /// Joins the aggregate target `target`.
    pub fn join_target(&mut self, target: &str) {
        let _ = self.part_of.insert(target.to_owned());
        let _ = self.wanted_by.insert(target.to_owned());
    }

    /// Iterates every unit name referenced by this record.
    pub fn unit_names(&self) -> impl Iterator<Item = &str> {
        self.after
            .iter()
            .chain(&self.requires)
            .chain(&self.part_of)
            .chain(&self.wanted_by)
            .chain(&self.upheld_by)
            .map(String::as_str)
    }

    /// Adds `value` to the relationship named by a systemd key.
    ///
    /// Returns `false` when `key` is not a relationship key.
    pub fn extend_by_key(&mut self, key: &str, value: &SystemdValue) -> bool {
        let set = match key {
            "After" => &mut self.after,
            "Requires" => &mut self.requires,
            "PartOf" => &mut self.part_of,
            "WantedBy" => &mut self.wanted_by,
            "UpheldBy" => &mut self.upheld_by,
            "RequiresMountsFor" => &mut self.requires_mounts_for,
            _ => return false,
        };
        set.extend(value.to_items());
        true
    }
}

/// A loosely typed systemd setting value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SystemdValue {
    /// Boolean token.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Comma-separated list.
    List(Vec<String>),
    /// Anything else, verbatim.
    Str(String),
}

impl SystemdValue {
    /// Auto-types a raw value: boolean tokens, integers, comma lists, else
    /// the trimmed string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        const TRUE: &[&str] = &["true", "yes", "on", "1"];
        const FALSE: &[&str] = &["false", "no", "off", "0"];

        let v = raw.trim();
        if TRUE.contains(&v) {
            return Self::Bool(true);
        }
        if FALSE.contains(&v) {
            return Self::Bool(false);
        }
        if v.contains(',') {
            return Self::List(v.split(',').map(|s| s.trim().to_owned()).collect());
        }
        v.parse::<i64>().map_or_else(|_| Self::Str(v.to_owned()), Self::Int)
    }

    /// Flattens the value into list items.
    #[must_use]
    pub fn to_items(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl fmt::Display for SystemdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::List(items) => f.write_str(&items.join(" ")),
            Self::Str(s) => f.write_str(s),
        }
    }
}

/// Service-manager configuration of one container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemdConfig {
    /// Restart behaviour as mapped from the manifest. Label overrides land
    /// in `service` and `unit` only, so this is not serialized.
    #[serde(skip)]
    pub restart: RestartConfig,
    /// `[Service]` settings, after label overrides.
    pub service: BTreeMap<String, SystemdValue>,
    /// `[Unit]` settings, after label overrides.
    pub unit: BTreeMap<String, SystemdValue>,
    /// Unit relationships.
    pub relations: UnitRelations,
}

/// Where a mount's data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSource {
    /// Host path.
    Bind(String),
    /// Named volume (resolved name).
    Volume(String),
    /// Anonymous volume created by the runtime.
    Anonymous,
}

/// A fully resolved mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    /// Source of the mount.
    pub source: MountSource,
    /// Mount point inside the container.
    pub target: String,
    /// Comma-joined mode flags (`ro`, `z`, `rshared`, ...).
    pub options: Vec<String>,
}

impl MountSpec {
    /// Name of the named volume this mount uses, if any.
    #[must_use]
    pub fn volume_name(&self) -> Option<&str> {
        match &self.source {
            MountSource::Volume(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for MountSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            MountSource::Bind(path) => write!(f, "{path}:")?,
            MountSource::Volume(name) => write!(f, "{name}:")?,
            MountSource::Anonymous => {}
        }
        f.write_str(&self.target)?;
        if !self.options.is_empty() {
            write!(f, ":{}", self.options.join(","))?;
        }
        Ok(())
    }
}

impl Serialize for MountSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Why a container depends on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyOrigin {
    /// Listed in `depends_on`.
    Explicit,
    /// Joins the peer's network namespace.
    NetworkMode,
    /// Listed in `depends_on` with `required: false`.
    OrderingOnly,
}

/// A resolved container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Runtime driving the container.
    pub runtime: ContainerRuntime,
    /// Manifest-local service name.
    pub service_name: String,
    /// Resolved container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Inlined environment.
    pub environment: BTreeMap<String, String>,
    /// Env files passed to the runtime, in declaration order.
    pub env_files: Vec<String>,
    /// Published ports, in declaration order.
    pub ports: Vec<String>,
    /// Labels left after override labels are consumed.
    pub labels: BTreeMap<String, String>,
    /// Resolved names of joined networks.
    pub networks: BTreeSet<String>,
    /// Extra runtime flags.
    pub extra_options: BTreeSet<String>,
    /// Resolved container names this container depends on.
    pub dependencies: BTreeMap<String, DependencyOrigin>,
    /// Mounts keyed by mount point.
    pub volumes: BTreeMap<String, MountSpec>,
    /// Log driver.
    pub log_driver: String,
    /// User to run as.
    pub user: Option<String>,
    /// Command override.
    pub command: Vec<String>,
    /// Systemd configuration.
    pub systemd: SystemdConfig,
    /// Start with the root target.
    pub auto_start: bool,
}

impl Container {
    /// Unit name of this container.
    #[must_use]
    pub fn unit(&self) -> String {
        container_unit(self.runtime, &self.name)
    }

    /// Dependencies that start this container only after the peer is up.
    pub fn depends_on(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .filter(|(_, origin)| **origin != DependencyOrigin::OrderingOnly)
            .map(|(name, _)| name.as_str())
    }

    /// Whether any mount uses the named volume `name`.
    #[must_use]
    pub fn uses_volume(&self, name: &str) -> bool {
        self.volumes.values().any(|m| m.volume_name() == Some(name))
    }
}

/// One IPAM address pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpamConfig {
    /// Subnet in CIDR form.
    pub subnet: Option<String>,
    /// Allocation range.
    pub ip_range: Option<String>,
    /// Gateway.
    pub gateway: Option<String>,
    /// `host=ip` entries, sorted. Only Docker honours these.
    pub aux_addresses: Vec<String>,
}

/// A resolved network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    /// Runtime that creates the network.
    pub runtime: ContainerRuntime,
    /// Resolved name.
    pub name: String,
    /// Manifest-local name.
    pub original_name: String,
    /// Driver.
    pub driver: Option<String>,
    /// Driver options.
    pub driver_opts: BTreeMap<String, String>,
    /// Pre-existing network not managed here.
    pub external: bool,
    /// Labels.
    pub labels: BTreeMap<String, String>,
    /// IPAM driver.
    pub ipam_driver: Option<String>,
    /// IPAM pools.
    pub ipam_configs: Vec<IpamConfig>,
    /// Extra `network create` flags.
    pub extra_options: BTreeSet<String>,
    /// Unit relationships.
    pub relations: UnitRelations,
}

impl Network {
    /// Unit name of the network setup service.
    #[must_use]
    pub fn unit(&self) -> String {
        network_unit(self.runtime, &self.name)
    }
}

/// A resolved volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    /// Runtime that creates the volume.
    pub runtime: ContainerRuntime,
    /// Resolved name.
    pub name: String,
    /// Manifest-local name.
    pub original_name: String,
    /// Driver.
    pub driver: Option<String>,
    /// Driver options.
    pub driver_opts: BTreeMap<String, String>,
    /// Pre-existing volume not managed here.
    pub external: bool,
    /// Labels.
    pub labels: BTreeMap<String, String>,
    /// Remove the volume when its unit stops.
    pub remove_on_stop: bool,
    /// Unit relationships.
    pub relations: UnitRelations,
}

impl Volume {
    /// Unit name of the volume setup service.
    #[must_use]
    pub fn unit(&self) -> String {
        volume_unit(self.runtime, &self.name)
    }

    /// Host path backing the volume, from the `device` driver option.
    #[must_use]
    pub fn device_path(&self) -> Option<&str> {
        self.driver_opts.get("device").map(String::as_str)
    }
}

/// Complete output of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeModel {
    /// Project identity.
    pub project: Project,
    /// Target runtime.
    pub runtime: ContainerRuntime,
    /// Containers sorted by name.
    pub containers: Vec<Container>,
    /// Managed networks sorted by name.
    pub networks: Vec<Network>,
    /// Managed volumes sorted by name.
    pub volumes: Vec<Volume>,
    /// Aggregate target, when one is created.
    pub root_target: Option<String>,
    /// Default auto-start flag.
    pub auto_start: bool,
    /// Ask the renderer to emit runtime setup.
    pub write_runtime_setup: bool,
    /// Container names, dependencies first.
    pub startup_order: Vec<String>,
}

impl ComposeModel {
    /// Looks up a container by resolved name.
    #[must_use]
    pub fn container(&self, name: &str) -> Option<&Container> {
        self.containers.iter().find(|c| c.name == name)
    }

    /// Every unit name this model generates.
    #[must_use]
    pub fn unit_names(&self) -> BTreeSet<String> {
        let mut units: BTreeSet<String> = self.containers.iter().map(Container::unit).collect();
        units.extend(self.networks.iter().map(Network::unit));
        units.extend(self.volumes.iter().map(Volume::unit));
        units.extend(self.root_target.iter().cloned());
        units
    }
}
