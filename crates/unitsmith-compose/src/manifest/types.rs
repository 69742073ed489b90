//! Compose manifest model.
//!
//! Mirrors the subset of the Compose file format the resolver consumes.
//! Fields that Compose allows in several spellings (list or map, string or
//! list, scalar or mapping) are normalized during deserialization so the
//! resolver sees a single shape.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Root of a parsed Compose manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ComposeProject {
    /// Top-level `name:`, if present.
    pub name: Option<String>,
    /// Services keyed by manifest-local name.
    #[serde(deserialize_with = "de::named_map")]
    pub services: BTreeMap<String, Service>,
    /// Network definitions keyed by manifest-local name.
    #[serde(deserialize_with = "de::nullable_map")]
    pub networks: BTreeMap<String, NetworkDef>,
    /// Volume definitions keyed by manifest-local name.
    #[serde(deserialize_with = "de::nullable_map")]
    pub volumes: BTreeMap<String, VolumeDef>,
}

/// A single service definition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Service {
    /// Manifest-local service name (the key under `services:`).
    #[serde(skip)]
    pub name: String,
    /// Image reference.
    pub image: Option<String>,
    /// Explicit container name; overrides project scoping.
    pub container_name: Option<String>,
    /// Container hostname.
    pub hostname: Option<String>,
    /// User (and optionally group) to run as.
    #[serde(deserialize_with = "de::opt_scalar")]
    pub user: Option<String>,
    /// Working directory inside the container.
    pub working_dir: Option<String>,
    /// Command override.
    #[serde(deserialize_with = "de::command")]
    pub command: Option<Vec<String>>,
    /// Entrypoint override.
    #[serde(deserialize_with = "de::command")]
    pub entrypoint: Option<Vec<String>>,
    /// Environment; `None` marks a variable declared without a value.
    #[serde(deserialize_with = "de::environment")]
    pub environment: BTreeMap<String, Option<String>>,
    /// Env files referenced by the service.
    #[serde(deserialize_with = "de::env_files")]
    pub env_file: Vec<EnvFile>,
    /// Container labels.
    #[serde(deserialize_with = "de::list_or_map")]
    pub labels: BTreeMap<String, String>,
    /// Published ports.
    pub ports: Vec<PortEntry>,
    /// Mounts.
    pub volumes: Vec<VolumeEntry>,
    /// Networks the service attaches to.
    #[serde(deserialize_with = "de::service_networks")]
    pub networks: BTreeMap<String, ServiceNetwork>,
    /// Raw `network_mode`.
    pub network_mode: Option<String>,
    /// Explicit dependencies keyed by service name.
    #[serde(deserialize_with = "de::depends_on")]
    pub depends_on: BTreeMap<String, Dependency>,
    /// Legacy restart policy string.
    pub restart: Option<String>,
    /// Deploy block (restart policy and resources).
    pub deploy: Option<Deploy>,
    /// Added capabilities.
    pub cap_add: Vec<String>,
    /// Dropped capabilities.
    pub cap_drop: Vec<String>,
    /// Device mappings.
    pub devices: Vec<String>,
    /// Security options.
    pub security_opt: Vec<String>,
    /// Run privileged.
    pub privileged: bool,
    /// Run an init process as PID 1.
    pub init: bool,
    /// Extra `/etc/hosts` entries as `host:ip`.
    #[serde(deserialize_with = "de::extra_hosts")]
    pub extra_hosts: Vec<String>,
    /// Namespaced kernel parameters.
    #[serde(deserialize_with = "de::list_or_map")]
    pub sysctls: BTreeMap<String, String>,
    /// Size of `/dev/shm`.
    #[serde(deserialize_with = "de::opt_scalar")]
    pub shm_size: Option<String>,
    /// MAC address.
    pub mac_address: Option<String>,
    /// DNS servers.
    #[serde(deserialize_with = "de::one_or_many")]
    pub dns: Vec<String>,
    /// DNS search domains.
    #[serde(deserialize_with = "de::one_or_many")]
    pub dns_search: Vec<String>,
    /// DNS resolver options.
    #[serde(deserialize_with = "de::one_or_many")]
    pub dns_opt: Vec<String>,
    /// tmpfs mount points.
    #[serde(deserialize_with = "de::one_or_many")]
    pub tmpfs: Vec<String>,
    /// Health check.
    pub healthcheck: Option<Healthcheck>,
    /// Logging configuration.
    pub logging: Option<Logging>,
    /// Signal used to stop the container.
    pub stop_signal: Option<String>,
    /// Grace period before the container is killed.
    pub stop_grace_period: Option<String>,
    /// Resource ulimits keyed by name.
    pub ulimits: BTreeMap<String, Ulimit>,
}

/// An `env_file` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFile {
    /// Path as written in the manifest.
    pub path: String,
    /// Whether a missing file is an error.
    pub required: bool,
}

/// A `ports` entry before short-syntax parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEntry {
    /// `[ip:][host:]container[/proto]`.
    Short(String),
    /// Long mapping form.
    Long(PortLong),
}

/// Long-form port mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PortLong {
    /// Container port.
    pub target: u16,
    /// Published host port or range.
    #[serde(deserialize_with = "de::opt_scalar")]
    pub published: Option<String>,
    /// Host IP to bind to.
    pub host_ip: Option<String>,
    /// `tcp` or `udp`.
    pub protocol: Option<String>,
}

/// A `volumes` entry before short-syntax parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeEntry {
    /// `source:target[:mode]` or a bare target.
    Short(String),
    /// Long mapping form.
    Long(VolumeLong),
}

/// Long-form mount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VolumeLong {
    /// `bind`, `volume`, or `tmpfs`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Host path or volume name.
    pub source: Option<String>,
    /// Path inside the container.
    pub target: String,
    /// Mount read-only.
    pub read_only: bool,
    /// Bind-specific options.
    pub bind: Option<BindOptions>,
    /// Volume-specific options.
    pub volume: Option<VolumeOptions>,
}

/// Options for `type: bind` mounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BindOptions {
    /// Mount propagation (`rprivate`, `shared`, ...).
    pub propagation: Option<String>,
    /// SELinux relabel (`z` or `Z`).
    pub selinux: Option<String>,
}

/// Options for `type: volume` mounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VolumeOptions {
    /// Do not copy image data into the volume.
    pub nocopy: bool,
}

/// Per-service network attachment settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceNetwork {
    /// Extra aliases on this network.
    pub aliases: Vec<String>,
    /// Static IPv4 address.
    pub ipv4_address: Option<String>,
    /// Static IPv6 address.
    pub ipv6_address: Option<String>,
}

/// A `depends_on` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Dependency {
    /// `service_started`, `service_healthy`, or
    /// `service_completed_successfully`.
    pub condition: String,
    /// When false, the dependency only orders startup.
    pub required: bool,
}

impl Default for Dependency {
    fn default() -> Self {
        Self {
            condition: "service_started".to_owned(),
            required: true,
        }
    }
}

/// The `deploy` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Deploy {
    /// Structured restart policy; overrides `restart`.
    pub restart_policy: Option<RestartPolicyDef>,
    /// Resource limits and reservations.
    pub resources: Option<Resources>,
}

/// `deploy.restart_policy`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RestartPolicyDef {
    /// `none`, `on-failure`, or `any` (the default).
    pub condition: Option<String>,
    /// Delay between restart attempts.
    pub delay: Option<String>,
    /// Attempts before giving up.
    pub max_attempts: Option<u64>,
    /// Window used to decide whether a restart succeeded.
    pub window: Option<String>,
}

/// `deploy.resources`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Resources {
    /// Hard limits.
    pub limits: Option<ResourceSpec>,
    /// Reservations.
    pub reservations: Option<ResourceSpec>,
}

/// Limits or reservations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResourceSpec {
    /// Fractional CPU count.
    #[serde(deserialize_with = "de::opt_scalar")]
    pub cpus: Option<String>,
    /// Memory as a byte size.
    #[serde(deserialize_with = "de::opt_scalar")]
    pub memory: Option<String>,
    /// Maximum number of processes.
    pub pids: Option<i64>,
    /// Device requests (GPUs and CDI devices).
    pub devices: Vec<DeviceRequest>,
}

/// `deploy.resources.reservations.devices` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceRequest {
    /// Device driver (`nvidia`, `cdi`).
    pub driver: Option<String>,
    /// Number of devices, or `all`.
    #[serde(deserialize_with = "de::opt_scalar")]
    pub count: Option<String>,
    /// Explicit device IDs.
    pub device_ids: Vec<String>,
    /// Requested capabilities (`gpu`, ...).
    pub capabilities: Vec<String>,
}

/// Health check definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Healthcheck {
    /// Test tokens; a plain string becomes `["CMD-SHELL", string]`.
    #[serde(deserialize_with = "de::healthcheck_test")]
    pub test: Vec<String>,
    /// Time between checks.
    pub interval: Option<String>,
    /// Time before a check is considered hung.
    pub timeout: Option<String>,
    /// Consecutive failures needed to report unhealthy.
    pub retries: Option<u64>,
    /// Initialization grace period.
    pub start_period: Option<String>,
    /// Time between checks during the start period.
    pub start_interval: Option<String>,
    /// Disable any image-defined check.
    pub disable: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// Log driver.
    pub driver: Option<String>,
    /// Driver options.
    #[serde(deserialize_with = "de::list_or_map")]
    pub options: BTreeMap<String, String>,
}

/// A ulimit, either a single value or a soft/hard pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Ulimit {
    /// Same soft and hard limit.
    Single(i64),
    /// Distinct limits.
    Pair {
        /// Soft limit.
        soft: i64,
        /// Hard limit.
        hard: i64,
    },
}

/// Top-level network definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkDef {
    /// Explicit name; overrides project scoping.
    pub name: Option<String>,
    /// Network driver.
    pub driver: Option<String>,
    /// Driver options.
    #[serde(deserialize_with = "de::list_or_map")]
    pub driver_opts: BTreeMap<String, String>,
    /// Whether the network exists outside this project.
    #[serde(deserialize_with = "de::external")]
    pub external: External,
    /// Restrict external access.
    pub internal: bool,
    /// Enable IPv6.
    pub enable_ipv6: bool,
    /// Network labels.
    #[serde(deserialize_with = "de::list_or_map")]
    pub labels: BTreeMap<String, String>,
    /// IP address management.
    pub ipam: Option<Ipam>,
}

/// IPAM block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Ipam {
    /// IPAM driver.
    pub driver: Option<String>,
    /// Address pools.
    pub config: Vec<IpamPool>,
}

/// One IPAM address pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IpamPool {
    /// Subnet in CIDR form.
    pub subnet: Option<String>,
    /// Allocation range.
    pub ip_range: Option<String>,
    /// Gateway address.
    pub gateway: Option<String>,
    /// Auxiliary addresses keyed by hostname.
    #[serde(deserialize_with = "de::list_or_map")]
    pub aux_addresses: BTreeMap<String, String>,
}

/// Top-level volume definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VolumeDef {
    /// Explicit name.
    pub name: Option<String>,
    /// Volume driver.
    pub driver: Option<String>,
    /// Driver options (`type`, `o`, `device`).
    #[serde(deserialize_with = "de::list_or_map")]
    pub driver_opts: BTreeMap<String, String>,
    /// Whether the volume exists outside this project.
    #[serde(deserialize_with = "de::external")]
    pub external: External,
    /// Volume labels.
    #[serde(deserialize_with = "de::list_or_map")]
    pub labels: BTreeMap<String, String>,
}

/// `external:` as either a flag or the legacy `{ name: ... }` mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct External {
    /// Whether the resource is external.
    pub enabled: bool,
    /// Legacy name given inside the `external` mapping.
    pub name: Option<String>,
}

mod de {
    //! Deserialization helpers for Compose's alternative spellings.

    use std::collections::BTreeMap;

    use serde::de::{DeserializeOwned, Error};
    use serde::{Deserialize, Deserializer};
    use serde_yaml::Value;

    use super::{Dependency, EnvFile, External, PortEntry, Service, ServiceNetwork, VolumeEntry};
    use crate::manifest::syntax;

    fn scalar_to_string(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn from_value<T: DeserializeOwned, E: Error>(value: Value) -> Result<T, E> {
        serde_yaml::from_value(value).map_err(E::custom)
    }

    fn split_pair(entry: &str, sep: char) -> (String, Option<String>) {
        entry.split_once(sep).map_or_else(
            || (entry.to_owned(), None),
            |(k, v)| (k.to_owned(), Some(v.to_owned())),
        )
    }

    pub(super) fn opt_scalar<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let value = Value::deserialize(d)?;
        match value {
            Value::Null => Ok(None),
            other => scalar_to_string(&other)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("expected a scalar, got {other:?}"))),
        }
    }

    pub(super) fn one_or_many<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(Vec::new()),
            Value::Sequence(items) => items
                .iter()
                .map(|v| {
                    scalar_to_string(v)
                        .ok_or_else(|| D::Error::custom(format!("expected a scalar, got {v:?}")))
                })
                .collect(),
            other => scalar_to_string(&other)
                .map(|s| vec![s])
                .ok_or_else(|| D::Error::custom(format!("expected a string or list, got {other:?}"))),
        }
    }

    /// `KEY=VALUE` list or `KEY: VALUE` map; entries without a value keep `None`.
    fn nullable_pairs<E: Error>(value: Value, sep: char) -> Result<BTreeMap<String, Option<String>>, E> {
        let mut out = BTreeMap::new();
        match value {
            Value::Null => {}
            Value::Sequence(items) => {
                for item in &items {
                    let entry = scalar_to_string(item)
                        .ok_or_else(|| E::custom(format!("expected a string entry, got {item:?}")))?;
                    let (k, v) = split_pair(&entry, sep);
                    let _ = out.insert(k, v);
                }
            }
            Value::Mapping(map) => {
                for (k, v) in &map {
                    let key = scalar_to_string(k)
                        .ok_or_else(|| E::custom(format!("expected a string key, got {k:?}")))?;
                    let _ = out.insert(key, scalar_to_string(v));
                }
            }
            other => return Err(E::custom(format!("expected a list or mapping, got {other:?}"))),
        }
        Ok(out)
    }

    pub(super) fn environment<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<BTreeMap<String, Option<String>>, D::Error> {
        nullable_pairs(Value::deserialize(d)?, '=')
    }

    pub(super) fn list_or_map<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<BTreeMap<String, String>, D::Error> {
        let pairs = nullable_pairs::<D::Error>(Value::deserialize(d)?, '=')?;
        Ok(pairs
            .into_iter()
            .map(|(k, v)| (k, v.unwrap_or_default()))
            .collect())
    }

    pub(super) fn extra_hosts<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        match Value::deserialize(d)? {
            Value::Mapping(map) => {
                let mut hosts = Vec::new();
                for (k, v) in &map {
                    let host = scalar_to_string(k)
                        .ok_or_else(|| D::Error::custom(format!("expected a hostname, got {k:?}")))?;
                    match v {
                        Value::Sequence(ips) => {
                            for ip in ips.iter().filter_map(scalar_to_string) {
                                hosts.push(format!("{host}:{ip}"));
                            }
                        }
                        other => {
                            let ip = scalar_to_string(other).unwrap_or_default();
                            hosts.push(format!("{host}:{ip}"));
                        }
                    }
                }
                Ok(hosts)
            }
            other => {
                // Compose also accepts `host=ip` in list form.
                let entries = one_or_many(other).map_err(D::Error::custom)?;
                Ok(entries
                    .into_iter()
                    .map(|e| match e.split_once('=') {
                        Some((host, ip)) if !host.contains(':') => format!("{host}:{ip}"),
                        _ => e,
                    })
                    .collect())
            }
        }
    }

    pub(super) fn command<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::String(s) => syntax::parse_shell_words(&s).map(Some).map_err(D::Error::custom),
            other => one_or_many(other).map(Some).map_err(D::Error::custom),
        }
    }

    pub(super) fn healthcheck_test<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(Vec::new()),
            Value::String(s) => Ok(vec!["CMD-SHELL".to_owned(), s]),
            other => one_or_many(other).map_err(D::Error::custom),
        }
    }

    pub(super) fn env_files<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<EnvFile>, D::Error> {
        #[derive(Deserialize)]
        struct Long {
            path: String,
            #[serde(default = "required_default")]
            required: bool,
        }
        const fn required_default() -> bool {
            true
        }

        let items = match Value::deserialize(d)? {
            Value::Null => Vec::new(),
            Value::Sequence(items) => items,
            other => vec![other],
        };
        items
            .into_iter()
            .map(|item| match item {
                Value::Mapping(_) => {
                    let long: Long = from_value::<_, D::Error>(item)?;
                    Ok(EnvFile {
                        path: long.path,
                        required: long.required,
                    })
                }
                other => scalar_to_string(&other)
                    .map(|path| EnvFile {
                        path,
                        required: true,
                    })
                    .ok_or_else(|| D::Error::custom(format!("invalid env_file entry: {other:?}"))),
            })
            .collect()
    }

    pub(super) fn service_networks<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<BTreeMap<String, ServiceNetwork>, D::Error> {
        let mut out = BTreeMap::new();
        match Value::deserialize(d)? {
            Value::Null => {}
            Value::Sequence(items) => {
                for name in items.iter().filter_map(scalar_to_string) {
                    let _ = out.insert(name, ServiceNetwork::default());
                }
            }
            Value::Mapping(map) => {
                for (k, v) in map {
                    let name = scalar_to_string(&k)
                        .ok_or_else(|| D::Error::custom(format!("invalid network name: {k:?}")))?;
                    let cfg = if v.is_null() {
                        ServiceNetwork::default()
                    } else {
                        from_value::<_, D::Error>(v)?
                    };
                    let _ = out.insert(name, cfg);
                }
            }
            other => return Err(D::Error::custom(format!("invalid networks: {other:?}"))),
        }
        Ok(out)
    }

    pub(super) fn depends_on<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<BTreeMap<String, Dependency>, D::Error> {
        let mut out = BTreeMap::new();
        match Value::deserialize(d)? {
            Value::Null => {}
            Value::Sequence(items) => {
                for name in items.iter().filter_map(scalar_to_string) {
                    let _ = out.insert(name, Dependency::default());
                }
            }
            Value::Mapping(map) => {
                for (k, v) in map {
                    let name = scalar_to_string(&k)
                        .ok_or_else(|| D::Error::custom(format!("invalid dependency: {k:?}")))?;
                    let dep = if v.is_null() {
                        Dependency::default()
                    } else {
                        from_value::<_, D::Error>(v)?
                    };
                    let _ = out.insert(name, dep);
                }
            }
            other => return Err(D::Error::custom(format!("invalid depends_on: {other:?}"))),
        }
        Ok(out)
    }

    pub(super) fn external<'de, D: Deserializer<'de>>(d: D) -> Result<External, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(External::default()),
            Value::Bool(enabled) => Ok(External {
                enabled,
                name: None,
            }),
            Value::Mapping(map) => Ok(External {
                enabled: true,
                name: map.get("name").and_then(scalar_to_string),
            }),
            other => Err(D::Error::custom(format!("invalid external: {other:?}"))),
        }
    }

    pub(super) fn nullable_map<'de, D, T>(d: D) -> Result<BTreeMap<String, T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let raw = Option::<BTreeMap<String, Option<T>>>::deserialize(d)?;
        Ok(raw
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, v.unwrap_or_default()))
            .collect())
    }

    pub(super) fn named_map<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<BTreeMap<String, Service>, D::Error> {
        let mut services: BTreeMap<String, Service> = nullable_map(d)?;
        for (name, service) in &mut services {
            service.name.clone_from(name);
        }
        Ok(services)
    }

    impl<'de> Deserialize<'de> for PortEntry {
        fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
            match Value::deserialize(d)? {
                v @ Value::Mapping(_) => from_value(v).map(Self::Long),
                other => scalar_to_string(&other)
                    .map(Self::Short)
                    .ok_or_else(|| D::Error::custom(format!("invalid port: {other:?}"))),
            }
        }
    }

    impl<'de> Deserialize<'de> for VolumeEntry {
        fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
            match Value::deserialize(d)? {
                v @ Value::Mapping(_) => from_value(v).map(Self::Long),
                Value::String(s) => Ok(Self::Short(s)),
                other => Err(D::Error::custom(format!("invalid volume: {other:?}"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(yaml: &str) -> Service {
        serde_yaml::from_str(yaml).expect("service should parse")
    }

    #[test]
    fn environment_list_and_map_agree() {
        let list = service("environment:\n  - A=1\n  - B\n");
        let map = service("environment:\n  A: 1\n  B:\n");
        assert_eq!(list.environment, map.environment);
        assert_eq!(list.environment.get("A"), Some(&Some("1".to_owned())));
        assert_eq!(list.environment.get("B"), Some(&None));
    }

    #[test]
    fn labels_accept_list_form() {
        let svc = service("labels:\n  - com.example=1\n  - flag\n");
        assert_eq!(svc.labels.get("com.example").map(String::as_str), Some("1"));
        assert_eq!(svc.labels.get("flag").map(String::as_str), Some(""));
    }

    #[test]
    fn depends_on_long_form_reads_required() {
        let svc = service(
            "depends_on:\n  db:\n    condition: service_healthy\n  cache:\n    required: false\n",
        );
        assert!(svc.depends_on["db"].required);
        assert_eq!(svc.depends_on["db"].condition, "service_healthy");
        assert!(!svc.depends_on["cache"].required);
    }

    #[test]
    fn string_command_is_split_into_words() {
        let svc = service("command: sh -c 'echo hi'\n");
        assert_eq!(
            svc.command,
            Some(vec!["sh".to_owned(), "-c".to_owned(), "echo hi".to_owned()])
        );
    }

    #[test]
    fn healthcheck_string_test_becomes_cmd_shell() {
        let svc = service("healthcheck:\n  test: curl -f localhost\n");
        let hc = svc.healthcheck.expect("healthcheck");
        assert_eq!(hc.test, vec!["CMD-SHELL", "curl -f localhost"]);
    }

    #[test]
    fn ports_accept_numbers_strings_and_mappings() {
        let svc = service("ports:\n  - 80\n  - \"8080:80\"\n  - target: 443\n    published: 8443\n");
        assert_eq!(svc.ports[0], PortEntry::Short("80".into()));
        assert_eq!(svc.ports[1], PortEntry::Short("8080:80".into()));
        match &svc.ports[2] {
            PortEntry::Long(p) => {
                assert_eq!(p.target, 443);
                assert_eq!(p.published.as_deref(), Some("8443"));
            }
            PortEntry::Short(s) => panic!("expected long form, got {s}"),
        }
    }

    #[test]
    fn external_accepts_legacy_mapping() {
        let net: NetworkDef = serde_yaml::from_str("external:\n  name: shared\n").expect("parse");
        assert!(net.external.enabled);
        assert_eq!(net.external.name.as_deref(), Some("shared"));
    }

    #[test]
    fn extra_hosts_map_form_is_flattened() {
        let svc = service("extra_hosts:\n  db: 10.0.0.2\n");
        assert_eq!(svc.extra_hosts, vec!["db:10.0.0.2"]);
    }

    #[test]
    fn null_top_level_entries_default() {
        let project: ComposeProject =
            serde_yaml::from_str("services:\n  web:\n    image: nginx\nnetworks:\n  front:\n")
                .expect("parse");
        assert!(project.networks.contains_key("front"));
        assert_eq!(project.services["web"].name, "web");
    }
}
