//! Attribute mapping.
//!
//! Turns one manifest service into a [`Container`] record: environment,
//! ports, mounts, network attachment, runtime flags, logging, health check,
//! resources, and restart policy. Relationship sets are left empty here and
//! filled in by the graph builder.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use unitsmith_common::config::GeneratorConfig;
use unitsmith_common::constants::{COMPOSE_DEFAULT_LOG_DRIVER, DEFAULT_LOG_DRIVER};
use unitsmith_common::error::{Result, UnitsmithError};
use unitsmith_common::types::ContainerRuntime;

use crate::envfile;
use crate::healthcheck;
use crate::labels::LabelOverrides;
use crate::manifest::syntax::{self, PortSpec};
use crate::manifest::types::{PortEntry, Service, Ulimit};
use crate::model::{Container, DependencyOrigin, SystemdConfig};
use crate::mounts::{self, ResolvedMount};
use crate::naming::NameTable;
use crate::resources;
use crate::restart;

/// A container plus the label overrides still to be applied to it.
#[derive(Debug, Clone)]
pub struct MappedService {
    /// The container record.
    pub container: Container,
    /// Overrides applied after the graph is built.
    pub overrides: LabelOverrides,
}

/// Per-run context for mapping services.
#[derive(Debug)]
pub struct Mapper<'a> {
    config: &'a GeneratorConfig,
    names: &'a NameTable,
    root: &'a Path,
    env_overrides: &'a BTreeMap<String, String>,
}

impl<'a> Mapper<'a> {
    /// Creates a mapper.
    ///
    /// `env_overrides` supplies values for variables declared without one.
    #[must_use]
    pub const fn new(
        config: &'a GeneratorConfig,
        names: &'a NameTable,
        root: &'a Path,
        env_overrides: &'a BTreeMap<String, String>,
    ) -> Self {
        Self {
            config,
            names,
            root,
            env_overrides,
        }
    }

    /// Maps `service` into a container record.
    ///
    /// # Errors
    ///
    /// Returns the first resolution error: unknown references, unsupported
    /// values, malformed labels, or missing env files.
    pub fn map(&self, service: &Service) -> Result<MappedService> {
        let svc = service.name.as_str();
        let runtime = self.config.runtime;
        let name = self.names.container(svc, svc)?.to_owned();
        let image = service.image.clone().ok_or_else(|| {
            UnitsmithError::manifest(format!("service \"{svc}\" has no image"))
        })?;
        tracing::debug!(service = svc, container = %name, "mapping service");

        let (overrides, labels) = LabelOverrides::extract(svc, &service.labels)?;
        let mut extra_options = BTreeSet::new();

        let (environment, env_files) = self.environment(service)?;

        let mut volumes = BTreeMap::new();
        let mut targets = BTreeSet::new();
        for entry in &service.volumes {
            let resolved = mounts::resolve(svc, entry, self.names, self.root)?;
            let target = match &resolved {
                ResolvedMount::Mount(m) => m.target.clone(),
                ResolvedMount::Tmpfs(target) => target.clone(),
            };
            if !targets.insert(target.clone()) {
                return Err(UnitsmithError::manifest(format!(
                    "service \"{svc}\" mounts more than one volume at \"{target}\""
                )));
            }
            match resolved {
                ResolvedMount::Mount(m) => {
                    let _ = volumes.insert(target, m);
                }
                ResolvedMount::Tmpfs(target) => {
                    let _ = extra_options.insert(format!("--tmpfs={target}"));
                }
            }
        }

        let mut dependencies = BTreeMap::new();
        for (dep, spec) in &service.depends_on {
            let peer = self.names.container(svc, dep)?.to_owned();
            let origin = if spec.required {
                DependencyOrigin::Explicit
            } else {
                DependencyOrigin::OrderingOnly
            };
            add_dependency(&mut dependencies, peer, origin);
        }

        let mut networks = BTreeSet::new();
        for (key, attach) in &service.networks {
            let _ = networks.insert(self.names.network(svc, key)?.to_owned());
            for alias in &attach.aliases {
                let _ = extra_options.insert(format!("--network-alias={alias}"));
            }
            if let Some(ip) = &attach.ipv4_address {
                let _ = extra_options.insert(format!("--ip={ip}"));
            }
            if let Some(ip) = &attach.ipv6_address {
                let _ = extra_options.insert(format!("--ip6={ip}"));
            }
        }
        let mut in_bridge = !networks.is_empty();
        if let Some(mode) = service.network_mode.as_deref() {
            let resolved = self.network_mode(svc, mode)?;
            in_bridge |= resolved.bridge;
            extra_options.extend(resolved.flag);
            if let Some(peer) = resolved.peer {
                add_dependency(&mut dependencies, peer, DependencyOrigin::NetworkMode);
            }
        }
        if in_bridge {
            let _ = extra_options.insert(format!("--network-alias={svc}"));
        }

        extra_options.extend(runtime_flags(service)?);
        extra_options.extend(logging_options(service));
        if let Some(hc) = &service.healthcheck {
            extra_options.extend(healthcheck::flags(svc, runtime, hc)?);
        }
        if let Some(res) = service.deploy.as_ref().and_then(|d| d.resources.as_ref()) {
            extra_options.extend(resources::flags(svc, runtime, res)?);
        }

        let mut restart = restart::translate(
            svc,
            service.restart.as_deref(),
            service.deploy.as_ref().and_then(|d| d.restart_policy.as_ref()),
        )?;
        if runtime == ContainerRuntime::Docker && self.config.docker_restart_backoff {
            restart = restart.with_docker_backoff();
        }

        let container = Container {
            runtime,
            service_name: svc.to_owned(),
            name,
            image,
            environment,
            env_files,
            ports: service
                .ports
                .iter()
                .map(port_string)
                .collect::<Result<_>>()?,
            labels,
            networks,
            extra_options,
            dependencies,
            volumes,
            log_driver: self.log_driver(service),
            user: service.user.clone(),
            command: service.command.clone().unwrap_or_default(),
            systemd: SystemdConfig {
                restart,
                service: restart.service_settings(),
                unit: restart.unit_settings(),
                ..SystemdConfig::default()
            },
            auto_start: overrides.auto_start.unwrap_or(self.config.auto_start),
        };
        Ok(MappedService {
            container,
            overrides,
        })
    }

    /// Inlined variables and referenced env files.
    ///
    /// With `env_files_only` nothing is inlined and the container only
    /// references the CLI env files.
    fn environment(
        &self,
        service: &Service,
    ) -> Result<(BTreeMap<String, String>, Vec<String>)> {
        let svc = service.name.as_str();
        let mut vars = BTreeMap::new();
        let mut files = Vec::new();

        if self.config.env_files_only {
            for path in &self.config.env_files {
                if let Some(p) = self.existing_env_file("", path, true)? {
                    push_unique(&mut files, p);
                }
            }
            tracing::debug!(service = svc, files = files.len(), "referencing CLI env files only");
            return Ok((vars, files));
        }
        if self.config.include_env_files {
            for path in &self.config.env_files {
                if let Some(p) = self.existing_env_file("", path, true)? {
                    push_unique(&mut files, p);
                }
            }
        }
        for file in &service.env_file {
            let Some(path) = self.existing_env_file(svc, Path::new(&file.path), file.required)?
            else {
                continue;
            };
            if self.config.include_env_files {
                push_unique(&mut files, path);
            } else {
                vars.extend(envfile::read(&path)?);
            }
        }

        for (key, value) in &service.environment {
            let value = value.clone().or_else(|| self.env_overrides.get(key).cloned());
            match value {
                Some(v) => {
                    let _ = vars.insert(key.clone(), v);
                }
                None => tracing::debug!(service = svc, var = %key, "dropping unset variable"),
            }
        }
        Ok((vars, files))
    }

    /// Absolute path of an env file, or `None` when it may be skipped.
    fn existing_env_file(
        &self,
        service: &str,
        path: &Path,
        required: bool,
    ) -> Result<Option<PathBuf>> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        if path.exists() {
            return Ok(Some(path));
        }
        if !required {
            tracing::debug!(service, path = %path.display(), "optional env file missing");
            return Ok(None);
        }
        if self.config.ignore_missing_env_files {
            tracing::warn!(service, path = %path.display(), "skipping missing env file");
            return Ok(None);
        }
        Err(UnitsmithError::MissingInput {
            service: service.to_owned(),
            path,
        })
    }

    fn network_mode(&self, svc: &str, mode: &str) -> Result<NetworkMode> {
        let podman = self.config.runtime == ContainerRuntime::Podman;
        let flag = |m: &str| Some(format!("--network={m}"));
        let resolved = match mode {
            "" => NetworkMode::default(),
            "none" | "host" => NetworkMode {
                flag: flag(mode),
                ..NetworkMode::default()
            },
            "bridge" => NetworkMode {
                flag: flag(mode),
                bridge: true,
                peer: None,
            },
            m if podman
                && (m == "private"
                    || m.starts_with("slirp4netns")
                    || m.starts_with("pasta")
                    || m.starts_with("ns:")) =>
            {
                NetworkMode {
                    flag: flag(m),
                    ..NetworkMode::default()
                }
            }
            m => {
                if let Some(target) = m.strip_prefix("service:") {
                    let peer = self.names.container(svc, target)?.to_owned();
                    NetworkMode {
                        flag: flag(&format!("container:{peer}")),
                        bridge: false,
                        peer: Some(peer),
                    }
                } else if let Some(target) = m.strip_prefix("container:") {
                    let peer = if self.names.is_project_container(target) {
                        Some(target.to_owned())
                    } else {
                        tracing::warn!(
                            service = svc,
                            container = target,
                            "network peer is not part of this project; no dependency added"
                        );
                        None
                    };
                    NetworkMode {
                        flag: flag(m),
                        bridge: false,
                        peer,
                    }
                } else {
                    return Err(UnitsmithError::unsupported(svc, "network_mode", m));
                }
            }
        };
        Ok(resolved)
    }

    fn log_driver(&self, service: &Service) -> String {
        match service.logging.as_ref().and_then(|l| l.driver.as_deref()) {
            Some(d) if d != COMPOSE_DEFAULT_LOG_DRIVER || self.config.use_compose_log_driver => {
                d.to_owned()
            }
            _ => DEFAULT_LOG_DRIVER.to_owned(),
        }
    }
}

#[derive(Debug, Default)]
struct NetworkMode {
    flag: Option<String>,
    bridge: bool,
    peer: Option<String>,
}

/// Keeps the strongest origin when a peer is reached more than one way.
fn add_dependency(
    deps: &mut BTreeMap<String, DependencyOrigin>,
    peer: String,
    origin: DependencyOrigin,
) {
    let _ = deps
        .entry(peer)
        .and_modify(|o| *o = (*o).min(origin))
        .or_insert(origin);
}

fn logging_options(service: &Service) -> Vec<String> {
    service
        .logging
        .iter()
        .flat_map(|l| &l.options)
        .map(|(k, v)| format!("--log-opt={k}={v}"))
        .collect()
}

fn push_unique(files: &mut Vec<String>, path: PathBuf) {
    let path = path.to_string_lossy().into_owned();
    if !files.contains(&path) {
        files.push(path);
    }
}

fn port_string(entry: &PortEntry) -> Result<String> {
    let spec = match entry {
        PortEntry::Short(raw) => syntax::parse_port(raw)?,
        PortEntry::Long(long) => PortSpec {
            host_ip: long.host_ip.clone(),
            published: long.published.clone(),
            target: long.target.to_string(),
            protocol: long.protocol.clone(),
        },
    };
    Ok(spec.to_string())
}

/// One-to-one flags that need no context beyond the service itself.
fn runtime_flags(service: &Service) -> Result<Vec<String>> {
    let svc = service.name.as_str();
    let mut out = Vec::new();
    let mut each = |flag: &str, values: &[String]| {
        out.extend(values.iter().map(|v| format!("--{flag}={v}")));
    };
    each("cap-add", &service.cap_add);
    each("cap-drop", &service.cap_drop);
    each("device", &service.devices);
    each("security-opt", &service.security_opt);
    each("add-host", &service.extra_hosts);
    each("dns", &service.dns);
    each("dns-search", &service.dns_search);
    each("dns-option", &service.dns_opt);
    each("tmpfs", &service.tmpfs);

    out.extend(service.sysctls.iter().map(|(k, v)| format!("--sysctl={k}={v}")));
    out.extend(service.ulimits.iter().map(|(name, limit)| match limit {
        Ulimit::Single(v) => format!("--ulimit={name}={v}"),
        Ulimit::Pair { soft, hard } => format!("--ulimit={name}={soft}:{hard}"),
    }));
    let scalars = [
        ("shm-size", &service.shm_size),
        ("mac-address", &service.mac_address),
        ("hostname", &service.hostname),
        ("workdir", &service.working_dir),
        ("stop-signal", &service.stop_signal),
    ];
    for (flag, value) in scalars {
        if let Some(v) = value {
            out.push(format!("--{flag}={v}"));
        }
    }
    if service.init {
        out.push("--init".to_owned());
    }
    if service.privileged {
        out.push("--privileged".to_owned());
    }
    if let Some(grace) = &service.stop_grace_period {
        let d = syntax::parse_duration(grace)
            .map_err(|_| UnitsmithError::unsupported(svc, "stop_grace_period", grace.clone()))?;
        out.push(format!("--stop-timeout={}", d.as_secs()));
    }
    match service.entrypoint.as_deref() {
        None | Some([]) => {}
        Some([single]) => out.push(format!("--entrypoint={single}")),
        Some(words) => out.push(format!("--entrypoint={}", serde_json::to_string(words)?)),
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{self, ComposeProject};

    struct Fixture {
        manifest: ComposeProject,
        names: NameTable,
        config: GeneratorConfig,
        env: BTreeMap<String, String>,
        root: PathBuf,
    }

    impl Fixture {
        fn new(yaml: &str, config: GeneratorConfig) -> Self {
            let manifest = manifest::load_str(yaml).expect("manifest");
            let names = NameTable::build(&config.project(), &manifest).expect("names");
            Self {
                manifest,
                names,
                config,
                env: BTreeMap::new(),
                root: PathBuf::from("/srv/app"),
            }
        }

        fn map(&self, service: &str) -> Result<MappedService> {
            Mapper::new(&self.config, &self.names, &self.root, &self.env)
                .map(&self.manifest.services[service])
        }
    }

    fn podman() -> GeneratorConfig {
        GeneratorConfig {
            project: "app".into(),
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn unset_variables_are_dropped_or_overridden() {
        let mut fx = Fixture::new(
            "services:\n  web:\n    image: nginx\n    environment:\n      A: 1\n      B:\n      C:\n",
            podman(),
        );
        let _ = fx.env.insert("C".into(), "from-cli".into());
        let c = fx.map("web").expect("map").container;
        assert_eq!(c.environment.get("A").map(String::as_str), Some("1"));
        assert!(!c.environment.contains_key("B"));
        assert_eq!(c.environment.get("C").map(String::as_str), Some("from-cli"));
    }

    #[test]
    fn bridge_membership_adds_service_alias() {
        let fx = Fixture::new(
            "services:\n  web:\n    image: nginx\n    networks:\n      front:\n        aliases: [www]\nnetworks:\n  front:\n",
            podman(),
        );
        let c = fx.map("web").expect("map").container;
        assert_eq!(c.name, "app-web");
        assert!(c.networks.contains("app-front"));
        assert!(c.extra_options.contains("--network-alias=web"));
        assert!(c.extra_options.contains("--network-alias=www"));
    }

    #[test]
    fn service_network_mode_adds_dependency() {
        let fx = Fixture::new(
            "services:\n  vpn:\n    image: vpn\n  app:\n    image: app\n    network_mode: service:vpn\n",
            podman(),
        );
        let c = fx.map("app").expect("map").container;
        assert!(c.extra_options.contains("--network=container:app-vpn"));
        assert_eq!(c.dependencies.get("app-vpn"), Some(&DependencyOrigin::NetworkMode));
    }

    #[test]
    fn external_container_network_mode_is_not_validated() {
        let fx = Fixture::new(
            "services:\n  app:\n    image: app\n    network_mode: container:elsewhere\n",
            podman(),
        );
        let c = fx.map("app").expect("map").container;
        assert!(c.extra_options.contains("--network=container:elsewhere"));
        assert!(c.dependencies.is_empty());
    }

    #[test]
    fn unsupported_network_mode_fails() {
        let fx = Fixture::new(
            "services:\n  app:\n    image: app\n    network_mode: pasta\n",
            GeneratorConfig {
                runtime: ContainerRuntime::Docker,
                ..podman()
            },
        );
        let err = fx.map("app").unwrap_err();
        assert!(err.to_string().contains("network_mode"), "{err}");

        let fx = Fixture::new(
            "services:\n  app:\n    image: app\n    network_mode: pasta:-T,8080\n",
            podman(),
        );
        let c = fx.map("app").expect("map").container;
        assert!(c.extra_options.contains("--network=pasta:-T,8080"));
    }

    #[test]
    fn missing_dependency_is_unresolved() {
        let fx = Fixture::new(
            "services:\n  web:\n    image: nginx\n    depends_on: [db]\n",
            podman(),
        );
        let err = fx.map("web").unwrap_err();
        assert_eq!(
            err.to_string(),
            "service \"web\" depends on non-existent service \"db\""
        );
    }

    #[test]
    fn compose_default_log_driver_is_ignored_unless_forced() {
        let yaml = "services:\n  web:\n    image: nginx\n    logging:\n      driver: json-file\n      options:\n        max-size: 10m\n";
        let c = Fixture::new(yaml, podman()).map("web").expect("map").container;
        assert_eq!(c.log_driver, "journald");
        assert!(c.extra_options.contains("--log-opt=max-size=10m"));

        let forced = GeneratorConfig {
            use_compose_log_driver: true,
            ..podman()
        };
        let c = Fixture::new(yaml, forced).map("web").expect("map").container;
        assert_eq!(c.log_driver, "json-file");
    }

    #[test]
    fn one_to_one_flags_are_emitted() {
        let yaml = r"
services:
  web:
    image: nginx
    cap_add: [NET_ADMIN]
    sysctls:
      net.core.somaxconn: 1024
    shm_size: 64m
    extra_hosts: ['db:10.0.0.2']
    ulimits:
      nofile:
        soft: 1024
        hard: 2048
    stop_grace_period: 1m
    entrypoint: [/bin/sh, -c]
    init: true
";
        let c = Fixture::new(yaml, podman()).map("web").expect("map").container;
        for flag in [
            "--cap-add=NET_ADMIN",
            "--sysctl=net.core.somaxconn=1024",
            "--shm-size=64m",
            "--add-host=db:10.0.0.2",
            "--ulimit=nofile=1024:2048",
            "--stop-timeout=60",
            "--entrypoint=[\"/bin/sh\",\"-c\"]",
            "--init",
        ] {
            assert!(c.extra_options.contains(flag), "missing {flag}: {:?}", c.extra_options);
        }
    }

    #[test]
    fn ports_keep_declaration_order() {
        let yaml = "services:\n  web:\n    image: nginx\n    ports:\n      - \"9000:90\"\n      - 127.0.0.1:8080:80/tcp\n      - target: 443\n        published: 8443\n";
        let c = Fixture::new(yaml, podman()).map("web").expect("map").container;
        assert_eq!(c.ports, vec!["9000:90", "127.0.0.1:8080:80/tcp", "8443:443"]);
    }

    #[test]
    fn docker_gets_restart_backoff() {
        let yaml = "services:\n  web:\n    image: nginx\n    restart: always\n";
        let docker = GeneratorConfig {
            runtime: ContainerRuntime::Docker,
            ..podman()
        };
        let c = Fixture::new(yaml, docker).map("web").expect("map").container;
        assert!(c.systemd.restart.backoff.is_some());
        assert!(c.systemd.service.contains_key("RestartSteps"));

        let c = Fixture::new(yaml, podman()).map("web").expect("map").container;
        assert!(c.systemd.restart.backoff.is_none());
    }

    #[test]
    fn env_files_are_inlined_or_referenced() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("app.env"), "FROM_FILE=1\nA=file\n").expect("write");
        let yaml = "services:\n  web:\n    image: nginx\n    env_file: app.env\n    environment:\n      A: inline\n";

        let mut fx = Fixture::new(yaml, podman());
        fx.root = dir.path().to_path_buf();
        let c = fx.map("web").expect("map").container;
        assert_eq!(c.environment["FROM_FILE"], "1");
        assert_eq!(c.environment["A"], "inline");
        assert!(c.env_files.is_empty());

        let mut fx = Fixture::new(
            yaml,
            GeneratorConfig {
                include_env_files: true,
                ..podman()
            },
        );
        fx.root = dir.path().to_path_buf();
        let c = fx.map("web").expect("map").container;
        assert!(!c.environment.contains_key("FROM_FILE"));
        assert_eq!(c.env_files.len(), 1);
    }

    #[test]
    fn missing_env_file_fails_unless_ignored() {
        let yaml = "services:\n  web:\n    image: nginx\n    env_file: /nonexistent/app.env\n";
        let err = Fixture::new(yaml, podman()).map("web").unwrap_err();
        assert!(matches!(err, UnitsmithError::MissingInput { .. }), "{err}");

        let ignoring = GeneratorConfig {
            ignore_missing_env_files: true,
            ..podman()
        };
        assert!(Fixture::new(yaml, ignoring).map("web").is_ok());

        let optional =
            "services:\n  web:\n    image: nginx\n    env_file:\n      - path: /nonexistent/app.env\n        required: false\n";
        assert!(Fixture::new(optional, podman()).map("web").is_ok());
    }

    #[test]
    fn auto_start_label_overrides_default() {
        let yaml = "services:\n  web:\n    image: nginx\n    labels:\n      unitsmith.settings.autoStart: \"false\"\n";
        let mapped = Fixture::new(yaml, podman()).map("web").expect("map");
        assert!(!mapped.container.auto_start);
        assert!(mapped.container.labels.is_empty());
    }

    #[test]
    fn env_files_only_references_cli_files_without_inlining() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cli_env = dir.path().join("cli.env");
        std::fs::write(&cli_env, "TOKEN=secret\n").expect("write");
        std::fs::write(dir.path().join("app.env"), "FROM_FILE=1\n").expect("write");
        let yaml = "services:\n  web:\n    image: nginx\n    env_file: app.env\n    environment:\n      A: inline\n";

        let mut fx = Fixture::new(
            yaml,
            GeneratorConfig {
                env_files: vec![cli_env.clone()],
                env_files_only: true,
                ..podman()
            },
        );
        fx.root = dir.path().to_path_buf();
        let c = fx.map("web").expect("map").container;
        assert!(c.environment.is_empty());
        assert_eq!(c.env_files, vec![cli_env.to_string_lossy().into_owned()]);
    }

    #[test]
    fn duplicate_mount_targets_are_rejected() {
        let yaml = "services:\n  web:\n    image: nginx\n    volumes:\n      - ./a:/data\n      - ./b:/data\n";
        let err = Fixture::new(yaml, podman()).map("web").unwrap_err();
        assert!(matches!(err, UnitsmithError::Manifest { .. }), "{err}");
        assert!(err.to_string().contains("/data"), "{err}");
    }
}
