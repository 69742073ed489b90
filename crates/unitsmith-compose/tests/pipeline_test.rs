//! End-to-end tests for the resolution pipeline.
//!
//! Each test loads a Compose manifest from YAML text and runs the full
//! generator:
//! 1. Dependency relationships and uphold direction
//! 2. Restart policy translation
//! 3. Pruning of unused and external resources
//! 4. Label overrides
//! 5. The Podman device-volume rewrite
//! 6. Determinism and reference integrity

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use unitsmith_common::config::GeneratorConfig;
use unitsmith_common::error::{Result, UnitsmithError};
use unitsmith_common::types::ContainerRuntime;
use unitsmith_compose::model::{ComposeModel, SystemdValue};
use unitsmith_compose::{Generator, MountProvider, NoMounts, manifest};

fn config() -> GeneratorConfig {
    GeneratorConfig {
        project: "app".into(),
        root_path: Some(PathBuf::from("/srv/app")),
        ..GeneratorConfig::default()
    }
}

fn resolve_with(yaml: &str, config: GeneratorConfig) -> Result<ComposeModel> {
    let project = manifest::load_str(yaml)?;
    Generator::new(config, &NoMounts).run(&project)
}

fn resolve(yaml: &str) -> ComposeModel {
    resolve_with(yaml, config()).expect("should resolve")
}

const TWO_SERVICES: &str = r"
services:
  a:
    image: postgres
  b:
    image: nginx
    depends_on: [a]
";

// ── Dependencies ─────────────────────────────────────────────────────

#[test]
fn pipeline_dependency_orders_and_requires() {
    let model = resolve(TWO_SERVICES);
    let b = model.container("app-b").expect("b");
    let rel = &b.systemd.relations;
    assert!(rel.after.contains("podman-app-a.service"));
    assert!(rel.requires.contains("podman-app-a.service"));
    assert!(rel.upheld_by.is_empty());
    assert_eq!(model.startup_order, vec!["app-a", "app-b"]);
}

#[test]
fn pipeline_uphold_edge_points_from_dependent_to_dependency() {
    let model = resolve_with(
        TWO_SERVICES,
        GeneratorConfig {
            use_upheld_by: true,
            ..config()
        },
    )
    .expect("should resolve");

    let a = model.container("app-a").expect("a");
    let b = model.container("app-b").expect("b");
    assert!(b.systemd.relations.upheld_by.contains("podman-app-a.service"));
    assert!(!a.systemd.relations.upheld_by.contains("podman-app-b.service"));
}

#[test]
fn pipeline_missing_dependency_is_fatal() {
    let err = resolve_with(
        "services:\n  web:\n    image: nginx\n    depends_on: [ghost]\n",
        config(),
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "service \"web\" depends on non-existent service \"ghost\""
    );
}

#[test]
fn pipeline_containers_join_root_target() {
    let model = resolve(TWO_SERVICES);
    let target = model.root_target.clone().expect("root target");
    assert_eq!(target, "podman-compose-app-root.target");
    for c in &model.containers {
        assert!(c.systemd.relations.part_of.contains(&target));
        assert!(c.systemd.relations.wanted_by.contains(&target));
    }
}

#[test]
fn pipeline_network_and_volume_edges() {
    let model = resolve(
        r"
services:
  web:
    image: nginx
    networks: [front, outside]
    volumes:
      - data:/var/lib/data
networks:
  front:
  outside:
    external: true
volumes:
  data:
",
    );
    let rel = &model.container("app-web").expect("web").systemd.relations;
    assert!(rel.requires.contains("podman-network-app-front.service"));
    assert!(rel.requires.contains("podman-volume-data.service"));
    assert!(!rel.requires.iter().any(|u| u.contains("outside")));
    assert_eq!(model.networks.len(), 1);
}

#[test]
fn pipeline_colliding_container_names_are_fatal() {
    let err = resolve_with(
        "services:\n  a:\n    image: x\n    container_name: app-b\n  b:\n    image: y\n",
        config(),
    )
    .unwrap_err();
    assert!(matches!(err, UnitsmithError::Manifest { .. }), "{err}");
    assert!(err.to_string().contains("\"a\" and \"b\""), "{err}");
}

// ── Restart ──────────────────────────────────────────────────────────

#[test]
fn pipeline_restart_on_failure_with_count() {
    let model = resolve("services:\n  web:\n    image: nginx\n    restart: on-failure:3\n");
    let web = model.container("app-web").expect("web");
    assert_eq!(web.systemd.service["Restart"], SystemdValue::Str("on-failure".into()));
    assert_eq!(web.systemd.unit["StartLimitBurst"], SystemdValue::Int(3));
    assert!(web.systemd.unit.contains_key("StartLimitIntervalSec"));
}

#[test]
fn pipeline_restart_no_emits_nothing() {
    let model = resolve("services:\n  web:\n    image: nginx\n    restart: \"no\"\n");
    let web = model.container("app-web").expect("web");
    assert!(!web.systemd.service.contains_key("Restart"));
    assert!(!web.systemd.unit.contains_key("StartLimitBurst"));
    assert!(!web.systemd.unit.contains_key("StartLimitIntervalSec"));
}

#[test]
fn pipeline_unsupported_restart_is_fatal() {
    let err = resolve_with(
        "services:\n  web:\n    image: nginx\n    restart: sometimes\n",
        config(),
    )
    .unwrap_err();
    assert!(matches!(err, UnitsmithError::UnsupportedValue { .. }), "{err}");
}

// ── Pruning ──────────────────────────────────────────────────────────

const UNUSED_NETWORK: &str = r"
services:
  web:
    image: nginx
networks:
  spare:
";

#[test]
fn pipeline_unused_network_is_pruned() {
    let model = resolve(UNUSED_NETWORK);
    assert!(model.networks.is_empty());
}

#[test]
fn pipeline_unused_network_kept_once_when_requested() {
    let model = resolve_with(
        UNUSED_NETWORK,
        GeneratorConfig {
            keep_unused_resources: true,
            ..config()
        },
    )
    .expect("should resolve");
    assert_eq!(model.networks.len(), 1);
    assert_eq!(model.networks[0].name, "app-spare");
}

// ── Labels ───────────────────────────────────────────────────────────

#[test]
fn pipeline_label_adds_after_and_is_stripped() {
    let model = resolve(
        r"
services:
  web:
    image: nginx
    labels:
      unitsmith.systemd.unit.After: foo.service
      com.example.team: web
",
    );
    let web = model.container("app-web").expect("web");
    assert!(web.systemd.relations.after.contains("foo.service"));
    assert!(!web.labels.contains_key("unitsmith.systemd.unit.After"));
    assert_eq!(web.labels.get("com.example.team").map(String::as_str), Some("web"));
}

#[test]
fn pipeline_label_overrides_restart() {
    let model = resolve(
        r"
services:
  web:
    image: nginx
    restart: always
    labels:
      - unitsmith.systemd.service.Restart=on-abnormal
",
    );
    let web = model.container("app-web").expect("web");
    assert_eq!(web.systemd.service["Restart"], SystemdValue::Str("on-abnormal".into()));

    let json = serde_json::to_value(web).expect("serialize");
    assert_eq!(json["systemd"]["service"]["Restart"], "on-abnormal");
    assert!(json["systemd"].get("restart").is_none());
}

#[test]
fn pipeline_bad_label_namespace_is_fatal() {
    let err = resolve_with(
        "services:\n  web:\n    image: nginx\n    labels:\n      unitsmith.systemd.timer.OnCalendar: daily\n",
        config(),
    )
    .unwrap_err();
    assert!(matches!(err, UnitsmithError::UnsupportedValue { .. }), "{err}");
}

// ── Device volumes ───────────────────────────────────────────────────

const NFS: &str = r"
services:
  media:
    image: jellyfin
    volumes:
      - nas:/media:ro
volumes:
  nas:
    driver_opts:
      type: nfs
      o: addr=10.0.0.2,ro
      device: /mnt/nas/media
";

#[test]
fn pipeline_podman_rewrites_device_volume() {
    let model = resolve(NFS);
    assert!(model.volumes.is_empty());
    let media = model.container("app-media").expect("media");
    assert!(!media.uses_volume("nas"));
    assert_eq!(media.volumes["/media"].to_string(), "/mnt/nas/media:/media:ro");
    assert!(
        !media
            .systemd
            .relations
            .requires
            .iter()
            .any(|u| u.contains("volume"))
    );
}

#[test]
fn pipeline_docker_keeps_device_volume() {
    let model = resolve_with(
        NFS,
        GeneratorConfig {
            runtime: ContainerRuntime::Docker,
            ..config()
        },
    )
    .expect("should resolve");
    assert_eq!(model.volumes.len(), 1);
    assert!(model.container("app-media").expect("media").uses_volume("nas"));
}

#[derive(Debug)]
struct NasMounts;

impl MountProvider for NasMounts {
    fn find_mount(&self, path: &Path) -> Result<Option<String>> {
        Ok(path
            .starts_with("/mnt/nas")
            .then(|| "mnt-nas.mount".to_owned()))
    }
}

#[test]
fn pipeline_mount_checks_use_provider() {
    let project = manifest::load_str(NFS).expect("manifest");
    let model = Generator::new(
        GeneratorConfig {
            check_systemd_mounts: true,
            ..config()
        },
        &NasMounts,
    )
    .run(&project)
    .expect("should resolve");
    let media = model.container("app-media").expect("media");
    assert!(
        media
            .systemd
            .relations
            .requires_mounts_for
            .contains("/mnt/nas/media")
    );
}

// ── Integrity ────────────────────────────────────────────────────────

const STACK: &str = r"
services:
  proxy:
    image: traefik
    networks: [front]
    depends_on: [api]
    ports: ['80:80', '443:443']
  api:
    image: api
    networks: [front, back]
    depends_on:
      db:
        condition: service_healthy
      cache:
        required: false
    restart: unless-stopped
    environment:
      B: 2
      A: 1
  db:
    image: postgres
    networks: [back]
    volumes: [pgdata:/var/lib/postgresql/data]
    healthcheck:
      test: [CMD, pg_isready]
      interval: 10s
  cache:
    image: redis
    network_mode: service:db
networks:
  front:
  back:
volumes:
  pgdata:
";

#[test]
fn pipeline_output_is_deterministic() {
    let first = serde_json::to_string(&resolve(STACK)).expect("serialize");
    let second = serde_json::to_string(&resolve(STACK)).expect("serialize");
    assert_eq!(first, second);
}

#[test]
fn pipeline_relationships_never_dangle() {
    let model = resolve_with(
        STACK,
        GeneratorConfig {
            use_upheld_by: true,
            ..config()
        },
    )
    .expect("should resolve");
    let units = model.unit_names();
    let all = model
        .containers
        .iter()
        .map(|c| &c.systemd.relations)
        .chain(model.networks.iter().map(|n| &n.relations))
        .chain(model.volumes.iter().map(|v| &v.relations));
    for rel in all {
        for unit in rel.unit_names() {
            assert!(units.contains(unit), "dangling unit {unit}");
        }
    }
}

#[test]
fn pipeline_startup_order_respects_dependencies() {
    let model = resolve(STACK);
    let pos = |name: &str| {
        model
            .startup_order
            .iter()
            .position(|n| n == name)
            .expect(name)
    };
    assert!(pos("app-db") < pos("app-api"));
    assert!(pos("app-db") < pos("app-cache"));
    assert!(pos("app-cache") < pos("app-api"));
    assert!(pos("app-api") < pos("app-proxy"));
}

#[test]
fn pipeline_ordering_only_dependency_has_no_requirement() {
    let model = resolve(STACK);
    let rel = &model.container("app-api").expect("api").systemd.relations;
    assert!(rel.after.contains("podman-app-cache.service"));
    assert!(!rel.requires.contains("podman-app-cache.service"));
    assert!(rel.requires.contains("podman-app-db.service"));
}
