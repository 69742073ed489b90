//! Resource pruning and the Podman device-volume rewrite.

use crate::model::{Container, MountSource, Network, Volume};

/// Replaces device-backed volumes with direct bind mounts.
///
/// Podman cannot reliably mount network filesystems as managed volumes, so
/// a volume with no driver and a `device` option becomes a bind of that
/// device path on every container that mounts it, and the volume is
/// dropped. Must run before [`prune`].
pub fn rewrite_device_volumes(containers: &mut [Container], volumes: &mut Vec<Volume>) {
    volumes.retain(|volume| {
        let device = match (&volume.driver, volume.device_path()) {
            (None, Some(device)) if !volume.external => device,
            _ => return true,
        };
        for c in containers.iter_mut() {
            for mount in c.volumes.values_mut() {
                if mount.volume_name() == Some(volume.name.as_str()) {
                    mount.source = MountSource::Bind(device.to_owned());
                }
            }
        }
        tracing::info!(volume = %volume.name, device, "rewrote device volume into bind mounts");
        false
    });
}

/// Drops external resources and, unless `keep_unused`, unreferenced ones.
///
/// Idempotent: pruning an already pruned set changes nothing.
pub fn prune(
    containers: &[Container],
    networks: &mut Vec<Network>,
    volumes: &mut Vec<Volume>,
    keep_unused: bool,
) {
    let before = (networks.len(), volumes.len());
    networks.retain(|n| {
        !n.external && (keep_unused || containers.iter().any(|c| c.networks.contains(&n.name)))
    });
    volumes.retain(|v| {
        !v.external && (keep_unused || containers.iter().any(|c| c.uses_volume(&v.name)))
    });
    tracing::debug!(
        networks_dropped = before.0 - networks.len(),
        volumes_dropped = before.1 - volumes.len(),
        "pruned resources"
    );
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use proptest::prelude::*;
    use unitsmith_common::types::ContainerRuntime;

    use super::*;
    use crate::model::{MountSpec, SystemdConfig, UnitRelations};

    fn container(networks: &[&str], volumes: &[&str]) -> Container {
        Container {
            runtime: ContainerRuntime::Podman,
            service_name: "svc".into(),
            name: "svc".into(),
            image: "img".into(),
            environment: BTreeMap::new(),
            env_files: Vec::new(),
            ports: Vec::new(),
            labels: BTreeMap::new(),
            networks: networks.iter().map(|n| (*n).to_owned()).collect(),
            extra_options: BTreeSet::new(),
            dependencies: BTreeMap::new(),
            volumes: volumes
                .iter()
                .map(|v| {
                    let target = format!("/{v}");
                    let spec = MountSpec {
                        source: MountSource::Volume((*v).to_owned()),
                        target: target.clone(),
                        options: Vec::new(),
                    };
                    (target, spec)
                })
                .collect(),
            log_driver: "journald".into(),
            user: None,
            command: Vec::new(),
            systemd: SystemdConfig::default(),
            auto_start: true,
        }
    }

    fn network(name: &str, external: bool) -> Network {
        Network {
            runtime: ContainerRuntime::Podman,
            name: name.into(),
            original_name: name.into(),
            driver: None,
            driver_opts: BTreeMap::new(),
            external,
            labels: BTreeMap::new(),
            ipam_driver: None,
            ipam_configs: Vec::new(),
            extra_options: BTreeSet::new(),
            relations: UnitRelations::default(),
        }
    }

    fn volume(name: &str, device: Option<&str>) -> Volume {
        Volume {
            runtime: ContainerRuntime::Podman,
            name: name.into(),
            original_name: name.into(),
            driver: None,
            driver_opts: device
                .map(|d| ("device".to_owned(), d.to_owned()))
                .into_iter()
                .collect(),
            external: false,
            labels: BTreeMap::new(),
            remove_on_stop: false,
            relations: UnitRelations::default(),
        }
    }

    #[test]
    fn unused_network_is_dropped_unless_kept() {
        let containers = vec![container(&["front"], &[])];
        let mut networks = vec![network("front", false), network("spare", false)];
        prune(&containers, &mut networks, &mut Vec::new(), false);
        assert_eq!(networks.len(), 1);
        assert_eq!(networks[0].name, "front");

        let mut networks = vec![network("front", false), network("spare", false)];
        prune(&containers, &mut networks, &mut Vec::new(), true);
        assert_eq!(networks.iter().filter(|n| n.name == "spare").count(), 1);
    }

    #[test]
    fn external_resources_are_always_dropped() {
        let containers = vec![container(&["shared"], &[])];
        let mut networks = vec![network("shared", true)];
        prune(&containers, &mut networks, &mut Vec::new(), true);
        assert!(networks.is_empty());
    }

    #[test]
    fn device_volume_becomes_bind_mount() {
        let mut containers = vec![container(&[], &["nfs", "local"])];
        let mut volumes = vec![volume("nfs", Some("/mnt/nfs/share")), volume("local", None)];
        rewrite_device_volumes(&mut containers, &mut volumes);

        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].name, "local");
        assert!(!containers[0].uses_volume("nfs"));
        assert_eq!(containers[0].volumes["/nfs"].to_string(), "/mnt/nfs/share:/nfs");
    }

    #[test]
    fn device_volume_with_driver_is_kept() {
        let mut containers = vec![container(&[], &["nfs"])];
        let mut with_driver = volume("nfs", Some("/mnt/nfs"));
        with_driver.driver = Some("local".into());
        let mut volumes = vec![with_driver];
        rewrite_device_volumes(&mut containers, &mut volumes);
        assert_eq!(volumes.len(), 1);
        assert!(containers[0].uses_volume("nfs"));
    }

    proptest! {
        #[test]
        fn prune_is_idempotent(
            used in prop::collection::btree_set("[a-d]", 0..4),
            declared in prop::collection::btree_set("[a-f]", 0..6),
            external in prop::collection::btree_set("[a-f]", 0..3),
            keep in any::<bool>(),
        ) {
            let used: Vec<&str> = used.iter().map(String::as_str).collect();
            let containers = vec![container(&used, &used)];
            let mut networks: Vec<Network> = declared
                .iter()
                .map(|n| network(n, external.contains(n)))
                .collect();
            let mut volumes: Vec<Volume> = declared.iter().map(|v| volume(v, None)).collect();

            prune(&containers, &mut networks, &mut volumes, keep);
            let once = (networks.clone(), volumes.clone());
            prune(&containers, &mut networks, &mut volumes, keep);
            prop_assert_eq!(once, (networks, volumes));
        }
    }
}
