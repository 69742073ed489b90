//! Unit relationship construction.
//!
//! Derives `After`, `Requires`, `UpheldBy`, `PartOf`, `WantedBy`, and
//! `RequiresMountsFor` for every container, network, and volume, then checks
//! that no relationship points at a unit that is not generated.

use std::collections::BTreeMap;
use std::path::Path;

use unitsmith_common::config::GeneratorConfig;
use unitsmith_common::error::{Result, UnitsmithError};

use crate::model::{
    ComposeModel, Container, DependencyOrigin, MountSource, Network, UnitRelations, Volume,
    container_unit,
};
use crate::mounts::MountProvider;

/// Fills in the relationship sets of every record.
///
/// `networks` and `volumes` must already be pruned: only records present in
/// these slices are treated as managed and receive edges.
///
/// # Errors
///
/// Returns an error if the mount provider fails.
pub fn link(
    config: &GeneratorConfig,
    root_target: Option<&str>,
    mounts: &dyn MountProvider,
    containers: &mut [Container],
    networks: &mut [Network],
    volumes: &mut [Volume],
) -> Result<()> {
    let network_units: BTreeMap<&str, String> =
        networks.iter().map(|n| (n.name.as_str(), n.unit())).collect();
    let volume_units: BTreeMap<&str, String> =
        volumes.iter().map(|v| (v.name.as_str(), v.unit())).collect();

    for c in containers.iter_mut() {
        let rel = &mut c.systemd.relations;
        for (peer, origin) in &c.dependencies {
            let unit = container_unit(c.runtime, peer);
            match origin {
                DependencyOrigin::Explicit => {
                    rel.require(&unit);
                    if config.use_upheld_by {
                        let _ = rel.upheld_by.insert(unit);
                    }
                }
                DependencyOrigin::NetworkMode => rel.require(&unit),
                DependencyOrigin::OrderingOnly => {
                    let _ = rel.after.insert(unit);
                }
            }
        }
        for network in &c.networks {
            if let Some(unit) = network_units.get(network.as_str()) {
                rel.require(unit);
            }
        }
        for mount in c.volumes.values() {
            match &mount.source {
                MountSource::Volume(name) => {
                    if let Some(unit) = volume_units.get(name.as_str()) {
                        rel.require(unit);
                    }
                }
                MountSource::Bind(path) if config.check_systemd_mounts => {
                    require_mount(mounts, &c.name, path, rel)?;
                }
                _ => {}
            }
        }
        if let Some(target) = root_target {
            rel.join_target(target);
        }
        tracing::debug!(
            container = %c.name,
            after = rel.after.len(),
            requires = rel.requires.len(),
            "linked container"
        );
    }

    for network in networks.iter_mut() {
        if let Some(target) = root_target {
            network.relations.join_target(target);
        }
    }
    for volume in volumes.iter_mut() {
        if let Some(target) = root_target {
            volume.relations.join_target(target);
        }
        if config.check_systemd_mounts {
            if let Some(device) = volume.device_path().map(str::to_owned) {
                require_mount(mounts, &volume.name, &device, &mut volume.relations)?;
            }
        }
    }
    Ok(())
}

fn require_mount(
    mounts: &dyn MountProvider,
    owner: &str,
    path: &str,
    rel: &mut UnitRelations,
) -> Result<()> {
    if let Some(unit) = mounts.find_mount(Path::new(path))? {
        tracing::debug!(owner, path, mount = %unit, "waiting for host mount");
        let _ = rel.requires_mounts_for.insert(path.to_owned());
    }
    Ok(())
}

/// Checks that every relationship names a generated unit.
///
/// # Errors
///
/// Returns [`UnitsmithError::UnresolvedReference`] for the first dangling
/// unit name.
pub fn validate(model: &ComposeModel) -> Result<()> {
    let units = model.unit_names();
    let owners = model
        .containers
        .iter()
        .map(|c| (c.name.as_str(), &c.systemd.relations))
        .chain(model.networks.iter().map(|n| (n.name.as_str(), &n.relations)))
        .chain(model.volumes.iter().map(|v| (v.name.as_str(), &v.relations)));
    for (owner, relations) in owners {
        if let Some(missing) = relations.unit_names().find(|u| !units.contains(*u)) {
            return Err(UnitsmithError::UnresolvedReference {
                service: owner.to_owned(),
                kind: "unit",
                name: missing.to_owned(),
            });
        }
    }
    Ok(())
}
