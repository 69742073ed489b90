//! Name resolution.
//!
//! Computes the final name of every container, network, and volume and
//! answers lookups from manifest-local names. A lookup that misses is an
//! [`UnitsmithError::UnresolvedReference`], never a silent skip.

use std::collections::BTreeMap;

use unitsmith_common::constants::DEFAULT_NETWORK;
use unitsmith_common::error::{Result, UnitsmithError};
use unitsmith_common::types::Project;

use crate::manifest::types::{ComposeProject, External};

/// Lookup tables from manifest-local names to resolved names.
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    containers: BTreeMap<String, String>,
    networks: BTreeMap<String, String>,
    volumes: BTreeMap<String, String>,
}

impl NameTable {
    /// Resolves every name declared in `manifest`.
    ///
    /// Containers use `container_name` or the project-scoped service name.
    /// Networks use their explicit name or the project-scoped key; Compose's
    /// implicit `default` network is always resolvable. Volumes use their
    /// explicit name or the bare key, so that they are shared across
    /// projects the way Compose shares them.
    ///
    /// # Errors
    ///
    /// Returns [`UnitsmithError::Manifest`] if two services resolve to the
    /// same container name.
    pub fn build(project: &Project, manifest: &ComposeProject) -> Result<Self> {
        let mut containers = BTreeMap::new();
        let mut owners: BTreeMap<String, &str> = BTreeMap::new();
        for (key, svc) in &manifest.services {
            let name = svc
                .container_name
                .clone()
                .unwrap_or_else(|| project.with(key));
            if let Some(previous) = owners.insert(name.clone(), key) {
                return Err(UnitsmithError::manifest(format!(
                    "services \"{previous}\" and \"{key}\" both resolve to container name \"{name}\""
                )));
            }
            let _ = containers.insert(key.clone(), name);
        }

        let mut networks: BTreeMap<String, String> = manifest
            .networks
            .iter()
            .map(|(key, def)| {
                let name = explicit_name(def.name.as_ref(), &def.external).unwrap_or_else(|| {
                    if def.external.enabled {
                        key.clone()
                    } else {
                        project.with(key)
                    }
                });
                (key.clone(), name)
            })
            .collect();
        let _ = networks
            .entry(DEFAULT_NETWORK.to_owned())
            .or_insert_with(|| project.with(DEFAULT_NETWORK));

        let volumes = manifest
            .volumes
            .iter()
            .map(|(key, def)| {
                let name = explicit_name(def.name.as_ref(), &def.external)
                    .unwrap_or_else(|| key.clone());
                (key.clone(), name)
            })
            .collect();

        Ok(Self {
            containers,
            networks,
            volumes,
        })
    }

    /// Resolved container name of `service`, as referenced from `referrer`.
    ///
    /// # Errors
    ///
    /// Returns an error if `service` is not declared.
    pub fn container(&self, referrer: &str, service: &str) -> Result<&str> {
        lookup(&self.containers, referrer, "service", service)
    }

    /// Resolved name of the network declared as `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if `key` is not declared.
    pub fn network(&self, referrer: &str, key: &str) -> Result<&str> {
        lookup(&self.networks, referrer, "network", key)
    }

    /// Resolved name of the volume declared as `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if `key` is not declared.
    pub fn volume(&self, referrer: &str, key: &str) -> Result<&str> {
        lookup(&self.volumes, referrer, "volume", key)
    }

    /// Whether `name` is the resolved name of a container in this project.
    #[must_use]
    pub fn is_project_container(&self, name: &str) -> bool {
        self.containers.values().any(|c| c == name)
    }
}

fn explicit_name(name: Option<&String>, external: &External) -> Option<String> {
    name.or(external.name.as_ref()).cloned()
}

fn lookup<'a>(
    table: &'a BTreeMap<String, String>,
    referrer: &str,
    kind: &'static str,
    key: &str,
) -> Result<&'a str> {
    table
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| UnitsmithError::UnresolvedReference {
            service: referrer.to_owned(),
            kind,
            name: key.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest;

    const MANIFEST: &str = r"
services:
  web:
    image: nginx
  db:
    image: postgres
    container_name: main-db
networks:
  front:
  shared:
    external: true
  custom:
    name: exact
volumes:
  data:
  named:
    name: pinned
";

    fn table(project: &str) -> NameTable {
        let manifest = manifest::load_str(MANIFEST).expect("manifest");
        NameTable::build(&Project::new(project), &manifest).expect("names")
    }

    #[test]
    fn containers_are_project_scoped_unless_named() {
        let names = table("shop");
        assert_eq!(names.container("x", "web").expect("web"), "shop-web");
        assert_eq!(names.container("x", "db").expect("db"), "main-db");
        assert!(names.is_project_container("main-db"));
        assert!(!names.is_project_container("db"));
    }

    #[test]
    fn empty_project_leaves_names_bare() {
        let names = table("");
        assert_eq!(names.container("x", "web").expect("web"), "web");
        assert_eq!(names.network("x", "front").expect("front"), "front");
    }

    #[test]
    fn networks_scoped_volumes_not() {
        let names = table("shop");
        assert_eq!(names.network("x", "front").expect("front"), "shop-front");
        assert_eq!(names.network("x", "shared").expect("shared"), "shared");
        assert_eq!(names.network("x", "custom").expect("custom"), "exact");
        assert_eq!(names.volume("x", "data").expect("data"), "data");
        assert_eq!(names.volume("x", "named").expect("named"), "pinned");
    }

    #[test]
    fn missing_service_reports_referrer() {
        let err = table("shop").container("web", "cache").unwrap_err();
        assert_eq!(
            err.to_string(),
            "service \"web\" depends on non-existent service \"cache\""
        );
    }

    #[test]
    fn default_network_resolves_when_undeclared() {
        let names = table("shop");
        assert_eq!(names.network("x", "default").expect("default"), "shop-default");
    }

    #[test]
    fn explicit_name_colliding_with_derived_name_is_rejected() {
        let manifest = manifest::load_str(
            "services:\n  a:\n    image: x\n    container_name: app-b\n  b:\n    image: y\n",
        )
        .expect("manifest");
        let err = NameTable::build(&Project::new("app"), &manifest).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid manifest: services \"a\" and \"b\" both resolve to container name \"app-b\""
        );
    }
}
