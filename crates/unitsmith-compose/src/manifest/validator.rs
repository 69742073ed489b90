//! Static validation of a loaded manifest.
//!
//! Catches problems that are visible without resolving names: clashing
//! explicit container names and mutually exclusive network settings.

use std::collections::HashMap;

use unitsmith_common::error::{Result, UnitsmithError};

use super::types::ComposeProject;

/// Validates a parsed manifest for semantic correctness.
///
/// # Checks performed
///
/// 1. No two services share an explicit `container_name`.
/// 2. No service sets both `network_mode` and `networks`.
///
/// # Errors
///
/// Returns an error if any check fails.
pub fn validate(project: &ComposeProject) -> Result<()> {
    tracing::debug!(services = project.services.len(), "validating compose manifest");
    check_duplicate_container_names(project)?;
    check_network_mode_exclusive(project)?;
    Ok(())
}

fn check_duplicate_container_names(project: &ComposeProject) -> Result<()> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for service in project.services.values() {
        let Some(name) = service.container_name.as_deref() else {
            continue;
        };
        if let Some(previous) = seen.insert(name, &service.name) {
            return Err(UnitsmithError::manifest(format!(
                "services \"{previous}\" and \"{}\" share container_name \"{name}\"",
                service.name
            )));
        }
    }
    Ok(())
}

fn check_network_mode_exclusive(project: &ComposeProject) -> Result<()> {
    for service in project.services.values() {
        if service.network_mode.is_some() && !service.networks.is_empty() {
            return Err(UnitsmithError::manifest(format!(
                "service \"{}\" declares mutually exclusive network_mode and networks",
                service.name
            )));
        }
    }
    Ok(())
}
