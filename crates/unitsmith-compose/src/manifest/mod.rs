//! Compose manifest loading.
//!
//! Turns one or more Compose YAML documents into a [`ComposeProject`]
//! through deserialization, overlay merging, and static validation.

pub mod syntax;
pub mod types;
pub mod validator;

use std::path::Path;

use unitsmith_common::error::{Result, UnitsmithError};

pub use self::types::ComposeProject;

/// Parses a Compose manifest from YAML text.
///
/// # Errors
///
/// Returns an error if the YAML is malformed or fails validation.
pub fn load_str(input: &str) -> Result<ComposeProject> {
    tracing::debug!(bytes = input.len(), "parsing compose manifest");
    let project: ComposeProject =
        serde_yaml::from_str(input).map_err(|e| UnitsmithError::manifest(e.to_string()))?;
    validator::validate(&project)?;
    Ok(project)
}

/// Reads and parses a Compose manifest from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_file(path: &Path) -> Result<ComposeProject> {
    tracing::info!(path = %path.display(), "loading compose manifest");
    let content = std::fs::read_to_string(path).map_err(|e| UnitsmithError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let project: ComposeProject = serde_yaml::from_str(&content).map_err(|e| {
        UnitsmithError::manifest(format!("{}: {e}", path.display()))
    })?;
    Ok(project)
}

/// Loads several manifests, later files overriding earlier ones.
///
/// Services, networks, and volumes are replaced by key; the last non-empty
/// `name:` wins.
///
/// # Errors
///
/// Returns an error if any file fails to load or the merged result fails
/// validation.
pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<ComposeProject> {
    let mut merged = ComposeProject::default();
    for path in paths {
        let overlay = load_file(path.as_ref())?;
        if overlay.name.is_some() {
            merged.name = overlay.name;
        }
        merged.services.extend(overlay.services);
        merged.networks.extend(overlay.networks);
        merged.volumes.extend(overlay.volumes);
    }
    validator::validate(&merged)?;
    Ok(merged)
}
