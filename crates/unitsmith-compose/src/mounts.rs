//! Mount resolution and host mount introspection.

use std::path::{Component, Path, PathBuf};

use unitsmith_common::error::{Result, UnitsmithError};

use crate::manifest::syntax;
use crate::manifest::types::{VolumeEntry, VolumeLong};
use crate::model::{MountSource, MountSpec};
use crate::naming::NameTable;

/// Finds host mount units.
///
/// The generator asks this when mount checking is enabled so that
/// containers and volumes backed by host paths wait for those paths to be
/// mounted. Implementations may shell out; the core never does.
pub trait MountProvider {
    /// Returns the mount unit whose mount point covers `path`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot be queried.
    fn find_mount(&self, path: &Path) -> Result<Option<String>>;
}

/// Provider for hosts without mount introspection.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMounts;

impl MountProvider for NoMounts {
    fn find_mount(&self, _path: &Path) -> Result<Option<String>> {
        Ok(None)
    }
}

/// A mount after name and path resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedMount {
    /// Bind, named, or anonymous mount.
    Mount(MountSpec),
    /// In-memory filesystem at this target.
    Tmpfs(String),
}

/// Resolves one `volumes:` entry of `service`.
///
/// Relative bind sources are anchored at `root`.
///
/// # Errors
///
/// Returns an error for unknown named volumes, malformed short syntax, or
/// unsupported mount types.
pub fn resolve(
    service: &str,
    entry: &VolumeEntry,
    names: &NameTable,
    root: &Path,
) -> Result<ResolvedMount> {
    match entry {
        VolumeEntry::Short(raw) => {
            let short = syntax::parse_volume(raw)?;
            let options = short
                .mode
                .as_deref()
                .map(split_options)
                .unwrap_or_default();
            let source = match short.source.as_deref() {
                None => MountSource::Anonymous,
                Some(src) => classify(service, src, names, root)?,
            };
            Ok(ResolvedMount::Mount(MountSpec {
                source,
                target: short.target,
                options,
            }))
        }
        VolumeEntry::Long(long) => resolve_long(service, long, names, root),
    }
}

fn resolve_long(
    service: &str,
    long: &VolumeLong,
    names: &NameTable,
    root: &Path,
) -> Result<ResolvedMount> {
    let mut options = Vec::new();
    if long.read_only {
        options.push("ro".to_owned());
    }
    let source = match (long.kind.as_deref(), long.source.as_deref()) {
        (Some("tmpfs"), _) => return Ok(ResolvedMount::Tmpfs(long.target.clone())),
        (Some("bind"), Some(src)) => {
            if let Some(bind) = &long.bind {
                options.extend(bind.selinux.iter().cloned());
                options.extend(bind.propagation.iter().cloned());
            }
            MountSource::Bind(anchor(src, root))
        }
        (Some("bind"), None) => {
            return Err(UnitsmithError::manifest(format!(
                "service \"{service}\": bind mount at \"{}\" has no source",
                long.target
            )));
        }
        (Some("volume"), Some(src)) => {
            if long.volume.as_ref().is_some_and(|v| v.nocopy) {
                options.push("nocopy".to_owned());
            }
            MountSource::Volume(names.volume(service, src)?.to_owned())
        }
        (Some("volume") | None, None) => MountSource::Anonymous,
        (None, Some(src)) => classify(service, src, names, root)?,
        (Some(other), _) => return Err(UnitsmithError::unsupported(service, "volumes.type", other)),
    };
    Ok(ResolvedMount::Mount(MountSpec {
        source,
        target: long.target.clone(),
        options,
    }))
}

fn split_options(mode: &str) -> Vec<String> {
    mode.split(',')
        .filter(|o| !o.is_empty())
        .map(str::to_owned)
        .collect()
}

fn is_path(source: &str) -> bool {
    source.starts_with(['/', '.', '~'])
}

fn classify(service: &str, source: &str, names: &NameTable, root: &Path) -> Result<MountSource> {
    if is_path(source) {
        Ok(MountSource::Bind(anchor(source, root)))
    } else {
        Ok(MountSource::Volume(names.volume(service, source)?.to_owned()))
    }
}

/// Makes a bind source absolute.
fn anchor(source: &str, root: &Path) -> String {
    let path = match source.strip_prefix('~') {
        Some(rest) => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest.trim_start_matches('/')),
            None => PathBuf::from(source),
        },
        None => PathBuf::from(source),
    };
    let absolute = if path.is_absolute() {
        path
    } else {
        root.join(path)
    };
    normalize(&absolute).to_string_lossy().into_owned()
}

/// Removes `.` and resolves `..` lexically.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let _ = out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
