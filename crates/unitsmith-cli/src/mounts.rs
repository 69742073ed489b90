//! Host mount introspection through `systemctl`.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use unitsmith_common::error::{Result, UnitsmithError};
use unitsmith_compose::MountProvider;

/// One row of `systemctl list-units --output=json`.
#[derive(Debug, Clone, Deserialize)]
struct MountUnit {
    unit: String,
    active: String,
    #[serde(default)]
    description: String,
}

impl MountUnit {
    /// Mount point of the unit: its description when that is an absolute
    /// path, otherwise the unescaped unit name.
    fn mount_point(&self) -> Option<PathBuf> {
        if self.description.starts_with('/') {
            return Some(PathBuf::from(&self.description));
        }
        unescape_unit(&self.unit)
    }
}

/// Mount units listed by the host's service manager.
#[derive(Debug, Clone)]
pub struct SystemctlMounts {
    units: Vec<MountUnit>,
}

impl SystemctlMounts {
    /// Lists the host's mount units once.
    ///
    /// # Errors
    ///
    /// Returns an error if `systemctl` is not on `PATH`, fails, or prints
    /// output that is not the expected JSON.
    pub fn load() -> Result<Self> {
        let systemctl = which::which("systemctl").map_err(|e| UnitsmithError::Config {
            message: format!("mount checks need systemctl: {e}"),
        })?;
        let output = Command::new(&systemctl)
            .args(["list-units", "--type=mount", "--all", "--output=json"])
            .output()
            .map_err(|e| UnitsmithError::Io {
                path: systemctl.clone(),
                source: e,
            })?;
        if !output.status.success() {
            return Err(UnitsmithError::Io {
                path: systemctl,
                source: std::io::Error::other(format!(
                    "systemctl list-units failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                )),
            });
        }
        let mounts = Self::from_json(&output.stdout)?;
        tracing::debug!(units = mounts.units.len(), "listed host mount units");
        Ok(mounts)
    }

    fn from_json(json: &[u8]) -> Result<Self> {
        Ok(Self {
            units: serde_json::from_slice(json)?,
        })
    }
}

impl MountProvider for SystemctlMounts {
    /// Picks the most specific active mount whose mount point contains
    /// `path`. The root mount is always up, so it never counts.
    fn find_mount(&self, path: &Path) -> Result<Option<String>> {
        let found = self
            .units
            .iter()
            .filter(|u| u.active == "active")
            .filter_map(|u| u.mount_point().map(|point| (point, u)))
            .filter(|(point, _)| point.parent().is_some() && path.starts_with(point))
            .max_by_key(|(point, _)| point.components().count())
            .map(|(_, u)| u.unit.clone());
        Ok(found)
    }
}

/// Reverses systemd path escaping: `mnt-nas\x2dmedia.mount` is
/// `/mnt/nas-media`.
fn unescape_unit(unit: &str) -> Option<PathBuf> {
    let stem = unit.strip_suffix(".mount")?;
    if stem == "-" {
        return Some(PathBuf::from("/"));
    }
    let mut path = String::from("/");
    let mut chars = stem.chars();
    while let Some(c) = chars.next() {
        match c {
            '-' => path.push('/'),
            '\\' => {
                let escape: String = chars.by_ref().take(3).collect();
                let byte = escape
                    .strip_prefix('x')
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())?;
                path.push(char::from(byte));
            }
            c => path.push(c),
        }
    }
    Some(PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"[
        {"unit":"-.mount","load":"loaded","active":"active","sub":"mounted","description":"Root Mount"},
        {"unit":"mnt-nas.mount","load":"loaded","active":"active","sub":"mounted","description":"/mnt/nas"},
        {"unit":"mnt-backup.mount","load":"loaded","active":"inactive","sub":"dead","description":"/mnt/backup"},
        {"unit":"srv-media\\x2dlib.mount","load":"loaded","active":"active","sub":"mounted","description":"Media"}
    ]"#;

    fn mounts() -> SystemctlMounts {
        SystemctlMounts::from_json(LISTING.as_bytes()).expect("json")
    }

    #[test]
    fn most_specific_active_mount_wins() {
        let found = mounts().find_mount(Path::new("/mnt/nas/media")).expect("find");
        assert_eq!(found.as_deref(), Some("mnt-nas.mount"));
    }

    #[test]
    fn inactive_mounts_are_ignored() {
        let found = mounts().find_mount(Path::new("/mnt/backup/x")).expect("find");
        assert_eq!(found, None);
    }

    #[test]
    fn prefix_is_matched_by_component() {
        let found = mounts().find_mount(Path::new("/mnt/nasty")).expect("find");
        assert_eq!(found, None);
    }

    #[test]
    fn root_mount_never_matches() {
        let found = mounts().find_mount(Path::new("/srv/app/config")).expect("find");
        assert_eq!(found, None);
        let only_root = SystemctlMounts::from_json(
            br#"[{"unit":"-.mount","active":"active","description":"/"}]"#,
        )
        .expect("json");
        assert_eq!(only_root.find_mount(Path::new("/data")).expect("find"), None);
    }

    #[test]
    fn escaped_unit_names_resolve_to_paths() {
        assert_eq!(
            unescape_unit("srv-media\\x2dlib.mount"),
            Some(PathBuf::from("/srv/media-lib"))
        );
        let found = mounts().find_mount(Path::new("/srv/media-lib/a")).expect("find");
        assert_eq!(found.as_deref(), Some("srv-media\\x2dlib.mount"));
    }

    #[test]
    fn malformed_listing_is_an_error() {
        assert!(SystemctlMounts::from_json(b"not json").is_err());
    }
}
