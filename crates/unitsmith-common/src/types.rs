//! Domain primitive types used across the unitsmith workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_PROJECT_SEPARATOR;
use crate::error::UnitsmithError;

/// Container runtime the generated units drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    /// Podman (daemonless).
    #[default]
    Podman,
    /// Docker engine.
    Docker,
}

impl ContainerRuntime {
    /// Returns the runtime's command name, also used as the unit name prefix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Podman => "podman",
            Self::Docker => "docker",
        }
    }
}

impl fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerRuntime {
    type Err = UnitsmithError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "podman" => Ok(Self::Podman),
            "docker" => Ok(Self::Docker),
            other => Err(UnitsmithError::Config {
                message: format!("invalid runtime \"{other}\": must be \"podman\" or \"docker\""),
            }),
        }
    }
}

/// Project identity used to scope generated resource names.
///
/// An empty project name leaves every resource unprefixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project name; empty when resources are not scoped.
    pub name: String,
    /// String placed between the project name and the resource name.
    pub separator: String,
}

impl Project {
    /// Creates a project with the default separator.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_separator(name, DEFAULT_PROJECT_SEPARATOR)
    }

    /// Creates a project with an explicit separator.
    #[must_use]
    pub fn with_separator(name: impl Into<String>, separator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            separator: separator.into(),
        }
    }

    /// Whether resource names are left unprefixed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Scopes `name` to this project.
    #[must_use]
    pub fn with(&self, name: &str) -> String {
        if self.is_empty() {
            name.to_owned()
        } else {
            format!("{}{}{name}", self.name, self.separator)
        }
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new("")
    }
}
