//! # unitsmith-compose
//!
//! Resolves Compose manifests into a systemd unit model.
//!
//! Handles:
//! - **Manifest**: YAML model, loader, and short-syntax parsers.
//! - **Naming**: Project-scoped names for containers, networks, and volumes.
//! - **Attributes**: Mapping service fields onto container records and flags.
//! - **Restart**: Normalizing `restart` and `deploy.restart_policy`.
//! - **Labels**: The `unitsmith.*` override channel.
//! - **Graph / Relations**: Startup order, cycle checks, and unit relationships.
//! - **Prune**: Unused-resource pruning and the Podman device-volume rewrite.
//! - **Generator**: The pipeline that ties the stages together.

pub mod attributes;
pub mod envfile;
pub mod generator;
pub mod graph;
pub mod healthcheck;
pub mod labels;
pub mod manifest;
pub mod model;
pub mod mounts;
pub mod naming;
pub mod prune;
pub mod relations;
pub mod resources;
pub mod restart;

pub use generator::Generator;
pub use model::ComposeModel;
pub use mounts::{MountProvider, NoMounts};
