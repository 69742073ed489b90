//! `unitsmith convert`: Resolve Compose manifests into a unit model.

use std::path::PathBuf;

use clap::Args;
use unitsmith_common::constants::DEFAULT_MANIFEST;

use super::GeneratorArgs;
use crate::output;

/// Arguments for the `convert` subcommand.
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Compose manifest; repeat to overlay later files on earlier ones.
    #[arg(short, long = "input", default_value = DEFAULT_MANIFEST)]
    pub inputs: Vec<PathBuf>,

    /// Write output to a file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Generator switches.
    #[command(flatten)]
    pub generator: GeneratorArgs,
}

/// Executes the `convert` command.
///
/// # Errors
///
/// Returns an error if a manifest cannot be read or resolved, or the
/// output cannot be written.
pub fn execute(args: ConvertArgs) -> anyhow::Result<()> {
    tracing::info!(inputs = args.inputs.len(), "converting compose manifests");

    let model = super::resolve(&args.inputs, &args.generator)?;
    let json = serde_json::to_string_pretty(&model)?;
    output::emit(&json, args.output.as_deref())?;

    if let Some(ref out_path) = args.output {
        tracing::info!(
            path = %out_path.display(),
            containers = model.containers.len(),
            networks = model.networks.len(),
            volumes = model.volumes.len(),
            "wrote unit model"
        );
    }
    Ok(())
}
