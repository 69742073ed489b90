//! `unitsmith plan`: Display the startup order and unit relationships.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use unitsmith_common::constants::DEFAULT_MANIFEST;
use unitsmith_compose::ComposeModel;

use super::GeneratorArgs;
use crate::output;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Compose manifest; repeat to overlay later files on earlier ones.
    #[arg(short, long = "input", default_value = DEFAULT_MANIFEST)]
    pub inputs: Vec<PathBuf>,

    /// Generator switches.
    #[command(flatten)]
    pub generator: GeneratorArgs,
}

/// Executes the `plan` command.
///
/// Resolves the manifests and prints containers in startup order, each
/// with its image and unit relationships, followed by the managed
/// networks and volumes.
///
/// # Errors
///
/// Returns an error if resolution fails or stdout cannot be written.
pub fn execute(args: PlanArgs) -> anyhow::Result<()> {
    let model = super::resolve(&args.inputs, &args.generator)?;
    let mut out = std::io::stdout().lock();
    render(&model, &mut out)?;
    Ok(())
}

fn render(model: &ComposeModel, out: &mut impl Write) -> std::io::Result<()> {
    let title = if model.project.is_empty() {
        "Startup plan".to_owned()
    } else {
        format!("Startup plan for: {}", model.project.name)
    };
    writeln!(out, "{title}")?;
    writeln!(out, "{}", output::rule(title.chars().count()))?;
    writeln!(out)?;

    for name in &model.startup_order {
        let Some(c) = model.container(name) else {
            continue;
        };
        writeln!(out, "  + {}  ({})", c.unit(), c.image)?;
        let rel = &c.systemd.relations;
        for (key, units) in [
            ("after", &rel.after),
            ("requires", &rel.requires),
            ("upheld by", &rel.upheld_by),
            ("mounts", &rel.requires_mounts_for),
        ] {
            if !units.is_empty() {
                writeln!(out, "      {key}: {}", output::join(units))?;
            }
        }
    }

    writeln!(out)?;
    writeln!(
        out,
        "  {} container(s), {} network(s), {} volume(s).",
        model.containers.len(),
        model.networks.len(),
        model.volumes.len()
    )?;
    for network in &model.networks {
        writeln!(out, "    network {}", network.unit())?;
    }
    for volume in &model.volumes {
        writeln!(out, "    volume  {}", volume.unit())?;
    }
    if let Some(target) = &model.root_target {
        writeln!(out, "  root target: {target}")?;
    }
    Ok(())
}
