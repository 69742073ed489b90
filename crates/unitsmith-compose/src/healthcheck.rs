//! Health check flags.

use unitsmith_common::error::{Result, UnitsmithError};
use unitsmith_common::types::ContainerRuntime;

use crate::manifest::syntax;
use crate::manifest::types::Healthcheck;

/// Maps a health check onto runtime flags.
///
/// A disabled check (or a test starting with `NONE`) yields only
/// `--no-healthcheck`. An empty test keeps the image's own command while
/// still applying the timing fields.
///
/// # Errors
///
/// Returns an error for an unknown test form or an unparseable duration.
pub fn flags(service: &str, runtime: ContainerRuntime, hc: &Healthcheck) -> Result<Vec<String>> {
    if hc.disable || hc.test.first().is_some_and(|t| t == "NONE") {
        return Ok(vec!["--no-healthcheck".to_owned()]);
    }

    let mut out = Vec::new();
    match hc.test.split_first() {
        None => {}
        Some((kind, args)) if kind == "CMD" => {
            let cmd: Vec<String> = args.iter().map(|a| syntax::shell_quote(a)).collect();
            out.push(format!("--health-cmd={}", cmd.join(" ")));
        }
        Some((kind, args)) if kind == "CMD-SHELL" => {
            out.push(format!("--health-cmd={}", args.join(" ")));
        }
        Some((kind, _)) => {
            return Err(UnitsmithError::unsupported(service, "healthcheck.test", kind.clone()));
        }
    }

    let start_interval_flag = match runtime {
        ContainerRuntime::Docker => "--health-start-interval",
        ContainerRuntime::Podman => "--health-startup-interval",
    };
    let spans = [
        ("--health-interval", "healthcheck.interval", &hc.interval),
        ("--health-timeout", "healthcheck.timeout", &hc.timeout),
        ("--health-start-period", "healthcheck.start_period", &hc.start_period),
        (start_interval_flag, "healthcheck.start_interval", &hc.start_interval),
    ];
    for (flag, field, value) in spans {
        if let Some(value) = value {
            let d = syntax::parse_duration(value)
                .map_err(|_| UnitsmithError::unsupported(service, field, value.clone()))?;
            out.push(format!("{flag}={}", syntax::format_duration(d)));
        }
    }
    if let Some(retries) = hc.retries {
        out.push(format!("--health-retries={retries}"));
    }
    Ok(out)
}
