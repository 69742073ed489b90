//! `deploy.resources` flags.

use unitsmith_common::error::{Result, UnitsmithError};
use unitsmith_common::types::ContainerRuntime;

use crate::manifest::syntax;
use crate::manifest::types::{DeviceRequest, Resources};

/// Maps limits, reservations, and device requests onto runtime flags.
///
/// # Errors
///
/// Returns an error for malformed sizes or CPU counts and for device
/// drivers other than `cdi` and `nvidia`.
pub fn flags(service: &str, runtime: ContainerRuntime, res: &Resources) -> Result<Vec<String>> {
    let mut out = Vec::new();

    if let Some(limits) = &res.limits {
        if let Some(cpus) = &limits.cpus {
            let _ = cpu_count(service, "deploy.resources.limits.cpus", cpus)?;
            out.push(format!("--cpus={cpus}"));
        }
        if let Some(memory) = &limits.memory {
            let bytes = byte_size(service, "deploy.resources.limits.memory", memory)?;
            out.push(format!("--memory={bytes}b"));
        }
        if let Some(pids) = limits.pids {
            out.push(format!("--pids-limit={pids}"));
        }
    }

    if let Some(reservations) = &res.reservations {
        if let Some(memory) = &reservations.memory {
            let bytes = byte_size(service, "deploy.resources.reservations.memory", memory)?;
            out.push(format!("--memory-reservation={bytes}b"));
        }
        if let Some(cpus) = &reservations.cpus {
            let cpus = cpu_count(service, "deploy.resources.reservations.cpus", cpus)?;
            out.push(format!("--cpu-shares={}", cpu_shares(cpus)));
        }
        for device in &reservations.devices {
            out.extend(device_flags(service, runtime, device)?);
        }
    }

    Ok(out)
}

fn cpu_count(service: &str, field: &'static str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|c| c.is_finite() && *c >= 0.0)
        .ok_or_else(|| UnitsmithError::unsupported(service, field, value))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn cpu_shares(cpus: f64) -> u64 {
    (cpus * 1024.0).round() as u64
}

fn byte_size(service: &str, field: &'static str, value: &str) -> Result<u64> {
    syntax::parse_byte_size(value).map_err(|_| UnitsmithError::unsupported(service, field, value))
}

fn device_flags(
    service: &str,
    runtime: ContainerRuntime,
    device: &DeviceRequest,
) -> Result<Vec<String>> {
    let is_gpu = device.capabilities.iter().any(|c| c == "gpu");
    match device.driver.as_deref() {
        Some("cdi") => Ok(device
            .device_ids
            .iter()
            .map(|id| format!("--device={id}"))
            .collect()),
        Some("nvidia") => Ok(nvidia_flags(runtime, device)),
        None if is_gpu => Ok(nvidia_flags(runtime, device)),
        other => Err(UnitsmithError::unsupported(
            service,
            "deploy.resources.reservations.devices.driver",
            other.unwrap_or_default(),
        )),
    }
}

fn nvidia_flags(runtime: ContainerRuntime, device: &DeviceRequest) -> Vec<String> {
    match runtime {
        ContainerRuntime::Docker => {
            let selector = if device.device_ids.is_empty() {
                device.count.clone().unwrap_or_else(|| "all".to_owned())
            } else {
                format!("\"device={}\"", device.device_ids.join(","))
            };
            vec![format!("--gpus={selector}")]
        }
        ContainerRuntime::Podman => {
            if device.device_ids.is_empty() {
                vec!["--device=nvidia.com/gpu=all".to_owned()]
            } else {
                device
                    .device_ids
                    .iter()
                    .map(|id| format!("--device=nvidia.com/gpu={id}"))
                    .collect()
            }
        }
    }
}
