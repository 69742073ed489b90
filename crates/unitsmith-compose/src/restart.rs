//! Restart policy translation.
//!
//! Compose spells restart behaviour two ways: the legacy `restart:` string
//! and the richer `deploy.restart_policy` block. Both normalize into one
//! [`RestartPolicy`] variant; the block always wins when present.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use unitsmith_common::constants::{
    DEFAULT_START_LIMIT_INTERVAL_SECS, DOCKER_BACKOFF_INITIAL_MS, DOCKER_BACKOFF_MAX_SECS,
    DOCKER_BACKOFF_STEPS,
};
use unitsmith_common::error::{Result, UnitsmithError};

use crate::manifest::syntax;
use crate::manifest::types::RestartPolicyDef;
use crate::model::SystemdValue;

/// Window over which start attempts are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitWindow {
    /// Attempts reset after this long.
    Bounded(Duration),
    /// Attempts never reset.
    Unbounded,
}

impl LimitWindow {
    fn to_value(self) -> SystemdValue {
        match self {
            Self::Bounded(d) => span_value(d),
            Self::Unbounded => SystemdValue::Str("infinity".to_owned()),
        }
    }
}

impl fmt::Display for LimitWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_value(), f)
    }
}

/// Start-rate limiting applied to a restarting unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartLimit {
    /// Attempts allowed inside the window.
    pub burst: Option<u32>,
    /// Counting window.
    pub interval: Option<LimitWindow>,
}

/// Normalized restart behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Never restart.
    #[default]
    No,
    /// Restart whenever the process exits.
    Always(StartLimit),
    /// Restart only on a non-zero exit.
    OnFailure(StartLimit),
}

impl RestartPolicy {
    /// The systemd `Restart=` value, or `None` for no restart.
    #[must_use]
    pub const fn directive(&self) -> Option<&'static str> {
        match self {
            Self::No => None,
            Self::Always(_) => Some("always"),
            Self::OnFailure(_) => Some("on-failure"),
        }
    }

    /// Rate limiting, when the policy restarts at all.
    #[must_use]
    pub const fn limit(&self) -> Option<&StartLimit> {
        match self {
            Self::No => None,
            Self::Always(limit) | Self::OnFailure(limit) => Some(limit),
        }
    }

    /// Restarts without an attempt cap.
    #[must_use]
    pub const fn is_indefinite(&self) -> bool {
        matches!(self.limit(), Some(StartLimit { burst: None, .. }))
    }
}

/// Exponential restart backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// First delay.
    pub initial: Duration,
    /// Doublings until `max_delay` is reached.
    pub steps: u32,
    /// Ceiling.
    pub max_delay: Duration,
}

impl Backoff {
    /// Approximation of Docker's built-in restart backoff.
    #[must_use]
    pub const fn docker() -> Self {
        Self {
            initial: Duration::from_millis(DOCKER_BACKOFF_INITIAL_MS),
            steps: DOCKER_BACKOFF_STEPS,
            max_delay: Duration::from_secs(DOCKER_BACKOFF_MAX_SECS),
        }
    }
}

/// Restart policy plus timing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestartConfig {
    /// Restart mode and rate limit.
    pub policy: RestartPolicy,
    /// Fixed delay between restarts.
    pub delay: Option<Duration>,
    /// Growing delay between restarts.
    pub backoff: Option<Backoff>,
}

impl RestartConfig {
    /// Adds Docker's backoff curve to policies that restart forever.
    ///
    /// A no-op when the policy has an attempt cap or an explicit delay.
    #[must_use]
    pub const fn with_docker_backoff(mut self) -> Self {
        if self.policy.is_indefinite() && self.delay.is_none() {
            self.backoff = Some(Backoff::docker());
        }
        self
    }

    /// Base `[Service]` settings before label overrides.
    #[must_use]
    pub fn service_settings(&self) -> BTreeMap<String, SystemdValue> {
        let mut out = BTreeMap::new();
        let Some(directive) = self.policy.directive() else {
            return out;
        };
        let _ = out.insert("Restart".to_owned(), SystemdValue::Str(directive.to_owned()));
        if let Some(delay) = self.delay {
            let _ = out.insert("RestartSec".to_owned(), span_value(delay));
        }
        if let Some(backoff) = self.backoff {
            let _ = out
                .entry("RestartSec".to_owned())
                .or_insert_with(|| span_value(backoff.initial));
            let _ = out.insert(
                "RestartSteps".to_owned(),
                SystemdValue::Int(i64::from(backoff.steps)),
            );
            let _ = out.insert("RestartMaxDelaySec".to_owned(), span_value(backoff.max_delay));
        }
        out
    }

    /// Base `[Unit]` settings before label overrides.
    #[must_use]
    pub fn unit_settings(&self) -> BTreeMap<String, SystemdValue> {
        let mut out = BTreeMap::new();
        let Some(limit) = self.policy.limit() else {
            return out;
        };
        if let Some(burst) = limit.burst {
            let _ = out.insert("StartLimitBurst".to_owned(), SystemdValue::Int(i64::from(burst)));
        }
        if let Some(window) = limit.interval {
            let _ = out.insert("StartLimitIntervalSec".to_owned(), window.to_value());
        }
        out
    }
}

/// Normalizes a service's restart settings.
///
/// `deploy`, when present, replaces `restart` entirely.
///
/// # Errors
///
/// Returns [`UnitsmithError::UnsupportedValue`] for values outside the
/// Compose restart grammar.
pub fn translate(
    service: &str,
    restart: Option<&str>,
    deploy: Option<&RestartPolicyDef>,
) -> Result<RestartConfig> {
    let config = match deploy {
        Some(def) => from_deploy(service, def)?,
        None => RestartConfig {
            policy: from_legacy(service, restart.unwrap_or_default())?,
            ..RestartConfig::default()
        },
    };
    tracing::debug!(service, policy = ?config.policy, "translated restart policy");
    Ok(config)
}

fn from_legacy(service: &str, value: &str) -> Result<RestartPolicy> {
    match value.trim() {
        "" | "no" => Ok(RestartPolicy::No),
        // systemd has no notion of a manual stop surviving a reboot.
        "always" | "unless-stopped" => Ok(RestartPolicy::Always(StartLimit::default())),
        "on-failure" => Ok(RestartPolicy::OnFailure(StartLimit::default())),
        other => {
            let burst = other
                .strip_prefix("on-failure:")
                .and_then(|n| n.trim().parse::<u32>().ok())
                .ok_or_else(|| UnitsmithError::unsupported(service, "restart", other))?;
            Ok(RestartPolicy::OnFailure(StartLimit {
                burst: Some(burst),
                interval: Some(LimitWindow::Bounded(Duration::from_secs(
                    DEFAULT_START_LIMIT_INTERVAL_SECS,
                ))),
            }))
        }
    }
}

fn from_deploy(service: &str, def: &RestartPolicyDef) -> Result<RestartConfig> {
    let condition = def.condition.as_deref().unwrap_or("any");
    let restarts_always = match condition {
        "" | "any" => true,
        "on-failure" => false,
        "none" => return Ok(RestartConfig::default()),
        other => {
            return Err(UnitsmithError::unsupported(
                service,
                "deploy.restart_policy.condition",
                other,
            ));
        }
    };

    let burst = def
        .max_attempts
        .map(|n| {
            u32::try_from(n).map_err(|_| {
                UnitsmithError::unsupported(
                    service,
                    "deploy.restart_policy.max_attempts",
                    n.to_string(),
                )
            })
        })
        .transpose()?;
    let window = def
        .window
        .as_deref()
        .map(|w| duration(service, "deploy.restart_policy.window", w))
        .transpose()?;
    let interval = match (window, burst) {
        (Some(w), _) => Some(LimitWindow::Bounded(w)),
        (None, Some(_)) => Some(LimitWindow::Unbounded),
        (None, None) => None,
    };
    let limit = StartLimit { burst, interval };

    Ok(RestartConfig {
        policy: if restarts_always {
            RestartPolicy::Always(limit)
        } else {
            RestartPolicy::OnFailure(limit)
        },
        delay: def
            .delay
            .as_deref()
            .map(|d| duration(service, "deploy.restart_policy.delay", d))
            .transpose()?,
        backoff: None,
    })
}

fn duration(service: &str, field: &'static str, value: &str) -> Result<Duration> {
    syntax::parse_duration(value).map_err(|_| UnitsmithError::unsupported(service, field, value))
}

/// Renders a time span as whole seconds when possible.
pub(crate) fn span_value(d: Duration) -> SystemdValue {
    if d.subsec_nanos() == 0 {
        if let Ok(secs) = i64::try_from(d.as_secs()) {
            return SystemdValue::Int(secs);
        }
    }
    SystemdValue::Str(syntax::format_duration(d))
}
