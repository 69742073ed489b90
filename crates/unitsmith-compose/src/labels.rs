//! Label-driven systemd overrides.
//!
//! Labels under `unitsmith.systemd.service.<Key>` and
//! `unitsmith.systemd.unit.<Key>` inject settings into the generated unit;
//! `unitsmith.settings.autoStart` toggles auto-start. Consumed labels are
//! removed from the container's label set.

use std::collections::BTreeMap;

use unitsmith_common::constants::LABEL_PREFIX;
use unitsmith_common::error::{Result, UnitsmithError};

use crate::model::{SystemdConfig, SystemdValue};

/// Settings collected from a service's override labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelOverrides {
    /// `[Service]` pairs, sorted by key.
    pub service: Vec<(String, SystemdValue)>,
    /// `[Unit]` pairs, sorted by key.
    pub unit: Vec<(String, SystemdValue)>,
    /// Per-container auto-start.
    pub auto_start: Option<bool>,
}

impl LabelOverrides {
    /// Splits `labels` into overrides and the labels left for the container.
    ///
    /// # Errors
    ///
    /// Returns [`UnitsmithError::UnsupportedValue`] for a systemd namespace
    /// other than `service` or `unit`, and [`UnitsmithError::MalformedLabel`]
    /// for any other label under the reserved prefix that does not fit.
    pub fn extract(
        service: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<(Self, BTreeMap<String, String>)> {
        let mut overrides = Self::default();
        let mut remaining = BTreeMap::new();

        for (key, value) in labels {
            let Some(rest) = key
                .strip_prefix(LABEL_PREFIX)
                .and_then(|r| r.strip_prefix('.'))
            else {
                let _ = remaining.insert(key.clone(), value.clone());
                continue;
            };
            let malformed = |reason: &str| UnitsmithError::MalformedLabel {
                service: service.to_owned(),
                label: key.clone(),
                reason: reason.to_owned(),
            };

            match rest.split('.').collect::<Vec<_>>().as_slice() {
                ["systemd", namespace, setting] => {
                    if setting.is_empty() {
                        return Err(malformed("empty setting name"));
                    }
                    let entry = ((*setting).to_owned(), SystemdValue::parse(value));
                    match *namespace {
                        "service" => overrides.service.push(entry),
                        "unit" => overrides.unit.push(entry),
                        other => {
                            return Err(UnitsmithError::unsupported(
                                service,
                                "systemd label namespace",
                                other,
                            ));
                        }
                    }
                }
                ["settings", "autoStart"] => {
                    overrides.auto_start = Some(match value.as_str() {
                        "true" => true,
                        "false" => false,
                        _ => return Err(malformed("autoStart must be \"true\" or \"false\"")),
                    });
                }
                ["settings", _] => return Err(malformed("unknown setting")),
                _ => {
                    return Err(malformed(
                        "expected systemd.(service|unit).<Key> or settings.<Name>",
                    ));
                }
            }
            tracing::debug!(service, label = %key, "consumed override label");
        }

        Ok((overrides, remaining))
    }

    /// Layers the overrides onto `systemd`.
    ///
    /// Relationship keys in the unit section (`After`, `Requires`, ...)
    /// extend the relationship sets instead of replacing them.
    pub fn apply(&self, systemd: &mut SystemdConfig) {
        for (key, value) in &self.service {
            let _ = systemd.service.insert(key.clone(), value.clone());
        }
        for (key, value) in &self.unit {
            if !systemd.relations.extend_by_key(key, value) {
                let _ = systemd.unit.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn extract_consumes_override_labels() {
        let input = labels(&[
            ("traefik.enable", "true"),
            ("unitsmith.systemd.service.RuntimeMaxSec", "360"),
            ("unitsmith.systemd.unit.After", "foo.service"),
            ("unitsmith.settings.autoStart", "false"),
        ]);
        let (overrides, remaining) = LabelOverrides::extract("web", &input).expect("extract");
        assert_eq!(remaining, labels(&[("traefik.enable", "true")]));
        assert_eq!(
            overrides.service,
            vec![("RuntimeMaxSec".to_owned(), SystemdValue::Int(360))]
        );
        assert_eq!(overrides.unit.len(), 1);
        assert_eq!(overrides.auto_start, Some(false));
    }

    #[test]
    fn unknown_namespace_is_unsupported() {
        let input = labels(&[("unitsmith.systemd.install.WantedBy", "x.target")]);
        let err = LabelOverrides::extract("web", &input).unwrap_err();
        assert!(matches!(err, UnitsmithError::UnsupportedValue { .. }), "{err}");
    }

    #[test]
    fn malformed_labels_are_rejected() {
        for key in [
            "unitsmith.systemd.service",
            "unitsmith.systemd.service.",
            "unitsmith.settings.colour",
            "unitsmith.other",
        ] {
            let err = LabelOverrides::extract("web", &labels(&[(key, "1")])).unwrap_err();
            assert!(matches!(err, UnitsmithError::MalformedLabel { .. }), "{key}: {err}");
        }
    }

    #[test]
    fn auto_start_must_be_exact_boolean() {
        let err = LabelOverrides::extract("web", &labels(&[("unitsmith.settings.autoStart", "yes")]))
            .unwrap_err();
        assert!(err.to_string().contains("autoStart"), "{err}");
    }

    #[test]
    fn apply_merges_relations_and_overrides_settings() {
        let input = labels(&[
            ("unitsmith.systemd.service.Restart", "on-abnormal"),
            ("unitsmith.systemd.unit.After", "foo.service,bar.service"),
            ("unitsmith.systemd.unit.StartLimitBurst", "9"),
        ]);
        let (overrides, _) = LabelOverrides::extract("web", &input).expect("extract");
        let mut systemd = SystemdConfig::default();
        let _ = systemd
            .service
            .insert("Restart".into(), SystemdValue::Str("always".into()));
        let _ = systemd.relations.after.insert("podman-db.service".into());

        overrides.apply(&mut systemd);

        assert_eq!(systemd.service["Restart"], SystemdValue::Str("on-abnormal".into()));
        assert_eq!(systemd.unit["StartLimitBurst"], SystemdValue::Int(9));
        let after: Vec<_> = systemd.relations.after.iter().map(String::as_str).collect();
        assert_eq!(after, vec!["bar.service", "foo.service", "podman-db.service"]);
    }
}
