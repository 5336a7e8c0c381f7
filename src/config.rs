//! TOML-based fleet configuration and preset definitions.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::devices::{AcParams, DeviceClass, EvParams, ModelParams};
use crate::fleet::{FleetDevice, FleetEntry, SinkRef, StaticFleet};
use crate::sim::SchedulerPolicy;

/// Top-level fleet configuration parsed from TOML.
///
/// All fields have defaults matching the demo fleet. Load from TOML with
/// [`FleetConfig::from_toml_file`] or use [`FleetConfig::demo`] for the
/// built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetConfig {
    /// Trigger cadence and per-run budget.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// Demand-response decision API endpoint.
    #[serde(default)]
    pub decision_api: EndpointConfig,
    /// Telemetry sink endpoint.
    #[serde(default)]
    pub telemetry: EndpointConfig,
    /// EV charger model parameters.
    #[serde(default)]
    pub ev: EvModelConfig,
    /// AC unit model parameters.
    #[serde(default)]
    pub ac: AcModelConfig,
    /// Scheduling eligibility thresholds.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Device roster, one entry per class/tenant pair.
    #[serde(default)]
    pub fleet: Vec<FleetEntryConfig>,
}

/// Trigger cadence and per-run budget.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// Seconds between trigger firings (must be > 0).
    pub interval_s: f64,
    /// Wall-clock budget for one firing, in seconds. `0` disables the
    /// budget entirely.
    pub run_budget_s: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            interval_s: 60.0,
            run_budget_s: 0.0,
        }
    }
}

/// An HTTP endpoint with a request timeout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointConfig {
    /// Base URL, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout in seconds (must be > 0).
    pub timeout_s: f64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_s: 10.0,
        }
    }
}

/// EV charger model parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvModelConfig {
    /// Charging rate (percent state of charge per second).
    pub charge_rate_pct_per_s: f64,
    /// Discharge rate during a demand-response window (percent per second).
    pub discharge_rate_pct_per_s: f64,
    /// State of charge below which in-window discharge stops (percent).
    pub discharge_floor_pct: f64,
    /// Gaussian noise standard deviation (percent).
    pub noise_std: f64,
}

impl Default for EvModelConfig {
    fn default() -> Self {
        let p = EvParams::default();
        Self {
            charge_rate_pct_per_s: p.charge_rate_pct_per_s,
            discharge_rate_pct_per_s: p.discharge_rate_pct_per_s,
            discharge_floor_pct: p.discharge_floor_pct,
            noise_std: p.noise_std,
        }
    }
}

/// AC unit model parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AcModelConfig {
    /// Ambient temperature the room drifts toward when not cooling (°C).
    pub ambient_c: f64,
    /// Cooling setpoint (°C).
    pub setpoint_c: f64,
    /// Passive drift rate toward ambient (°C per second).
    pub drift_c_per_s: f64,
    /// Active cooling rate toward the setpoint (°C per second).
    pub cooling_rate_c_per_s: f64,
    /// Degrees above setpoint before cooling re-engages (°C).
    pub deadband_c: f64,
    /// Gaussian noise standard deviation (°C).
    pub noise_std: f64,
}

impl Default for AcModelConfig {
    fn default() -> Self {
        let p = AcParams::default();
        Self {
            ambient_c: p.ambient_c,
            setpoint_c: p.setpoint_c,
            drift_c_per_s: p.drift_c_per_s,
            cooling_rate_c_per_s: p.cooling_rate_c_per_s,
            deadband_c: p.deadband_c,
            noise_std: p.noise_std,
        }
    }
}

/// Scheduling eligibility thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Minimum EV state of charge (percent) required to opt in.
    pub ev_soc_floor_pct: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let p = SchedulerPolicy::default();
        Self {
            ev_soc_floor_pct: p.ev_soc_floor_pct,
        }
    }
}

/// One class/tenant roster entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetEntryConfig {
    /// Device class: `"ev"` or `"ac"`.
    pub class: DeviceClass,
    /// Tenant (site) identifier.
    pub tenant: String,
    /// Devices registered under this class/tenant pair.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// One device registration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Device identifier, unique within its class/tenant pair.
    pub id: String,
    /// Telemetry sink asset id. Devices without one skip telemetry.
    pub asset_id: Option<String>,
    /// Property name to sink property id mapping.
    #[serde(default)]
    pub property_ids: HashMap<String, String>,
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"coordinator.interval_s"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {} — {}", self.field, self.message)
    }
}

impl FleetConfig {
    /// Returns the demo fleet: one EV and one AC tenant, no sink wiring.
    pub fn demo() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            decision_api: EndpointConfig::default(),
            telemetry: EndpointConfig::default(),
            ev: EvModelConfig::default(),
            ac: AcModelConfig::default(),
            scheduler: SchedulerConfig::default(),
            fleet: vec![
                FleetEntryConfig {
                    class: DeviceClass::Ev,
                    tenant: "home-1".to_string(),
                    devices: vec![
                        DeviceConfig {
                            id: "ev-1".to_string(),
                            asset_id: None,
                            property_ids: HashMap::new(),
                        },
                        DeviceConfig {
                            id: "ev-2".to_string(),
                            asset_id: None,
                            property_ids: HashMap::new(),
                        },
                    ],
                },
                FleetEntryConfig {
                    class: DeviceClass::Ac,
                    tenant: "home-1".to_string(),
                    devices: vec![DeviceConfig {
                        id: "ac-1".to_string(),
                        asset_id: None,
                        property_ids: HashMap::new(),
                    }],
                },
            ],
        }
    }

    /// Returns the single-EV preset: one device, fast trigger cadence.
    pub fn single_ev() -> Self {
        Self {
            coordinator: CoordinatorConfig {
                interval_s: 10.0,
                ..CoordinatorConfig::default()
            },
            fleet: vec![FleetEntryConfig {
                class: DeviceClass::Ev,
                tenant: "home-1".to_string(),
                devices: vec![DeviceConfig {
                    id: "ev-1".to_string(),
                    asset_id: None,
                    property_ids: HashMap::new(),
                }],
            }],
            ..Self::demo()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["demo", "single_ev"];

    /// Loads a fleet configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "demo" => Ok(Self::demo()),
            "single_ev" => Ok(Self::single_ev()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a fleet configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a fleet configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let c = &self.coordinator;
        if c.interval_s <= 0.0 {
            errors.push(ConfigError {
                field: "coordinator.interval_s".into(),
                message: "must be > 0".into(),
            });
        }
        if c.run_budget_s < 0.0 {
            errors.push(ConfigError {
                field: "coordinator.run_budget_s".into(),
                message: "must be >= 0 (0 disables the budget)".into(),
            });
        }

        for (section, endpoint) in [
            ("decision_api", &self.decision_api),
            ("telemetry", &self.telemetry),
        ] {
            if endpoint.base_url.is_empty() {
                errors.push(ConfigError {
                    field: format!("{section}.base_url"),
                    message: "must not be empty".into(),
                });
            }
            if endpoint.timeout_s <= 0.0 {
                errors.push(ConfigError {
                    field: format!("{section}.timeout_s"),
                    message: "must be > 0".into(),
                });
            }
        }

        let ev = &self.ev;
        if ev.charge_rate_pct_per_s < 0.0 {
            errors.push(ConfigError {
                field: "ev.charge_rate_pct_per_s".into(),
                message: "must be >= 0".into(),
            });
        }
        if ev.discharge_rate_pct_per_s < 0.0 {
            errors.push(ConfigError {
                field: "ev.discharge_rate_pct_per_s".into(),
                message: "must be >= 0".into(),
            });
        }
        if !(0.0..=100.0).contains(&ev.discharge_floor_pct) {
            errors.push(ConfigError {
                field: "ev.discharge_floor_pct".into(),
                message: "must be in [0, 100]".into(),
            });
        }
        if ev.noise_std < 0.0 {
            errors.push(ConfigError {
                field: "ev.noise_std".into(),
                message: "must be >= 0".into(),
            });
        }

        let ac = &self.ac;
        if ac.cooling_rate_c_per_s <= 0.0 {
            errors.push(ConfigError {
                field: "ac.cooling_rate_c_per_s".into(),
                message: "must be > 0".into(),
            });
        }
        if ac.drift_c_per_s < 0.0 {
            errors.push(ConfigError {
                field: "ac.drift_c_per_s".into(),
                message: "must be >= 0".into(),
            });
        }
        if ac.deadband_c < 0.0 {
            errors.push(ConfigError {
                field: "ac.deadband_c".into(),
                message: "must be >= 0".into(),
            });
        }
        if ac.setpoint_c >= ac.ambient_c {
            errors.push(ConfigError {
                field: "ac.setpoint_c".into(),
                message: "must be < ac.ambient_c".into(),
            });
        }
        if ac.noise_std < 0.0 {
            errors.push(ConfigError {
                field: "ac.noise_std".into(),
                message: "must be >= 0".into(),
            });
        }

        if !(0.0..=100.0).contains(&self.scheduler.ev_soc_floor_pct) {
            errors.push(ConfigError {
                field: "scheduler.ev_soc_floor_pct".into(),
                message: "must be in [0, 100]".into(),
            });
        }

        let mut seen_pairs = Vec::new();
        for (i, entry) in self.fleet.iter().enumerate() {
            if entry.tenant.is_empty() {
                errors.push(ConfigError {
                    field: format!("fleet[{i}].tenant"),
                    message: "must not be empty".into(),
                });
            }
            let pair = (entry.class, entry.tenant.clone());
            if seen_pairs.contains(&pair) {
                errors.push(ConfigError {
                    field: format!("fleet[{i}]"),
                    message: format!(
                        "duplicate entry for class \"{}\" tenant \"{}\"",
                        entry.class, entry.tenant
                    ),
                });
            }
            seen_pairs.push(pair);

            let mut seen_ids = Vec::new();
            for (j, device) in entry.devices.iter().enumerate() {
                if device.id.is_empty() {
                    errors.push(ConfigError {
                        field: format!("fleet[{i}].devices[{j}].id"),
                        message: "must not be empty".into(),
                    });
                }
                if seen_ids.contains(&&device.id) {
                    errors.push(ConfigError {
                        field: format!("fleet[{i}].devices[{j}].id"),
                        message: format!("duplicate device id \"{}\"", device.id),
                    });
                }
                seen_ids.push(&device.id);

                if device.asset_id.is_none() && !device.property_ids.is_empty() {
                    errors.push(ConfigError {
                        field: format!("fleet[{i}].devices[{j}].property_ids"),
                        message: "requires asset_id to be set".into(),
                    });
                }
            }
        }

        errors
    }

    /// Device model parameters derived from the `[ev]` and `[ac]` sections.
    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            ev: EvParams {
                charge_rate_pct_per_s: self.ev.charge_rate_pct_per_s,
                discharge_rate_pct_per_s: self.ev.discharge_rate_pct_per_s,
                discharge_floor_pct: self.ev.discharge_floor_pct,
                noise_std: self.ev.noise_std,
            },
            ac: AcParams {
                ambient_c: self.ac.ambient_c,
                setpoint_c: self.ac.setpoint_c,
                drift_c_per_s: self.ac.drift_c_per_s,
                cooling_rate_c_per_s: self.ac.cooling_rate_c_per_s,
                deadband_c: self.ac.deadband_c,
                noise_std: self.ac.noise_std,
            },
        }
    }

    /// Scheduling policy derived from the `[scheduler]` section.
    pub fn scheduler_policy(&self) -> SchedulerPolicy {
        SchedulerPolicy {
            ev_soc_floor_pct: self.scheduler.ev_soc_floor_pct,
        }
    }

    /// Run budget derived from `coordinator.run_budget_s` (`None` when
    /// disabled).
    pub fn run_budget(&self) -> Option<Duration> {
        if self.coordinator.run_budget_s > 0.0 {
            Some(Duration::from_secs_f64(self.coordinator.run_budget_s))
        } else {
            None
        }
    }

    /// Builds the static device roster from the `[[fleet]]` entries.
    pub fn static_fleet(&self) -> StaticFleet {
        let entries = self
            .fleet
            .iter()
            .map(|entry| FleetEntry {
                class: entry.class,
                tenant: entry.tenant.clone(),
                devices: entry
                    .devices
                    .iter()
                    .map(|device| FleetDevice {
                        id: device.id.clone(),
                        sink_ref: device.asset_id.as_ref().map(|asset_id| SinkRef {
                            asset_id: asset_id.clone(),
                            property_ids: device.property_ids.clone(),
                        }),
                    })
                    .collect(),
            })
            .collect();
        StaticFleet::new(entries)
    }
}
