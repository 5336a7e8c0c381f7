//! Per-run reports, the coordinator's sole user-visible surface.
//!
//! Precise enough to reconstruct, per device, whether simulation and
//! scheduling each succeeded on a given trigger firing.

use std::fmt;

use crate::devices::DeviceClass;
use crate::error::DeviceFault;

/// Outcome of one simulator run over a class/tenant roster.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub class: DeviceClass,
    pub tenant: String,
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, DeviceFault)>,
    /// Devices skipped because the run budget expired before they started.
    pub not_attempted: Vec<String>,
}

impl SimulationReport {
    pub fn new(class: DeviceClass, tenant: &str) -> Self {
        Self {
            class,
            tenant: tenant.to_string(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            not_attempted: Vec::new(),
        }
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sim {}/{}: ok={} failed={} skipped={}",
            self.class,
            self.tenant,
            self.succeeded.len(),
            self.failed.len(),
            self.not_attempted.len(),
        )
    }
}

/// Outcome of one scheduler run over a class/tenant roster.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingReport {
    pub class: DeviceClass,
    pub tenant: String,
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, DeviceFault)>,
    pub not_attempted: Vec<String>,
    /// Set when the decision API was unreachable and the run degraded to a
    /// participation no-op (the fail-safe path).
    pub decision_api_failure: Option<String>,
}

impl SchedulingReport {
    pub fn new(class: DeviceClass, tenant: &str) -> Self {
        Self {
            class,
            tenant: tenant.to_string(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            not_attempted: Vec::new(),
            decision_api_failure: None,
        }
    }

    /// A run that never touched participation because the decision API was
    /// unavailable.
    pub fn degraded(class: DeviceClass, tenant: &str, reason: String, devices: Vec<String>) -> Self {
        Self {
            class,
            tenant: tenant.to_string(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            not_attempted: devices,
            decision_api_failure: Some(reason),
        }
    }
}

impl fmt::Display for SchedulingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sched {}/{}: ok={} failed={} skipped={}",
            self.class,
            self.tenant,
            self.succeeded.len(),
            self.failed.len(),
            self.not_attempted.len(),
        )?;
        if let Some(reason) = &self.decision_api_failure {
            write!(f, " degraded=\"{reason}\"")?;
        }
        Ok(())
    }
}

/// Simulation plus scheduling outcome for one class/tenant pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassReport {
    pub class: DeviceClass,
    pub tenant: String,
    pub simulation: SimulationReport,
    pub scheduling: SchedulingReport,
}

/// Aggregated outcome of one trigger firing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CoordinationReport {
    pub classes: Vec<ClassReport>,
}

impl CoordinationReport {
    /// Total devices whose simulation succeeded.
    pub fn simulated_ok(&self) -> usize {
        self.classes.iter().map(|c| c.simulation.succeeded.len()).sum()
    }

    /// Total per-device failures across both engines.
    pub fn device_failures(&self) -> usize {
        self.classes
            .iter()
            .map(|c| c.simulation.failed.len() + c.scheduling.failed.len())
            .sum()
    }

    /// Returns `true` when any scheduler run degraded on a decision API
    /// failure.
    pub fn any_degraded(&self) -> bool {
        self.classes
            .iter()
            .any(|c| c.scheduling.decision_api_failure.is_some())
    }
}

impl fmt::Display for CoordinationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trigger report: classes={} sim_ok={} failures={}",
            self.classes.len(),
            self.simulated_ok(),
            self.device_failures(),
        )?;
        for class in &self.classes {
            write!(f, " | {} | {}", class.simulation, class.scheduling)?;
        }
        Ok(())
    }
}
