//! Common types for the per-class device models.

use chrono::{DateTime, Utc};
use rand::{Rng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of simulated device, each with its own physical model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Electric vehicle charger.
    Ev,
    /// Air-conditioning unit.
    Ac,
}

impl DeviceClass {
    /// Stable lowercase tag used in store keys and API paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Ev => "ev",
            DeviceClass::Ac => "ac",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// EV charging activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargingStatus {
    Idle,
    Charging,
    Discharging,
}

/// AC unit operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcStatus {
    On,
    Off,
    Cooling,
}

/// Physical state of an EV charger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvState {
    /// State of charge in percent, always within `[0, 100]`.
    pub state_of_charge: f64,
    pub charging_status: ChargingStatus,
}

/// Physical state of an AC unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcState {
    /// Indoor temperature in degrees Celsius.
    pub temperature_c: f64,
    pub status: AcStatus,
}

/// Class-specific physical state payload of a device record.
///
/// Tagged-variant dispatch: [`advance`](crate::devices::advance) routes on
/// the variant rather than on trait objects, since the class set is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "lowercase")]
pub enum PhysicalState {
    Ev(EvState),
    Ac(AcState),
}

impl PhysicalState {
    /// The device class this state belongs to.
    pub fn class(&self) -> DeviceClass {
        match self {
            PhysicalState::Ev(_) => DeviceClass::Ev,
            PhysicalState::Ac(_) => DeviceClass::Ac,
        }
    }

    /// Default state a record is seeded with on first simulation.
    ///
    /// EV starts empty and idle; AC starts at 24 °C with the unit off
    /// (the original simulation reset the house to 24 °C).
    pub fn default_for(class: DeviceClass) -> Self {
        match class {
            DeviceClass::Ev => PhysicalState::Ev(EvState {
                state_of_charge: 0.0,
                charging_status: ChargingStatus::Idle,
            }),
            DeviceClass::Ac => PhysicalState::Ac(AcState {
                temperature_c: 24.0,
                status: AcStatus::Off,
            }),
        }
    }
}

/// A device's recorded opt-in decision for a demand-response window.
///
/// Written by the scheduler, read by the simulator to bias physical-state
/// evolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Participation {
    pub opted_in: bool,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl Participation {
    /// Creates a participation entry.
    ///
    /// # Panics
    ///
    /// Panics if `window_end < window_start`.
    pub fn new(opted_in: bool, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        assert!(window_end >= window_start);
        Self {
            opted_in,
            window_start,
            window_end,
        }
    }

    /// Returns `true` when `now` falls within `[window_start, window_end)`.
    pub fn covers(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_start && now < self.window_end
    }

    /// Returns `true` once the window has fully elapsed.
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_end
    }
}

/// Inputs shared by every `advance` call.
#[derive(Debug, Clone, Copy)]
pub struct AdvanceContext {
    /// Wall-clock seconds since the previous advance.
    pub elapsed_s: f64,
    /// Current time, used to test window membership.
    pub now: DateTime<Utc>,
    /// Noise seed. Derived from the record's `last_updated` token so a
    /// conflict retry replays the identical perturbation.
    pub seed: u64,
}

/// Typed value of one telemetry property.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyValue {
    Integer(i64),
    Double(f64),
    Boolean(bool),
}

/// One property update emitted by an `advance` call.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryPoint {
    /// Property name in the external asset model (e.g. `"StateOfCharge"`).
    pub property: &'static str,
    pub value: PropertyValue,
    pub timestamp: DateTime<Utc>,
}

/// Gaussian noise via the Box-Muller transform, clamped to three standard
/// deviations so a single sample cannot jump a device across its bounds.
pub fn bounded_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-9, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    (z0 * std_dev).clamp(-3.0 * std_dev, 3.0 * std_dev)
}

/// Moves `current` toward `target` by at most `max_delta`.
pub(crate) fn toward(current: f64, target: f64, max_delta: f64) -> f64 {
    let step = max_delta.max(0.0);
    let delta = (target - current).clamp(-step, step);
    current + delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use rand::SeedableRng;

    #[test]
    fn class_tags_are_lowercase() {
        assert_eq!(DeviceClass::Ev.as_str(), "ev");
        assert_eq!(DeviceClass::Ac.to_string(), "ac");
    }

    #[test]
    fn default_states_are_in_bounds() {
        match PhysicalState::default_for(DeviceClass::Ev) {
            PhysicalState::Ev(s) => {
                assert_eq!(s.state_of_charge, 0.0);
                assert_eq!(s.charging_status, ChargingStatus::Idle);
            }
            PhysicalState::Ac(_) => panic!("expected EV default"),
        }
        match PhysicalState::default_for(DeviceClass::Ac) {
            PhysicalState::Ac(s) => {
                assert_eq!(s.temperature_c, 24.0);
                assert_eq!(s.status, AcStatus::Off);
            }
            PhysicalState::Ev(_) => panic!("expected AC default"),
        }
    }

    #[test]
    fn participation_covers_half_open_window() {
        let start = Utc::now();
        let end = start + TimeDelta::minutes(30);
        let p = Participation::new(true, start, end);

        assert!(p.covers(start));
        assert!(p.covers(end - TimeDelta::seconds(1)));
        assert!(!p.covers(end));
        assert!(!p.covers(start - TimeDelta::seconds(1)));
        assert!(!p.expired(start));
        assert!(p.expired(end));
    }

    #[test]
    #[should_panic]
    fn participation_rejects_inverted_window() {
        let start = Utc::now();
        Participation::new(true, start, start - TimeDelta::seconds(1));
    }

    #[test]
    fn noise_is_bounded_and_seedable() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let x = bounded_noise(&mut a, 0.5);
            assert!(x.abs() <= 1.5);
            assert_eq!(x, bounded_noise(&mut b, 0.5));
        }
        assert_eq!(bounded_noise(&mut a, 0.0), 0.0);
    }

    #[test]
    fn toward_never_overshoots() {
        assert_eq!(toward(20.0, 24.0, 1.0), 21.0);
        assert_eq!(toward(23.9, 24.0, 1.0), 24.0);
        assert_eq!(toward(28.0, 24.0, 1.0), 27.0);
        assert_eq!(toward(24.0, 24.0, 1.0), 24.0);
    }
}
