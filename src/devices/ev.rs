//! EV charger physical model.

use rand::{SeedableRng, rngs::StdRng};

use crate::error::ValidationError;

use super::types::{
    AdvanceContext, ChargingStatus, EvState, Participation, PropertyValue, TelemetryPoint,
    bounded_noise,
};

/// EV model parameters.
///
/// The default charge rate of 0.5 %/s matches the reference fleet: a device
/// at 20 % reaches 50 % over one 60-second trigger interval.
#[derive(Debug, Clone, Copy)]
pub struct EvParams {
    /// Charge rate in percent of capacity per second.
    pub charge_rate_pct_per_s: f64,
    /// Discharge rate during an opted-in demand-response window.
    pub discharge_rate_pct_per_s: f64,
    /// State of charge below which a device never discharges.
    pub discharge_floor_pct: f64,
    /// Standard deviation of the per-advance charge perturbation.
    pub noise_std: f64,
}

impl Default for EvParams {
    fn default() -> Self {
        Self {
            charge_rate_pct_per_s: 0.5,
            discharge_rate_pct_per_s: 0.25,
            discharge_floor_pct: 20.0,
            noise_std: 0.0,
        }
    }
}

/// Advances an EV charger by `ctx.elapsed_s` seconds.
///
/// Outside an active opted-in window the device charges at the configured
/// rate until full. During an active window a fixed policy table keyed by
/// the current [`ChargingStatus`] applies:
///
/// | status       | action                                       |
/// |--------------|----------------------------------------------|
/// | `Charging`   | pause (go `Idle`)                            |
/// | `Idle`       | discharge if above the floor, else stay idle |
/// | `Discharging`| keep discharging down to the floor           |
///
/// # Errors
///
/// Returns [`ValidationError`] if `prev.state_of_charge` is outside
/// `[0, 100]` or `ctx.elapsed_s` is negative.
pub fn advance(
    prev: &EvState,
    participation: Option<&Participation>,
    params: &EvParams,
    ctx: &AdvanceContext,
) -> Result<(EvState, Vec<TelemetryPoint>), ValidationError> {
    if !(0.0..=100.0).contains(&prev.state_of_charge) {
        return Err(ValidationError(format!(
            "ev state_of_charge {} outside [0, 100]",
            prev.state_of_charge
        )));
    }
    if ctx.elapsed_s < 0.0 {
        return Err(ValidationError(format!(
            "elapsed {}s is negative",
            ctx.elapsed_s
        )));
    }

    let in_window = participation.is_some_and(|p| p.opted_in && p.covers(ctx.now));
    let mut rng = StdRng::seed_from_u64(ctx.seed);
    let noise = bounded_noise(&mut rng, params.noise_std);

    let next = if in_window {
        match prev.charging_status {
            ChargingStatus::Charging => EvState {
                state_of_charge: prev.state_of_charge,
                charging_status: ChargingStatus::Idle,
            },
            ChargingStatus::Idle | ChargingStatus::Discharging => {
                if prev.state_of_charge > params.discharge_floor_pct {
                    let soc = (prev.state_of_charge
                        - params.discharge_rate_pct_per_s * ctx.elapsed_s)
                        .max(params.discharge_floor_pct);
                    EvState {
                        state_of_charge: soc,
                        charging_status: ChargingStatus::Discharging,
                    }
                } else {
                    EvState {
                        state_of_charge: prev.state_of_charge,
                        charging_status: ChargingStatus::Idle,
                    }
                }
            }
        }
    } else {
        let soc = prev.state_of_charge + params.charge_rate_pct_per_s * ctx.elapsed_s + noise;
        if soc >= 100.0 {
            EvState {
                state_of_charge: 100.0,
                charging_status: ChargingStatus::Idle,
            }
        } else {
            EvState {
                state_of_charge: soc.max(0.0),
                charging_status: ChargingStatus::Charging,
            }
        }
    };

    let telemetry = vec![
        TelemetryPoint {
            property: "StateOfCharge",
            value: PropertyValue::Integer(next.state_of_charge.round() as i64),
            timestamp: ctx.now,
        },
        TelemetryPoint {
            property: "ChargingStatus",
            value: PropertyValue::Boolean(next.charging_status == ChargingStatus::Charging),
            timestamp: ctx.now,
        },
    ];

    Ok((next, telemetry))
}
