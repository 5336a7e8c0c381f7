//! AC unit physical model.

use rand::{SeedableRng, rngs::StdRng};

use crate::error::ValidationError;

use super::types::{
    AcState, AcStatus, AdvanceContext, Participation, PropertyValue, TelemetryPoint, bounded_noise,
    toward,
};

/// Temperatures outside this range indicate a corrupted record, not weather.
const TEMP_MIN_C: f64 = -40.0;
const TEMP_MAX_C: f64 = 60.0;

/// AC model parameters.
#[derive(Debug, Clone, Copy)]
pub struct AcParams {
    /// Outdoor temperature the house drifts toward when the unit is off.
    pub ambient_c: f64,
    /// Target indoor temperature while cooling.
    pub setpoint_c: f64,
    /// Passive drift rate toward ambient, degrees per second.
    pub drift_c_per_s: f64,
    /// Active cooling rate toward the setpoint, degrees per second.
    pub cooling_rate_c_per_s: f64,
    /// Temperature rise above the setpoint before the compressor re-engages.
    pub deadband_c: f64,
    /// Standard deviation of the per-advance temperature perturbation.
    pub noise_std: f64,
}

impl Default for AcParams {
    fn default() -> Self {
        Self {
            ambient_c: 32.0,
            setpoint_c: 22.0,
            drift_c_per_s: 0.01,
            cooling_rate_c_per_s: 0.05,
            deadband_c: 0.5,
            noise_std: 0.0,
        }
    }
}

/// Advances an AC unit by `ctx.elapsed_s` seconds.
///
/// `Off` drifts toward ambient, `Cooling` approaches the setpoint and hands
/// over to `On` when it gets there, `On` holds the setpoint and re-enters
/// `Cooling` once the temperature rises past the deadband. An active
/// opted-in demand-response window forces the unit `Off` for its duration.
///
/// # Errors
///
/// Returns [`ValidationError`] if `prev.temperature_c` is outside the
/// plausible range or `ctx.elapsed_s` is negative.
pub fn advance(
    prev: &AcState,
    participation: Option<&Participation>,
    params: &AcParams,
    ctx: &AdvanceContext,
) -> Result<(AcState, Vec<TelemetryPoint>), ValidationError> {
    if !(TEMP_MIN_C..=TEMP_MAX_C).contains(&prev.temperature_c) {
        return Err(ValidationError(format!(
            "ac temperature {} outside [{TEMP_MIN_C}, {TEMP_MAX_C}]",
            prev.temperature_c
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

    let drift = params.drift_c_per_s * ctx.elapsed_s;
    let cooling = params.cooling_rate_c_per_s * ctx.elapsed_s;

    let next = if in_window {
        AcState {
            temperature_c: toward(prev.temperature_c, params.ambient_c, drift) + noise,
            status: AcStatus::Off,
        }
    } else {
        match prev.status {
            AcStatus::Off => AcState {
                temperature_c: toward(prev.temperature_c, params.ambient_c, drift) + noise,
                status: AcStatus::Off,
            },
            AcStatus::Cooling => {
                let temperature_c = toward(prev.temperature_c, params.setpoint_c, cooling) + noise;
                let status = if temperature_c <= params.setpoint_c {
                    AcStatus::On
                } else {
                    AcStatus::Cooling
                };
                AcState {
                    temperature_c,
                    status,
                }
            }
            AcStatus::On => {
                let temperature_c = toward(prev.temperature_c, params.ambient_c, drift) + noise;
                let status = if temperature_c > params.setpoint_c + params.deadband_c {
                    AcStatus::Cooling
                } else {
                    AcStatus::On
                };
                AcState {
                    temperature_c,
                    status,
                }
            }
        }
    };

    let next = AcState {
        temperature_c: next.temperature_c.clamp(TEMP_MIN_C, TEMP_MAX_C),
        status: next.status,
    };

    let telemetry = vec![
        TelemetryPoint {
            property: "CurrentTemperature",
            value: PropertyValue::Double(next.temperature_c),
            timestamp: ctx.now,
        },
        TelemetryPoint {
            property: "Status",
            value: PropertyValue::Boolean(next.status != AcStatus::Off),
            timestamp: ctx.now,
        },
    ];

    Ok((next, telemetry))
}
