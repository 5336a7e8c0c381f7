//! Pure per-class device models.

/// Air-conditioning unit model.
pub mod ac;
/// Electric vehicle charger model.
pub mod ev;
pub mod types;

pub use ac::AcParams;
pub use ev::EvParams;
pub use types::AcState;
pub use types::AcStatus;
pub use types::AdvanceContext;
pub use types::ChargingStatus;
pub use types::DeviceClass;
pub use types::EvState;
pub use types::Participation;
pub use types::PhysicalState;
pub use types::PropertyValue;
pub use types::TelemetryPoint;

use crate::error::ValidationError;

/// Model parameters for every device class.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelParams {
    pub ev: EvParams,
    pub ac: AcParams,
}

/// Advances a physical state by one trigger interval.
///
/// Pure dispatch over the class tag; all side effects live in the engines.
/// The returned telemetry points describe the *next* state.
///
/// # Errors
///
/// Returns [`ValidationError`] when `prev` violates its class's physical
/// bounds or `ctx.elapsed_s` is negative.
pub fn advance(
    prev: &PhysicalState,
    participation: Option<&Participation>,
    params: &ModelParams,
    ctx: &AdvanceContext,
) -> Result<(PhysicalState, Vec<TelemetryPoint>), ValidationError> {
    match prev {
        PhysicalState::Ev(state) => ev::advance(state, participation, &params.ev, ctx)
            .map(|(next, telemetry)| (PhysicalState::Ev(next), telemetry)),
        PhysicalState::Ac(state) => ac::advance(state, participation, &params.ac, ctx)
            .map(|(next, telemetry)| (PhysicalState::Ac(next), telemetry)),
    }
}
