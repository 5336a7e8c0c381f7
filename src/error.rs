//! Error taxonomy for the fleet coordinator.
//!
//! Device-level faults are data: they land in run reports and never abort
//! sibling devices or sibling classes. Only [`CoordinatorError::Programming`]
//! propagates out of a trigger firing.

use thiserror::Error;

use crate::devices::DeviceClass;

/// Physical state violated the device class's bounds.
///
/// Should never fire if the store invariants hold. The simulator responds by
/// re-seeding the record with the class default state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("physical state out of bounds: {0}")]
pub struct ValidationError(pub String);

/// Per-device failure recorded in a simulation or scheduling report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceFault {
    /// Physical state bounds violated; record re-seeded with the default.
    #[error("invalid state: {0}")]
    Validation(#[from] ValidationError),

    /// Conditional write lost the race twice (initial attempt plus retry).
    #[error("conditional write lost the race after retry")]
    Conflict,

    /// Telemetry submission failed; state commit is unaffected.
    #[error("telemetry sink: {0}")]
    Sink(String),

    /// State store backend failure outside the conflict path.
    #[error("state store: {0}")]
    Store(String),
}

/// State store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Conditional write rejected: the record's token no longer matches.
    #[error("conditional write rejected: token mismatch")]
    Conflict,

    /// Backend failure (I/O, serialization, remote store).
    #[error("store backend: {0}")]
    Backend(String),
}

/// Telemetry sink failures covering the whole batch.
///
/// Per-entry rejections are not errors; they come back as
/// [`crate::clients::telemetry::EntryOutcome`] values.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("telemetry endpoint: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telemetry endpoint returned status {0}")]
    Status(u16),

    #[error("telemetry response malformed: {0}")]
    InvalidResponse(String),
}

/// Decision API failures. Never retried within a run; the scheduler degrades
/// to a participation no-op instead.
#[derive(Debug, Error)]
pub enum DecisionApiError {
    #[error("decision api: {0}")]
    Http(#[from] reqwest::Error),

    #[error("decision api returned status {0}")]
    Status(u16),

    #[error("decision api response malformed: {0}")]
    InvalidResponse(String),
}

/// Run-level failure raised by the coordinator.
///
/// Reserved for invariant violations (a panic escaping an engine's isolated
/// error boundary). Operational conditions stay inside the report.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("programming error in {class} run for tenant \"{tenant}\": {detail}")]
    Programming {
        class: DeviceClass,
        tenant: String,
        detail: String,
    },
}
