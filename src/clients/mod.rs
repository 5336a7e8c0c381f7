//! Clients for the two external collaborators: the demand-response decision
//! API and the telemetry ingestion sink.

pub mod decision;
pub mod telemetry;

pub use decision::DecisionApi;
pub use decision::HttpDecisionApi;
pub use decision::ParticipationOutcome;
pub use decision::Window;
pub use telemetry::EntryOutcome;
pub use telemetry::HttpTelemetrySink;
pub use telemetry::SinkEntry;
pub use telemetry::TelemetrySink;
