//! The coordination layer: run budgets, the two per-class engines, and the
//! coordinator that fans a trigger firing out across the fleet.

pub mod budget;
pub mod coordinator;
pub mod report;
pub mod scheduler;
pub mod simulator;

pub use budget::RunBudget;
pub use coordinator::Coordinator;
pub use report::{ClassReport, CoordinationReport, SchedulingReport, SimulationReport};
pub use scheduler::{Scheduler, SchedulerPolicy};
pub use simulator::Simulator;
