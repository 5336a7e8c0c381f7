//! Periodic simulation and scheduling coordinator for grid-flexible devices.

pub mod clients;
pub mod config;
pub mod devices;
pub mod error;
pub mod fleet;
/// Run budgets, the simulator and scheduler engines, and the coordinator.
pub mod sim;
pub mod store;
