//! Coordinator: fans one trigger firing out across every class/tenant pair.
//!
//! Each pair gets its own task running simulate-then-schedule in that fixed
//! order, so the scheduler always sees the state the simulator just
//! committed. Pairs are independent; one failing or panicking never stops
//! the others.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, info_span, Instrument};

use crate::devices::DeviceClass;
use crate::error::CoordinatorError;
use crate::fleet::Fleet;

use super::budget::RunBudget;
use super::report::{ClassReport, CoordinationReport};
use super::scheduler::Scheduler;
use super::simulator::Simulator;

/// Drives one simulate-then-schedule pass per class/tenant on each trigger.
#[derive(Clone)]
pub struct Coordinator {
    simulator: Simulator,
    scheduler: Scheduler,
    fleet: Arc<dyn Fleet>,
    run_budget: Option<Duration>,
}

impl Coordinator {
    pub fn new(
        simulator: Simulator,
        scheduler: Scheduler,
        fleet: Arc<dyn Fleet>,
        run_budget: Option<Duration>,
    ) -> Self {
        Self {
            simulator,
            scheduler,
            fleet,
            run_budget,
        }
    }

    /// Runs one full coordination pass and aggregates the per-pair reports.
    ///
    /// Every spawned pair is awaited before this returns, even when one of
    /// them fails: a trigger firing never leaves work running behind it. A
    /// panic inside a pair task is a bug in this crate and surfaces as
    /// [`CoordinatorError::Programming`] after the siblings finish.
    pub async fn on_trigger(&self) -> Result<CoordinationReport, CoordinatorError> {
        let pairs = self.fleet.class_tenants();
        info!(pairs = pairs.len(), "trigger fired");

        // One deadline for the whole firing, shared by every pair.
        let budget = match self.run_budget {
            Some(limit) => RunBudget::expiring_in(limit),
            None => RunBudget::unlimited(),
        };

        let mut handles: Vec<(DeviceClass, String, JoinHandle<ClassReport>)> =
            Vec::with_capacity(pairs.len());
        for (class, tenant) in pairs {
            let simulator = self.simulator.clone();
            let scheduler = self.scheduler.clone();
            let span = info_span!("pair", %class, tenant);
            let task_tenant = tenant.clone();
            let handle = tokio::spawn(
                async move {
                    run_pair(simulator, scheduler, class, &task_tenant, budget).await
                }
                .instrument(span),
            );
            handles.push((class, tenant, handle));
        }

        let mut report = CoordinationReport::default();
        let mut first_panic: Option<CoordinatorError> = None;
        for (class, tenant, handle) in handles {
            match handle.await {
                Ok(class_report) => report.classes.push(class_report),
                Err(e) => {
                    let error = CoordinatorError::Programming {
                        class,
                        tenant,
                        detail: e.to_string(),
                    };
                    if first_panic.is_none() {
                        first_panic = Some(error);
                    }
                }
            }
        }

        match first_panic {
            Some(error) => Err(error),
            None => {
                info!(%report, "trigger pass finished");
                Ok(report)
            }
        }
    }
}

async fn run_pair(
    simulator: Simulator,
    scheduler: Scheduler,
    class: DeviceClass,
    tenant: &str,
    budget: RunBudget,
) -> ClassReport {
    let simulation = simulator.run(class, tenant, &budget).await;
    let scheduling = scheduler.run(class, tenant, &budget).await;
    ClassReport {
        class,
        tenant: tenant.to_string(),
        simulation,
        scheduling,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{
        DecisionApi, EntryOutcome, ParticipationOutcome, SinkEntry, TelemetrySink, Window,
    };
    use crate::error::{DecisionApiError, SinkError};
    use crate::fleet::{FleetDevice, FleetEntry, StaticFleet};
    use crate::devices::ModelParams;
    use crate::sim::scheduler::SchedulerPolicy;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct NullSink;

    #[async_trait]
    impl TelemetrySink for NullSink {
        async fn submit_batch(
            &self,
            entries: Vec<SinkEntry>,
        ) -> Result<Vec<EntryOutcome>, SinkError> {
            Ok(entries
                .into_iter()
                .map(|e| EntryOutcome {
                    entry_id: e.entry_id,
                    accepted: true,
                    message: None,
                })
                .collect())
        }
    }

    struct NoWindowApi;

    #[async_trait]
    impl DecisionApi for NoWindowApi {
        async fn get_active_window(
            &self,
            _class: DeviceClass,
            _tenant: &str,
        ) -> Result<Option<Window>, DecisionApiError> {
            Ok(None)
        }

        async fn report_outcomes(
            &self,
            _class: DeviceClass,
            _tenant: &str,
            _outcomes: &[ParticipationOutcome],
        ) -> Result<(), DecisionApiError> {
            Ok(())
        }
    }

    fn two_pair_fleet() -> Arc<StaticFleet> {
        let device = |id: &str| FleetDevice {
            id: id.to_string(),
            sink_ref: None,
        };
        Arc::new(StaticFleet::new(vec![
            FleetEntry {
                class: DeviceClass::Ev,
                tenant: "home-1".to_string(),
                devices: vec![device("ev-1"), device("ev-2")],
            },
            FleetEntry {
                class: DeviceClass::Ac,
                tenant: "home-2".to_string(),
                devices: vec![device("ac-1")],
            },
        ]))
    }

    fn coordinator(fleet: Arc<StaticFleet>, budget: Option<Duration>) -> Coordinator {
        let store = Arc::new(MemoryStore::new());
        let simulator = Simulator::new(
            store.clone(),
            Arc::new(NullSink),
            fleet.clone(),
            ModelParams::default(),
            60.0,
        );
        let scheduler = Scheduler::new(
            store,
            Arc::new(NoWindowApi),
            fleet.clone(),
            SchedulerPolicy::default(),
        );
        Coordinator::new(simulator, scheduler, fleet, budget)
    }

    #[tokio::test]
    async fn trigger_covers_every_class_tenant_pair() {
        let coordinator = coordinator(two_pair_fleet(), None);
        let report = coordinator
            .on_trigger()
            .await
            .expect("trigger should succeed");

        assert_eq!(report.classes.len(), 2);
        assert_eq!(report.simulated_ok(), 3);
        assert_eq!(report.device_failures(), 0);
        assert!(!report.any_degraded());
    }

    #[tokio::test]
    async fn exhausted_budget_reports_unattempted_devices() {
        let coordinator = coordinator(two_pair_fleet(), Some(Duration::ZERO));
        let report = coordinator
            .on_trigger()
            .await
            .expect("trigger should succeed");

        assert_eq!(report.simulated_ok(), 0);
        let skipped: usize = report
            .classes
            .iter()
            .map(|c| c.simulation.not_attempted.len())
            .sum();
        assert_eq!(skipped, 3);
    }

    #[tokio::test]
    async fn concurrent_triggers_do_not_interfere() {
        let coordinator = coordinator(two_pair_fleet(), None);
        let (a, b) = tokio::join!(coordinator.on_trigger(), coordinator.on_trigger());
        let a = a.expect("first trigger should succeed");
        let b = b.expect("second trigger should succeed");

        // Overlapping passes may lose individual conditional writes, but the
        // single retry keeps each device's run converging.
        assert_eq!(a.classes.len(), 2);
        assert_eq!(b.classes.len(), 2);
        assert_eq!(a.simulated_ok() + a.device_failures(), 3);
        assert_eq!(b.simulated_ok() + b.device_failures(), 3);
    }
}
