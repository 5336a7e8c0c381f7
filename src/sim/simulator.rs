//! Simulator engine: advances the physical state of every device in a
//! class/tenant roster and forwards telemetry to the sink.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::clients::{SinkEntry, TelemetrySink};
use crate::devices::{self, AdvanceContext, DeviceClass, ModelParams, PhysicalState, TelemetryPoint};
use crate::error::{DeviceFault, StoreError};
use crate::fleet::Fleet;
use crate::store::{DeviceRecord, RecordKey, StateStore, next_token};

use super::budget::RunBudget;
use super::report::SimulationReport;

/// Stable per-device noise seed: FNV-1a over the device id folded with the
/// record's `last_updated` token. A conflict retry re-reads the record, so
/// replaying the same observed token yields the same perturbation.
pub(crate) fn derive_seed(device_id: &str, token: u64) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in device_id.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash ^ token
}

/// Per-class simulation engine.
///
/// One run performs a read-modify-write cycle per device under optimistic
/// concurrency; device failures are isolated and reported, never escalated.
#[derive(Clone)]
pub struct Simulator {
    store: Arc<dyn StateStore>,
    sink: Arc<dyn TelemetrySink>,
    fleet: Arc<dyn Fleet>,
    params: ModelParams,
    /// Seconds of simulated time one trigger firing represents.
    interval_s: f64,
}

impl Simulator {
    /// Creates a simulator engine.
    ///
    /// # Panics
    ///
    /// Panics if `interval_s` is not positive.
    pub fn new(
        store: Arc<dyn StateStore>,
        sink: Arc<dyn TelemetrySink>,
        fleet: Arc<dyn Fleet>,
        params: ModelParams,
        interval_s: f64,
    ) -> Self {
        assert!(interval_s > 0.0, "interval_s must be > 0");
        Self {
            store,
            sink,
            fleet,
            params,
            interval_s,
        }
    }

    /// Advances every device registered for `class`/`tenant`.
    ///
    /// Never fatal: the report carries per-device outcomes, and devices not
    /// reached before the budget expired are listed as not attempted.
    pub async fn run(&self, class: DeviceClass, tenant: &str, budget: &RunBudget) -> SimulationReport {
        let mut report = SimulationReport::new(class, tenant);
        let device_ids = self.fleet.device_ids(class, tenant);

        for (idx, device_id) in device_ids.iter().enumerate() {
            if budget.expired() {
                report
                    .not_attempted
                    .extend(device_ids[idx..].iter().cloned());
                warn!(
                    %class,
                    tenant,
                    skipped = report.not_attempted.len(),
                    "run budget expired, stopping simulation early"
                );
                break;
            }

            match self.simulate_device(class, tenant, device_id).await {
                Ok(()) => report.succeeded.push(device_id.clone()),
                Err(fault) => {
                    warn!(%class, tenant, device_id, %fault, "device simulation failed");
                    report.failed.push((device_id.clone(), fault));
                }
            }
        }

        debug!(%report, "simulation run finished");
        report
    }

    /// One device's read-advance-write cycle, with a single conflict retry.
    async fn simulate_device(
        &self,
        class: DeviceClass,
        tenant: &str,
        device_id: &str,
    ) -> Result<(), DeviceFault> {
        let key = RecordKey::state(class, tenant, device_id);

        let mut attempt = 0;
        loop {
            let now = Utc::now();
            let existing = self
                .store
                .get(&key)
                .await
                .map_err(|e| DeviceFault::Store(e.to_string()))?;

            let (record, expected_token) = match existing {
                Some(record) => {
                    let token = record.last_updated;
                    (record, Some(token))
                }
                None => {
                    debug!(%class, tenant, device_id, "seeding record with class default");
                    let sink_ref = self.fleet.sink_ref(class, device_id);
                    (
                        DeviceRecord::seeded(class, tenant, device_id, sink_ref, now),
                        None,
                    )
                }
            };

            let ctx = AdvanceContext {
                elapsed_s: self.interval_s,
                now,
                seed: derive_seed(device_id, record.last_updated),
            };

            let mut validation = None;
            let (physical_state, telemetry) = match devices::advance(
                &record.physical_state,
                record.participation.as_ref(),
                &self.params,
                &ctx,
            ) {
                Ok(advanced) => advanced,
                Err(e) => {
                    // Discard the corrupted state in favor of a re-seeded
                    // default, but still surface the fault in the report.
                    warn!(%class, tenant, device_id, error = %e, "re-seeding invalid record");
                    validation = Some(e);
                    (PhysicalState::default_for(class), Vec::new())
                }
            };

            let updated = DeviceRecord {
                physical_state,
                last_updated: next_token(expected_token, now),
                sink_ref: self
                    .fleet
                    .sink_ref(class, device_id)
                    .or(record.sink_ref.clone()),
                ..record
            };

            match self.store.put_if_unchanged(updated.clone(), expected_token).await {
                Ok(()) => {
                    if let Some(e) = validation {
                        return Err(e.into());
                    }
                    return self.submit_telemetry(&updated, &telemetry).await;
                }
                Err(StoreError::Conflict) if attempt == 0 => {
                    debug!(%class, tenant, device_id, "conditional write lost race, retrying once");
                    attempt += 1;
                }
                Err(StoreError::Conflict) => return Err(DeviceFault::Conflict),
                Err(StoreError::Backend(e)) => return Err(DeviceFault::Store(e)),
            }
        }
    }

    /// Batches a device's telemetry points into sink entries and submits
    /// them. Partial rejections become a per-device fault; the state commit
    /// above is unaffected either way.
    async fn submit_telemetry(
        &self,
        record: &DeviceRecord,
        points: &[TelemetryPoint],
    ) -> Result<(), DeviceFault> {
        let Some(sink_ref) = &record.sink_ref else {
            debug!(device_id = record.device_id, "no sink reference, skipping telemetry");
            return Ok(());
        };

        let mut entries = Vec::with_capacity(points.len());
        for (idx, point) in points.iter().enumerate() {
            let Some(property_id) = sink_ref.property_ids.get(point.property) else {
                debug!(
                    device_id = record.device_id,
                    property = point.property,
                    "property not mapped in sink reference, skipping"
                );
                continue;
            };
            entries.push(SinkEntry {
                entry_id: format!("{}-{idx}", record.device_id),
                asset_id: sink_ref.asset_id.clone(),
                property_id: property_id.clone(),
                value: point.value,
                time_in_seconds: point.timestamp.timestamp(),
            });
        }

        if entries.is_empty() {
            return Ok(());
        }

        let total = entries.len();
        match self.sink.submit_batch(entries).await {
            Ok(outcomes) => {
                let rejected: Vec<&str> = outcomes
                    .iter()
                    .filter(|o| !o.accepted)
                    .map(|o| o.entry_id.as_str())
                    .collect();
                if rejected.is_empty() {
                    Ok(())
                } else {
                    Err(DeviceFault::Sink(format!(
                        "{} of {total} entries rejected ({})",
                        rejected.len(),
                        rejected.join(", ")
                    )))
                }
            }
            Err(e) => Err(DeviceFault::Sink(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::EntryOutcome;
    use crate::devices::{ChargingStatus, EvState};
    use crate::error::SinkError;
    use crate::fleet::{FleetDevice, FleetEntry, SinkRef, StaticFleet};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Recording sink that rejects entries for configured devices.
    #[derive(Default)]
    struct RecordingSink {
        submitted: Mutex<Vec<SinkEntry>>,
        reject_prefix: Option<String>,
    }

    #[async_trait]
    impl TelemetrySink for RecordingSink {
        async fn submit_batch(
            &self,
            entries: Vec<SinkEntry>,
        ) -> Result<Vec<EntryOutcome>, SinkError> {
            let outcomes = entries
                .iter()
                .map(|e| {
                    let rejected = self
                        .reject_prefix
                        .as_ref()
                        .is_some_and(|p| e.entry_id.starts_with(p.as_str()));
                    EntryOutcome {
                        entry_id: e.entry_id.clone(),
                        accepted: !rejected,
                        message: rejected.then(|| "rejected".to_string()),
                    }
                })
                .collect();
            self.submitted
                .lock()
                .expect("sink mutex should not be poisoned")
                .extend(entries);
            Ok(outcomes)
        }
    }

    fn ev_fleet(device_ids: &[&str]) -> Arc<StaticFleet> {
        let devices = device_ids
            .iter()
            .map(|id| FleetDevice {
                id: id.to_string(),
                sink_ref: Some(SinkRef {
                    asset_id: format!("asset-{id}"),
                    property_ids: HashMap::from([
                        ("StateOfCharge".to_string(), "prop-soc".to_string()),
                        ("ChargingStatus".to_string(), "prop-status".to_string()),
                    ]),
                }),
            })
            .collect();
        Arc::new(StaticFleet::new(vec![FleetEntry {
            class: DeviceClass::Ev,
            tenant: "home-1".to_string(),
            devices,
        }]))
    }

    fn simulator(
        store: Arc<dyn StateStore>,
        sink: Arc<dyn TelemetrySink>,
        fleet: Arc<StaticFleet>,
    ) -> Simulator {
        Simulator::new(store, sink, fleet, ModelParams::default(), 60.0)
    }

    #[tokio::test]
    async fn first_run_seeds_absent_records() {
        let store = Arc::new(MemoryStore::new());
        let sim = simulator(store.clone(), Arc::new(RecordingSink::default()), ev_fleet(&["ev-1"]));

        let report = sim
            .run(DeviceClass::Ev, "home-1", &RunBudget::unlimited())
            .await;
        assert_eq!(report.succeeded, vec!["ev-1"]);
        assert!(report.failed.is_empty());

        let record = store
            .get(&RecordKey::state(DeviceClass::Ev, "home-1", "ev-1"))
            .await
            .expect("get should succeed")
            .expect("record should have been seeded");
        // Default EV state (soc 0) charged for 60 s at 0.5 %/s.
        match record.physical_state {
            PhysicalState::Ev(s) => {
                assert_eq!(s.state_of_charge, 30.0);
                assert_eq!(s.charging_status, ChargingStatus::Charging);
            }
            PhysicalState::Ac(_) => panic!("expected EV state"),
        }
    }

    #[tokio::test]
    async fn telemetry_is_submitted_per_device() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let sim = simulator(store, sink.clone(), ev_fleet(&["ev-1", "ev-2"]));

        sim.run(DeviceClass::Ev, "home-1", &RunBudget::unlimited())
            .await;

        let submitted = sink
            .submitted
            .lock()
            .expect("sink mutex should not be poisoned");
        // Two mapped properties per device.
        assert_eq!(submitted.len(), 4);
        assert!(submitted.iter().any(|e| e.asset_id == "asset-ev-1"));
        assert!(submitted.iter().any(|e| e.asset_id == "asset-ev-2"));
    }

    #[tokio::test]
    async fn sink_rejection_is_a_device_fault_but_state_commits() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink {
            submitted: Mutex::new(Vec::new()),
            reject_prefix: Some("ev-1".to_string()),
        });
        let sim = simulator(store.clone(), sink, ev_fleet(&["ev-1", "ev-2"]));

        let report = sim
            .run(DeviceClass::Ev, "home-1", &RunBudget::unlimited())
            .await;

        assert_eq!(report.succeeded, vec!["ev-2"]);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0].1, DeviceFault::Sink(_)));

        // The failed device's state advance still committed.
        let record = store
            .get(&RecordKey::state(DeviceClass::Ev, "home-1", "ev-1"))
            .await
            .expect("get should succeed")
            .expect("record should exist");
        assert!(matches!(record.physical_state, PhysicalState::Ev(_)));
    }

    #[tokio::test]
    async fn invalid_state_is_reseeded_and_reported() {
        let store = Arc::new(MemoryStore::new());
        let record = DeviceRecord {
            device_id: "ev-1".to_string(),
            class: DeviceClass::Ev,
            tenant: "home-1".to_string(),
            physical_state: PhysicalState::Ev(EvState {
                state_of_charge: 250.0,
                charging_status: ChargingStatus::Idle,
            }),
            participation: None,
            last_updated: 1,
            sink_ref: None,
        };
        store
            .put_if_unchanged(record, None)
            .await
            .expect("insert should succeed");

        let sim = simulator(store.clone(), Arc::new(RecordingSink::default()), ev_fleet(&["ev-1"]));
        let report = sim
            .run(DeviceClass::Ev, "home-1", &RunBudget::unlimited())
            .await;

        assert!(matches!(report.failed[0].1, DeviceFault::Validation(_)));

        let reseeded = store
            .get(&RecordKey::state(DeviceClass::Ev, "home-1", "ev-1"))
            .await
            .expect("get should succeed")
            .expect("record should exist");
        assert_eq!(
            reseeded.physical_state,
            PhysicalState::default_for(DeviceClass::Ev)
        );
    }

    #[tokio::test]
    async fn expired_budget_reports_devices_not_attempted() {
        let store = Arc::new(MemoryStore::new());
        let sim = simulator(
            store,
            Arc::new(RecordingSink::default()),
            ev_fleet(&["ev-1", "ev-2", "ev-3"]),
        );

        let budget = RunBudget::expiring_in(Duration::ZERO);
        let report = sim.run(DeviceClass::Ev, "home-1", &budget).await;

        assert!(report.succeeded.is_empty());
        assert_eq!(report.not_attempted.len(), 3);
    }

    #[test]
    fn seed_is_stable_per_id_and_token() {
        assert_eq!(derive_seed("ev-1", 42), derive_seed("ev-1", 42));
        assert_ne!(derive_seed("ev-1", 42), derive_seed("ev-2", 42));
        assert_ne!(derive_seed("ev-1", 42), derive_seed("ev-1", 43));
    }
}
