//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use flexfleet::clients::{
    DecisionApi, EntryOutcome, ParticipationOutcome, SinkEntry, TelemetrySink, Window,
};
use flexfleet::devices::DeviceClass;
use flexfleet::error::{DecisionApiError, SinkError, StoreError};
use flexfleet::fleet::{FleetDevice, FleetEntry, SinkRef, StaticFleet};
use flexfleet::store::{DeviceRecord, MemoryStore, RecordKey, StateStore};

/// Decision API double: a per-class window map, an optional hard failure,
/// and a log of reported outcomes.
pub struct FakeDecisionApi {
    windows: Mutex<HashMap<DeviceClass, Window>>,
    fail: AtomicBool,
    pub reported: Mutex<Vec<(DeviceClass, ParticipationOutcome)>>,
}

impl FakeDecisionApi {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
            reported: Mutex::new(Vec::new()),
        }
    }

    pub fn set_window(&self, class: DeviceClass, window: Window) {
        self.windows
            .lock()
            .expect("window mutex should not be poisoned")
            .insert(class, window);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.fail.store(unreachable, Ordering::SeqCst);
    }
}

impl Default for FakeDecisionApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DecisionApi for FakeDecisionApi {
    async fn get_active_window(
        &self,
        class: DeviceClass,
        _tenant: &str,
    ) -> Result<Option<Window>, DecisionApiError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DecisionApiError::Status(503));
        }
        Ok(self
            .windows
            .lock()
            .expect("window mutex should not be poisoned")
            .get(&class)
            .copied())
    }

    async fn report_outcomes(
        &self,
        class: DeviceClass,
        _tenant: &str,
        outcomes: &[ParticipationOutcome],
    ) -> Result<(), DecisionApiError> {
        self.reported
            .lock()
            .expect("report mutex should not be poisoned")
            .extend(outcomes.iter().cloned().map(|o| (class, o)));
        Ok(())
    }
}

/// Telemetry sink double that accepts everything and keeps what it saw.
#[derive(Default)]
pub struct RecordingSink {
    pub submitted: Mutex<Vec<SinkEntry>>,
}

impl RecordingSink {
    pub fn entries(&self) -> Vec<SinkEntry> {
        self.submitted
            .lock()
            .expect("sink mutex should not be poisoned")
            .clone()
    }
}

#[async_trait]
impl TelemetrySink for RecordingSink {
    async fn submit_batch(&self, entries: Vec<SinkEntry>) -> Result<Vec<EntryOutcome>, SinkError> {
        let outcomes = entries
            .iter()
            .map(|e| EntryOutcome {
                entry_id: e.entry_id.clone(),
                accepted: true,
                message: None,
            })
            .collect();
        self.submitted
            .lock()
            .expect("sink mutex should not be poisoned")
            .extend(entries);
        Ok(outcomes)
    }
}

/// Store decorator that loses exactly one conditional write to a simulated
/// interleaved writer, forcing the caller down its retry path.
pub struct ConflictOnceStore {
    inner: Arc<MemoryStore>,
    tripped: AtomicBool,
}

impl ConflictOnceStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            tripped: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl StateStore for ConflictOnceStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<DeviceRecord>, StoreError> {
        self.inner.get(key).await
    }

    async fn put_if_unchanged(
        &self,
        record: DeviceRecord,
        expected_token: Option<u64>,
    ) -> Result<(), StoreError> {
        if !self.tripped.swap(true, Ordering::SeqCst)
            && let Some(current) = self.inner.get(&record.key()).await?
        {
            // An interleaved writer commits first; the caller's write below
            // then fails its token precondition.
            let stolen = DeviceRecord {
                last_updated: current.last_updated + 1,
                ..current.clone()
            };
            self.inner
                .put_if_unchanged(stolen, Some(current.last_updated))
                .await?;
        }
        self.inner.put_if_unchanged(record, expected_token).await
    }

    async fn list_by_partition(&self, partition_key: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list_by_partition(partition_key).await
    }
}

/// A roster entry whose devices all map the given telemetry properties.
pub fn entry_with_sink(
    class: DeviceClass,
    tenant: &str,
    device_ids: &[&str],
    properties: &[&str],
) -> FleetEntry {
    FleetEntry {
        class,
        tenant: tenant.to_string(),
        devices: device_ids
            .iter()
            .map(|id| FleetDevice {
                id: id.to_string(),
                sink_ref: Some(SinkRef {
                    asset_id: format!("asset-{id}"),
                    property_ids: properties
                        .iter()
                        .map(|p| (p.to_string(), format!("prop-{p}")))
                        .collect(),
                }),
            })
            .collect(),
    }
}

pub fn fleet_of(entries: Vec<FleetEntry>) -> Arc<StaticFleet> {
    Arc::new(StaticFleet::new(entries))
}
