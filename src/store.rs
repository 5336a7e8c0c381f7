//! Durable keyed store for device records with optimistic concurrency.
//!
//! Records are addressed by a composite key: partition `{class}#{tenant}`,
//! sort `{device_id}#{record_type}`. The conditional put on the
//! `last_updated` token is the sole serialization point; no lock spans a
//! read-modify-write cycle.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::devices::{DeviceClass, Participation, PhysicalState};
use crate::error::StoreError;
use crate::fleet::SinkRef;

/// Kind of row stored for a device. Only physical/participation state today;
/// the enum keeps the sort-key namespace explicit so future record types
/// cannot collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    State,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::State => "state",
        }
    }
}

/// Composite record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub partition_key: String,
    pub sort_key: String,
}

impl RecordKey {
    /// Key of a device's state record.
    pub fn state(class: DeviceClass, tenant: &str, device_id: &str) -> Self {
        Self {
            partition_key: format!("{}#{tenant}", class.as_str()),
            sort_key: format!("{device_id}#{}", RecordType::State.as_str()),
        }
    }
}

/// One device's durable row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub class: DeviceClass,
    pub tenant: String,
    pub physical_state: PhysicalState,
    pub participation: Option<Participation>,
    /// Optimistic-concurrency token, strictly monotonic per record.
    pub last_updated: u64,
    pub sink_ref: Option<SinkRef>,
}

impl DeviceRecord {
    /// Fresh record with the class default state, created lazily on a
    /// device's first simulation.
    pub fn seeded(
        class: DeviceClass,
        tenant: &str,
        device_id: &str,
        sink_ref: Option<SinkRef>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id: device_id.to_string(),
            class,
            tenant: tenant.to_string(),
            physical_state: PhysicalState::default_for(class),
            participation: None,
            last_updated: next_token(None, now),
            sink_ref,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::state(self.class, &self.tenant, &self.device_id)
    }
}

/// Next value of a record's `last_updated` token: wall-clock milliseconds,
/// bumped past the previous token so the sequence stays strictly monotonic
/// even under clock skew or sub-millisecond retries.
pub fn next_token(prev: Option<u64>, now: DateTime<Utc>) -> u64 {
    let now_ms = now.timestamp_millis().max(0) as u64;
    match prev {
        Some(t) => now_ms.max(t + 1),
        None => now_ms,
    }
}

/// Keyed store interface. Backends must reject any write whose expectation
/// about the current token is stale.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetches a record, or `None` when absent.
    async fn get(&self, key: &RecordKey) -> Result<Option<DeviceRecord>, StoreError>;

    /// Writes `record` only if the stored token still matches
    /// `expected_token` (`None` means "insert, fail if present").
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the precondition fails.
    async fn put_if_unchanged(
        &self,
        record: DeviceRecord,
        expected_token: Option<u64>,
    ) -> Result<(), StoreError>;

    /// Sort keys currently stored under a partition.
    async fn list_by_partition(&self, partition_key: &str) -> Result<Vec<String>, StoreError>;
}

/// In-memory [`StateStore`] backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<(String, String), DeviceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), DeviceRecord>> {
        // A poisoned map is still structurally valid; conditional writes
        // protect the data, not the mutex.
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<DeviceRecord>, StoreError> {
        let records = self.lock();
        Ok(records
            .get(&(key.partition_key.clone(), key.sort_key.clone()))
            .cloned())
    }

    async fn put_if_unchanged(
        &self,
        record: DeviceRecord,
        expected_token: Option<u64>,
    ) -> Result<(), StoreError> {
        let key = record.key();
        let map_key = (key.partition_key, key.sort_key);
        let mut records = self.lock();

        match (records.get(&map_key), expected_token) {
            (None, None) => {
                records.insert(map_key, record);
                Ok(())
            }
            (Some(existing), Some(token)) if existing.last_updated == token => {
                records.insert(map_key, record);
                Ok(())
            }
            _ => Err(StoreError::Conflict),
        }
    }

    async fn list_by_partition(&self, partition_key: &str) -> Result<Vec<String>, StoreError> {
        let records = self.lock();
        let mut sort_keys: Vec<String> = records
            .keys()
            .filter(|(pk, _)| pk == partition_key)
            .map(|(_, sk)| sk.clone())
            .collect();
        sort_keys.sort();
        Ok(sort_keys)
    }
}
