//! Scheduler engine: decides demand-response participation per device.
//!
//! When the decision API is unreachable the run leaves every `participation`
//! field untouched. A device is never enrolled without a confirmed decision
//! signal.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::clients::{DecisionApi, ParticipationOutcome, Window};
use crate::devices::{DeviceClass, Participation, PhysicalState};
use crate::error::{DeviceFault, StoreError};
use crate::fleet::Fleet;
use crate::store::{DeviceRecord, RecordKey, StateStore, next_token};

use super::budget::RunBudget;
use super::report::SchedulingReport;

/// Eligibility thresholds.
///
/// Placeholder policy pending real requirements: an EV needs charge headroom
/// above a floor before it may shift or discharge; an AC unit is always
/// eligible. Both classes refuse re-enrollment mid-window.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerPolicy {
    /// Minimum EV state of charge (percent) required to opt in.
    pub ev_soc_floor_pct: f64,
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        Self {
            ev_soc_floor_pct: 30.0,
        }
    }
}

/// What the scheduler wants a device's participation to become.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Decision {
    /// No write needed.
    Unchanged,
    /// Write the given participation (opt in or a recorded opt-out).
    Set(Participation),
    /// Clear an expired participation.
    Clear,
}

/// Per-class scheduling engine.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn StateStore>,
    decision_api: Arc<dyn DecisionApi>,
    fleet: Arc<dyn Fleet>,
    policy: SchedulerPolicy,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn StateStore>,
        decision_api: Arc<dyn DecisionApi>,
        fleet: Arc<dyn Fleet>,
        policy: SchedulerPolicy,
    ) -> Self {
        Self {
            store,
            decision_api,
            fleet,
            policy,
        }
    }

    /// Applies the current decision signal to every device registered for
    /// `class`/`tenant`.
    pub async fn run(&self, class: DeviceClass, tenant: &str, budget: &RunBudget) -> SchedulingReport {
        let device_ids = self.fleet.device_ids(class, tenant);

        let window = match self.decision_api.get_active_window(class, tenant).await {
            Ok(window) => window,
            Err(e) => {
                warn!(%class, tenant, error = %e, "decision api unavailable, degrading to no-op");
                return SchedulingReport::degraded(class, tenant, e.to_string(), device_ids);
            }
        };

        let mut report = SchedulingReport::new(class, tenant);
        let mut outcomes = Vec::new();

        for (idx, device_id) in device_ids.iter().enumerate() {
            if budget.expired() {
                report
                    .not_attempted
                    .extend(device_ids[idx..].iter().cloned());
                warn!(
                    %class,
                    tenant,
                    skipped = report.not_attempted.len(),
                    "run budget expired, stopping scheduling early"
                );
                break;
            }

            match self.schedule_device(class, tenant, device_id, window).await {
                Ok(decision) => {
                    report.succeeded.push(device_id.clone());
                    if let Some(Decision::Set(p)) = decision {
                        outcomes.push(ParticipationOutcome {
                            device_id: device_id.clone(),
                            opted_in: p.opted_in,
                        });
                    }
                }
                Err(fault) => {
                    warn!(%class, tenant, device_id, %fault, "device scheduling failed");
                    report.failed.push((device_id.clone(), fault));
                }
            }
        }

        if !outcomes.is_empty()
            && let Err(e) = self
                .decision_api
                .report_outcomes(class, tenant, &outcomes)
                .await
        {
            // Best effort: the decisions are already durable in the store.
            warn!(%class, tenant, error = %e, "failed to post participation outcomes");
        }

        debug!(%report, "scheduling run finished");
        report
    }

    /// One device's decide-and-write cycle, with a single conflict retry.
    /// Returns the applied decision so the run can report outcomes.
    async fn schedule_device(
        &self,
        class: DeviceClass,
        tenant: &str,
        device_id: &str,
        window: Option<Window>,
    ) -> Result<Option<Decision>, DeviceFault> {
        let key = RecordKey::state(class, tenant, device_id);

        let mut attempt = 0;
        loop {
            let now = Utc::now();
            let Some(record) = self
                .store
                .get(&key)
                .await
                .map_err(|e| DeviceFault::Store(e.to_string()))?
            else {
                // The simulator creates records lazily; nothing to decide yet.
                debug!(%class, tenant, device_id, "no record yet, skipping scheduling");
                return Ok(None);
            };

            let decision = self.decide(&record, window, now);
            let participation = match decision {
                Decision::Unchanged => return Ok(Some(decision)),
                Decision::Set(p) => Some(p),
                Decision::Clear => None,
            };

            let expected_token = Some(record.last_updated);
            let updated = DeviceRecord {
                participation,
                last_updated: next_token(expected_token, now),
                ..record
            };

            match self.store.put_if_unchanged(updated, expected_token).await {
                Ok(()) => return Ok(Some(decision)),
                Err(StoreError::Conflict) if attempt == 0 => {
                    debug!(%class, tenant, device_id, "conditional write lost race, retrying once");
                    attempt += 1;
                }
                Err(StoreError::Conflict) => return Err(DeviceFault::Conflict),
                Err(StoreError::Backend(e)) => return Err(DeviceFault::Store(e)),
            }
        }
    }

    fn decide(
        &self,
        record: &DeviceRecord,
        window: Option<Window>,
        now: chrono::DateTime<Utc>,
    ) -> Decision {
        match window {
            Some(w) => {
                if let Some(p) = record.participation {
                    // Already decided for this exact window.
                    if p.window_start == w.start && p.window_end == w.end {
                        return Decision::Unchanged;
                    }
                    // Never disturb a device mid-window.
                    if p.opted_in && p.covers(now) {
                        return Decision::Unchanged;
                    }
                }
                let opted_in = self.eligible(record);
                Decision::Set(Participation::new(opted_in, w.start, w.end))
            }
            None => match record.participation {
                Some(p) if p.expired(now) => Decision::Clear,
                _ => Decision::Unchanged,
            },
        }
    }

    /// Eligibility policy: sufficient headroom to participate.
    fn eligible(&self, record: &DeviceRecord) -> bool {
        match record.physical_state {
            PhysicalState::Ev(s) => s.state_of_charge >= self.policy.ev_soc_floor_pct,
            PhysicalState::Ac(_) => true,
        }
    }
}
