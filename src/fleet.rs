//! Read-only fleet collaborators: the device roster and the telemetry sink
//! reference directory.
//!
//! Both are externally managed. The core only reads them; a device missing a
//! sink reference still has its state simulated, it just skips telemetry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::devices::DeviceClass;

/// Opaque reference to a device's slot in the external telemetry sink:
/// an asset id plus a property-name to property-id map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkRef {
    pub asset_id: String,
    /// Maps model property names (e.g. `"StateOfCharge"`) to sink-side
    /// property ids.
    pub property_ids: HashMap<String, String>,
}

/// Roster and device-configuration collaborator.
///
/// Supplies the per-class, per-tenant device ids and resolves each device to
/// its sink reference.
pub trait Fleet: Send + Sync {
    /// Every registered `(class, tenant)` pair, the coordinator's fan-out set.
    fn class_tenants(&self) -> Vec<(DeviceClass, String)>;

    /// Device ids registered for a class and tenant.
    fn device_ids(&self, class: DeviceClass, tenant: &str) -> Vec<String>;

    /// Resolves a device to its telemetry sink reference, if configured.
    fn sink_ref(&self, class: DeviceClass, device_id: &str) -> Option<SinkRef>;
}

/// One registered device.
#[derive(Debug, Clone)]
pub struct FleetDevice {
    pub id: String,
    pub sink_ref: Option<SinkRef>,
}

/// One class/tenant roster entry.
#[derive(Debug, Clone)]
pub struct FleetEntry {
    pub class: DeviceClass,
    pub tenant: String,
    pub devices: Vec<FleetDevice>,
}

/// Config-backed static fleet.
#[derive(Debug, Clone, Default)]
pub struct StaticFleet {
    entries: Vec<FleetEntry>,
}

impl StaticFleet {
    pub fn new(entries: Vec<FleetEntry>) -> Self {
        Self { entries }
    }
}

impl Fleet for StaticFleet {
    fn class_tenants(&self) -> Vec<(DeviceClass, String)> {
        self.entries
            .iter()
            .map(|e| (e.class, e.tenant.clone()))
            .collect()
    }

    fn device_ids(&self, class: DeviceClass, tenant: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.class == class && e.tenant == tenant)
            .flat_map(|e| e.devices.iter().map(|d| d.id.clone()))
            .collect()
    }

    fn sink_ref(&self, class: DeviceClass, device_id: &str) -> Option<SinkRef> {
        self.entries
            .iter()
            .filter(|e| e.class == class)
            .flat_map(|e| e.devices.iter())
            .find(|d| d.id == device_id)
            .and_then(|d| d.sink_ref.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_fleet() -> StaticFleet {
        StaticFleet::new(vec![
            FleetEntry {
                class: DeviceClass::Ev,
                tenant: "home-1".into(),
                devices: vec![
                    FleetDevice {
                        id: "ev-1".into(),
                        sink_ref: Some(SinkRef {
                            asset_id: "asset-ev-1".into(),
                            property_ids: HashMap::from([(
                                "StateOfCharge".to_string(),
                                "prop-soc".to_string(),
                            )]),
                        }),
                    },
                    FleetDevice {
                        id: "ev-2".into(),
                        sink_ref: None,
                    },
                ],
            },
            FleetEntry {
                class: DeviceClass::Ac,
                tenant: "home-1".into(),
                devices: vec![FleetDevice {
                    id: "ac-1".into(),
                    sink_ref: None,
                }],
            },
        ])
    }

    #[test]
    fn lists_class_tenant_pairs() {
        let fleet = demo_fleet();
        let pairs = fleet.class_tenants();
        assert_eq!(pairs.len(), 2);
        assert!(pairs.contains(&(DeviceClass::Ev, "home-1".to_string())));
        assert!(pairs.contains(&(DeviceClass::Ac, "home-1".to_string())));
    }

    #[test]
    fn roster_is_scoped_to_class_and_tenant() {
        let fleet = demo_fleet();
        assert_eq!(fleet.device_ids(DeviceClass::Ev, "home-1"), vec!["ev-1", "ev-2"]);
        assert_eq!(fleet.device_ids(DeviceClass::Ac, "home-1"), vec!["ac-1"]);
        assert!(fleet.device_ids(DeviceClass::Ev, "home-2").is_empty());
    }

    #[test]
    fn resolves_sink_refs_only_where_configured() {
        let fleet = demo_fleet();
        let sink_ref = fleet.sink_ref(DeviceClass::Ev, "ev-1");
        assert_eq!(sink_ref.map(|s| s.asset_id), Some("asset-ev-1".to_string()));
        assert!(fleet.sink_ref(DeviceClass::Ev, "ev-2").is_none());
        assert!(fleet.sink_ref(DeviceClass::Ac, "ev-1").is_none());
    }
}
