//! Hardware topology model.
//!
//! A topology is an unordered collection of devices; each device carries
//! a type tag, its memory spaces (type + size in bytes), and its compute
//! resources (type). The JSON encoding uses the wire keys `Devices`,
//! `Type`, `Memory Spaces`, `Size`, `Compute Resources`; unknown keys are
//! preserved through the round-trip so backend-specific annotations
//! survive transport.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};

/// One memory space of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySpace {
    #[serde(rename = "Type")]
    pub kind: String,
    /// Size in bytes.
    #[serde(rename = "Size")]
    pub size_bytes: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One compute resource of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeResource {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One device: a type tag plus its memory spaces and compute resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Memory Spaces", default)]
    pub memory_spaces: Vec<MemorySpace>,
    #[serde(rename = "Compute Resources", default)]
    pub compute_resources: Vec<ComputeResource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Device {
    /// Total bytes across this device's memory spaces.
    pub fn memory_total(&self) -> u64 {
        self.memory_spaces.iter().map(|m| m.size_bytes).sum()
    }

    /// Number of compute resources on this device.
    pub fn compute_count(&self) -> usize {
        self.compute_resources.len()
    }
}

/// A host's hardware description.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Topology {
    #[serde(rename = "Devices", default)]
    pub devices: Vec<Device>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Topology {
    /// Canonical byte encoding. Device, memory-space, and
    /// compute-resource order is preserved, so the encoding is
    /// deterministic for a given value.
    pub fn serialize(&self) -> CoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CoreError::InvalidFormat(e.to_string()))
    }

    /// Decode a topology from its canonical byte encoding.
    ///
    /// Unknown device types are data, not errors; malformed input or an
    /// empty type tag is `InvalidFormat`.
    pub fn deserialize(bytes: &[u8]) -> CoreResult<Self> {
        let topology: Topology =
            serde_json::from_slice(bytes).map_err(|e| CoreError::InvalidFormat(e.to_string()))?;
        topology.validate()?;
        Ok(topology)
    }

    /// Append `other`'s devices to this topology, preserving order.
    /// Used to merge per-backend topology reports on one host.
    pub fn merge(&mut self, other: Topology) {
        self.devices.extend(other.devices);
    }

    fn validate(&self) -> CoreResult<()> {
        for device in &self.devices {
            if device.kind.is_empty() {
                return Err(CoreError::InvalidFormat("empty device type tag".into()));
            }
            if device.memory_spaces.iter().any(|m| m.kind.is_empty()) {
                return Err(CoreError::InvalidFormat(
                    "empty memory space type tag".into(),
                ));
            }
            if device.compute_resources.iter().any(|c| c.kind.is_empty()) {
                return Err(CoreError::InvalidFormat(
                    "empty compute resource type tag".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Whether `host` can satisfy `required`.
///
/// Every required device must be covered by a distinct host device of
/// the same type tag with at least as much total memory and at least as
/// many compute resources. Host devices are consumed greedily in
/// declaration order. O(|host| · |required|).
pub fn is_subset(host: &Topology, required: &Topology) -> bool {
    let mut consumed = vec![false; host.devices.len()];

    'required: for needed in &required.devices {
        for (i, candidate) in host.devices.iter().enumerate() {
            if consumed[i] || candidate.kind != needed.kind {
                continue;
            }
            if candidate.memory_total() >= needed.memory_total()
                && candidate.compute_count() >= needed.compute_count()
            {
                consumed[i] = true;
                continue 'required;
            }
        }
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(kind: &str, mem_bytes: u64, compute: usize) -> Device {
        Device {
            kind: kind.to_string(),
            memory_spaces: vec![MemorySpace {
                kind: "RAM".to_string(),
                size_bytes: mem_bytes,
                extra: Map::new(),
            }],
            compute_resources: (0..compute)
                .map(|_| ComputeResource {
                    kind: "Processing Unit".to_string(),
                    extra: Map::new(),
                })
                .collect(),
            extra: Map::new(),
        }
    }

    fn topology(devices: Vec<Device>) -> Topology {
        Topology {
            devices,
            extra: Map::new(),
        }
    }

    const GB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn every_topology_is_subset_of_itself() {
        let t = topology(vec![
            device("NUMA Domain", 64 * GB, 16),
            device("GPU", 16 * GB, 1),
        ]);
        assert!(is_subset(&t, &t));

        let empty = topology(vec![]);
        assert!(is_subset(&empty, &empty));
    }

    #[test]
    fn subset_requires_matching_type_tags() {
        let host = topology(vec![device("NUMA Domain", 64 * GB, 16)]);
        let required = topology(vec![device("GPU", 1 * GB, 1)]);
        assert!(!is_subset(&host, &required));
    }

    #[test]
    fn subset_compares_memory_and_compute() {
        let host = topology(vec![device("NUMA Domain", 4 * GB, 4)]);

        let fits = topology(vec![device("NUMA Domain", 2 * GB, 4)]);
        assert!(is_subset(&host, &fits));

        let too_much_memory = topology(vec![device("NUMA Domain", 8 * GB, 4)]);
        assert!(!is_subset(&host, &too_much_memory));

        let too_many_units = topology(vec![device("NUMA Domain", 2 * GB, 8)]);
        assert!(!is_subset(&host, &too_many_units));
    }

    #[test]
    fn host_devices_are_consumed_once() {
        let host = topology(vec![device("GPU", 16 * GB, 1)]);
        let required = topology(vec![device("GPU", 8 * GB, 1), device("GPU", 8 * GB, 1)]);
        assert!(!is_subset(&host, &required));

        let host_two = topology(vec![device("GPU", 16 * GB, 1), device("GPU", 16 * GB, 1)]);
        assert!(is_subset(&host_two, &required));
    }

    #[test]
    fn greedy_consumption_follows_declaration_order() {
        // The big host device is consumed by the first (small) requirement,
        // so an equally small second requirement must use the second slot.
        let host = topology(vec![device("N", 64 * GB, 8), device("N", 4 * GB, 2)]);
        let required = topology(vec![device("N", 2 * GB, 1), device("N", 2 * GB, 1)]);
        assert!(is_subset(&host, &required));

        let required_big_second = topology(vec![
            device("N", 2 * GB, 1),
            device("N", 32 * GB, 4),
        ]);
        assert!(!is_subset(&host, &required_big_second));
    }

    #[test]
    fn canonical_round_trip_is_stable() {
        let t = topology(vec![
            device("NUMA Domain", 64 * GB, 16),
            device("GPU", 16 * GB, 1),
        ]);

        let bytes = t.serialize().unwrap();
        let back = Topology::deserialize(&bytes).unwrap();
        assert_eq!(back, t);
        assert!(is_subset(&back, &t));
        assert_eq!(back.serialize().unwrap(), bytes);
    }

    #[test]
    fn unknown_keys_survive_the_round_trip() {
        let json = r#"{
            "Devices": [
                {
                    "Type": "Accelerator X",
                    "Memory Spaces": [{"Type": "HBM", "Size": 1024, "Vendor": "acme"}],
                    "Compute Resources": [{"Type": "Core"}],
                    "Firmware": "v2"
                }
            ],
            "Hostname": "node-7"
        }"#;

        let t = Topology::deserialize(json.as_bytes()).unwrap();
        assert_eq!(t.devices[0].kind, "Accelerator X");
        assert_eq!(t.extra.get("Hostname"), Some(&Value::from("node-7")));
        assert_eq!(t.devices[0].extra.get("Firmware"), Some(&Value::from("v2")));

        let bytes = t.serialize().unwrap();
        let back = Topology::deserialize(&bytes).unwrap();
        assert_eq!(back, t);
        assert_eq!(back.serialize().unwrap(), bytes);
    }

    #[test]
    fn malformed_input_is_invalid_format() {
        assert!(matches!(
            Topology::deserialize(b"not json"),
            Err(CoreError::InvalidFormat(_))
        ));
        assert!(matches!(
            Topology::deserialize(br#"{"Devices": [{"Type": ""}]}"#),
            Err(CoreError::InvalidFormat(_))
        ));
    }

    #[test]
    fn merge_appends_devices_in_order() {
        let mut base = topology(vec![device("NUMA Domain", 4 * GB, 4)]);
        let report = topology(vec![device("GPU", 16 * GB, 1), device("NIC", 0, 0)]);

        base.merge(report);
        let kinds: Vec<&str> = base.devices.iter().map(|d| d.kind.as_str()).collect();
        assert_eq!(kinds, vec!["NUMA Domain", "GPU", "NIC"]);
    }
}
