//! The user-facing JSON job description.
//!
//! ```json
//! {
//!   "Runners": [
//!     { "Function": "CoordinatorFc", "Topology": { "Devices": [ ... ] } },
//!     { "Function": "WorkerFc", "Replicas": 2, "Topology": { ... } }
//!   ],
//!   "Channels": [
//!     { "Name": "results", "Producers": [1, 2], "Consumer": 0,
//!       "Buffer Capacity": 8, "Buffer Size": 4096 }
//!   ]
//! }
//! ```
//!
//! Each runner entry names its entry function and either a required
//! `Topology` or a direct `InstanceId`. Runner ids are assigned in
//! declaration order, starting at 0; an entry with `Replicas: k` expands
//! into `k` runners with consecutive ids. Channel specs reference those
//! ids.

use serde::Deserialize;

use gridrun_fabric::InstanceId;

use crate::error::{CoreError, CoreResult};
use crate::runner::{ChannelSpec, Deployment, RunnerSpec, RunnerTarget};
use crate::topology::Topology;

/// One entry in the `Runners` array.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerEntry {
    /// Optional diagnostic label.
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Function")]
    pub function: String,
    #[serde(rename = "Topology", default)]
    pub topology: Option<Topology>,
    #[serde(rename = "InstanceId", default)]
    pub instance_id: Option<InstanceId>,
    /// Expansion count; defaults to 1.
    #[serde(rename = "Replicas", default)]
    pub replicas: Option<u64>,
}

/// A parsed job description.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentDescription {
    #[serde(rename = "Runners")]
    pub runners: Vec<RunnerEntry>,
    #[serde(rename = "Channels", default)]
    pub channels: Vec<ChannelSpec>,
}

impl DeploymentDescription {
    /// Parse a description from JSON text.
    pub fn from_json(text: &str) -> CoreResult<Self> {
        serde_json::from_str(text).map_err(|e| CoreError::InvalidDescription(e.to_string()))
    }

    /// Expand the description into a validated [`Deployment`].
    pub fn into_deployment(self) -> CoreResult<Deployment> {
        let mut runners = Vec::new();
        let mut next_id = 0;

        for entry in self.runners {
            let label = entry.name.as_deref().unwrap_or(&entry.function);
            let replicas = entry.replicas.unwrap_or(1);
            if replicas == 0 {
                return Err(CoreError::InvalidDescription(format!(
                    "runner '{label}' requests zero replicas"
                )));
            }

            let target = match (entry.instance_id, entry.topology) {
                (Some(instance), None) => {
                    if replicas > 1 {
                        return Err(CoreError::InvalidDescription(format!(
                            "runner '{label}' pins an instance id but requests {replicas} replicas"
                        )));
                    }
                    RunnerTarget::Instance(instance)
                }
                (None, Some(topology)) => RunnerTarget::Topology(topology),
                (Some(_), Some(_)) => {
                    return Err(CoreError::InvalidDescription(format!(
                        "runner '{label}' supplies both Topology and InstanceId"
                    )));
                }
                (None, None) => {
                    return Err(CoreError::InvalidDescription(format!(
                        "runner '{label}' supplies neither Topology nor InstanceId"
                    )));
                }
            };

            for _ in 0..replicas {
                runners.push(RunnerSpec {
                    id: next_id,
                    function: entry.function.clone(),
                    target: target.clone(),
                });
                next_id += 1;
            }
        }

        Deployment::new(runners, self.channels)
    }
}
