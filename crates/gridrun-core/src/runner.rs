//! Runners, deployments, and channel specs.

use serde::{Deserialize, Serialize};

use gridrun_fabric::InstanceId;

use crate::error::{CoreError, CoreResult};
use crate::topology::Topology;

/// Unique identifier of a runner within one deployment.
pub type RunnerId = u64;

/// Where a runner must run: a concrete instance, or any instance whose
/// topology covers the requirement.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerTarget {
    Instance(InstanceId),
    Topology(Topology),
}

/// A requested runner, as supplied by the caller before deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerSpec {
    pub id: RunnerId,
    pub function: String,
    pub target: RunnerTarget,
}

/// A runner resolved to its instance. Immutable once the deployment
/// starts dispatching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runner {
    pub id: RunnerId,
    pub function: String,
    pub instance: InstanceId,
}

/// A variable-sized MPSC channel between runners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    #[serde(rename = "Name")]
    pub name: String,
    /// Runner ids allowed to push.
    #[serde(rename = "Producers")]
    pub producers: Vec<RunnerId>,
    /// The single runner id allowed to peek/pop.
    #[serde(rename = "Consumer")]
    pub consumer: RunnerId,
    /// Maximum number of pending tokens.
    #[serde(rename = "Buffer Capacity")]
    pub capacity: usize,
    /// Maximum pending payload bytes.
    #[serde(rename = "Buffer Size")]
    pub payload_size: usize,
}

impl ChannelSpec {
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::InvalidDescription("channel without a name".into()));
        }
        if self.producers.is_empty() {
            return Err(CoreError::InvalidDescription(format!(
                "channel '{}' has no producers",
                self.name
            )));
        }
        if self.producers.contains(&self.consumer) {
            return Err(CoreError::InvalidDescription(format!(
                "channel '{}': consumer {} is also a producer",
                self.name, self.consumer
            )));
        }
        if self.capacity == 0 || self.payload_size == 0 {
            return Err(CoreError::InvalidDescription(format!(
                "channel '{}' has a zero-sized buffer",
                self.name
            )));
        }
        Ok(())
    }
}

/// An ordered set of runner specs plus the channels connecting them.
///
/// Construction checks description-level validity (names, channel
/// wiring). Deployment-level validity (id uniqueness, registered
/// functions) is the coordinator's job, which reports the dedicated
/// error kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    pub runners: Vec<RunnerSpec>,
    pub channels: Vec<ChannelSpec>,
}

impl Deployment {
    pub fn new(runners: Vec<RunnerSpec>, channels: Vec<ChannelSpec>) -> CoreResult<Self> {
        if runners.is_empty() {
            return Err(CoreError::InvalidDescription("no runners requested".into()));
        }
        for runner in &runners {
            if runner.function.is_empty() {
                return Err(CoreError::InvalidDescription(format!(
                    "runner {} has an empty function name",
                    runner.id
                )));
            }
        }
        for channel in &channels {
            channel.validate()?;
            let known = |id: &RunnerId| runners.iter().any(|r| r.id == *id);
            if !known(&channel.consumer) || !channel.producers.iter().all(known) {
                return Err(CoreError::InvalidDescription(format!(
                    "channel '{}' references an unknown runner id",
                    channel.name
                )));
            }
        }
        Ok(Self { runners, channels })
    }

    /// Whether every runner already names a concrete instance.
    pub fn fully_placed(&self) -> bool {
        self.runners
            .iter()
            .all(|r| matches!(r.target, RunnerTarget::Instance(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placed(id: RunnerId, function: &str, instance: InstanceId) -> RunnerSpec {
        RunnerSpec {
            id,
            function: function.to_string(),
            target: RunnerTarget::Instance(instance),
        }
    }

    fn channel(name: &str, producers: Vec<RunnerId>, consumer: RunnerId) -> ChannelSpec {
        ChannelSpec {
            name: name.to_string(),
            producers,
            consumer,
            capacity: 4,
            payload_size: 256,
        }
    }

    #[test]
    fn deployment_accepts_wired_channels() {
        let deployment = Deployment::new(
            vec![placed(0, "W", 1), placed(1, "C", 2)],
            vec![channel("w-to-c", vec![0], 1)],
        )
        .unwrap();
        assert!(deployment.fully_placed());
    }

    #[test]
    fn empty_function_name_is_rejected() {
        let result = Deployment::new(vec![placed(0, "", 1)], vec![]);
        assert!(matches!(result, Err(CoreError::InvalidDescription(_))));
    }

    #[test]
    fn channel_consumer_must_not_produce() {
        let result = Deployment::new(
            vec![placed(0, "W", 1), placed(1, "C", 2)],
            vec![channel("bad", vec![0, 1], 1)],
        );
        assert!(matches!(result, Err(CoreError::InvalidDescription(_))));
    }

    #[test]
    fn channel_must_reference_known_runners() {
        let result = Deployment::new(
            vec![placed(0, "W", 1), placed(1, "C", 2)],
            vec![channel("dangling", vec![0], 9)],
        );
        assert!(matches!(result, Err(CoreError::InvalidDescription(_))));
    }

    #[test]
    fn topology_targets_are_not_fully_placed() {
        let deployment = Deployment::new(
            vec![RunnerSpec {
                id: 0,
                function: "W".to_string(),
                target: RunnerTarget::Topology(Topology::default()),
            }],
            vec![],
        )
        .unwrap();
        assert!(!deployment.fully_placed());
    }
}
