//! The demo driver: one coordinator greeting its workers over channels.

use std::sync::Arc;
use std::thread;

use anyhow::Context;
use tracing::info;

use gridrun_channel::ChannelError;
use gridrun_core::{ChannelSpec, Deployment, RunnerSpec, RunnerTarget, Topology};
use gridrun_deploy::{Runtime, RuntimeHandle};
use gridrun_fabric::LocalFabric;

/// The built-in job: one coordinator plus a worker per remaining
/// instance, each worker fed by its own channel.
pub fn demo_deployment(instances: usize) -> anyhow::Result<Deployment> {
    anyhow::ensure!(instances >= 2, "the demo needs at least two instances");

    let mut runners = vec![RunnerSpec {
        id: 0,
        function: "CoordinatorFc".to_string(),
        target: RunnerTarget::Topology(Topology::default()),
    }];
    let mut channels = Vec::new();
    for worker in 1..instances as u64 {
        runners.push(RunnerSpec {
            id: worker,
            function: "WorkerFc".to_string(),
            target: RunnerTarget::Topology(Topology::default()),
        });
        channels.push(ChannelSpec {
            name: format!("to-{worker}"),
            producers: vec![0],
            consumer: worker,
            capacity: 2,
            payload_size: 256,
        });
    }

    Ok(Deployment::new(runners, channels)?)
}

fn coordinator_fc(handle: &RuntimeHandle, channels: &[ChannelSpec]) {
    info!(instance = handle.instance_id(), "coordinator up");
    for spec in channels {
        let greeting = format!("hello runner {}", spec.consumer);
        let channel = match handle.channel(&spec.name) {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!(channel = %spec.name, error = %e, "channel missing");
                continue;
            }
        };
        loop {
            match channel.push(greeting.as_bytes()) {
                Ok(()) => break,
                Err(ChannelError::WouldBlock) => thread::yield_now(),
                Err(e) => {
                    tracing::error!(channel = %spec.name, error = %e, "push failed");
                    return;
                }
            }
        }
        info!(channel = %spec.name, "greeting sent");
    }
}

fn worker_fc(handle: &RuntimeHandle) {
    let me = match handle.runner_id() {
        Some(id) => id,
        None => return,
    };
    let channel = match handle.channel(&format!("to-{me}")) {
        Ok(channel) => channel,
        // A worker without a channel just reports in and returns.
        Err(_) => {
            info!(runner = me, instance = handle.instance_id(), "worker up");
            return;
        }
    };

    let token = loop {
        match channel.peek() {
            Ok(token) => break token,
            Err(ChannelError::Empty) => thread::yield_now(),
            Err(e) => {
                tracing::error!(runner = me, error = %e, "peek failed");
                return;
            }
        }
    };
    let message = String::from_utf8_lossy(token.as_bytes()).into_owned();
    if let Err(e) = channel.pop() {
        tracing::error!(runner = me, error = %e, "pop failed");
        return;
    }
    info!(runner = me, instance = handle.instance_id(), %message, "worker received greeting");
}

/// Run `deployment` on an in-process group of `instances` threads.
///
/// Every thread registers the same functions and channel specs, then
/// the root deploys while the rest serve — the same SPMD shape a
/// multi-process backend would run.
pub fn run_local(instances: usize, deployment: Deployment) -> anyhow::Result<()> {
    let group = LocalFabric::group(instances);
    let channels = deployment.channels.clone();

    let threads: Vec<_> = group
        .into_iter()
        .enumerate()
        .map(|(rank, fabric)| {
            let deployment = deployment.clone();
            let channels = channels.clone();
            thread::Builder::new()
                .name(format!("instance-{rank}"))
                .spawn(move || -> anyhow::Result<()> {
                    let runtime = Runtime::new(Arc::new(fabric), demo_topology(rank));

                    let handle = runtime.handle();
                    let coordinator_channels = channels.clone();
                    runtime.register_function("CoordinatorFc", move || {
                        coordinator_fc(&handle, &coordinator_channels);
                    })?;

                    let handle = runtime.handle();
                    runtime.register_function("WorkerFc", move || {
                        worker_fc(&handle);
                    })?;

                    runtime.initialize()?;

                    if runtime.is_coordinator() {
                        runtime.deploy(deployment)?;
                        info!("deployment complete");
                    } else {
                        runtime.configure_channels(channels.clone())?;
                        runtime.serve()?;
                    }
                    runtime.finalize()?;
                    Ok(())
                })
                .expect("spawn instance thread")
        })
        .collect();

    for thread in threads {
        thread
            .join()
            .map_err(|_| anyhow::anyhow!("instance thread panicked"))?
            .context("instance failed")?;
    }
    Ok(())
}

/// Synthetic per-rank topology for the demo group.
fn demo_topology(rank: usize) -> Topology {
    use gridrun_core::{ComputeResource, Device, MemorySpace};

    Topology {
        devices: vec![Device {
            kind: "NUMA Domain".to_string(),
            memory_spaces: vec![MemorySpace {
                kind: "RAM".to_string(),
                size_bytes: 4 * 1024 * 1024 * 1024 * (rank as u64 + 1),
                extra: Default::default(),
            }],
            compute_resources: vec![ComputeResource {
                kind: "Processing Unit".to_string(),
                extra: Default::default(),
            }],
            extra: Default::default(),
        }],
        extra: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_deployment_wires_one_channel_per_worker() {
        let deployment = demo_deployment(4).unwrap();
        assert_eq!(deployment.runners.len(), 4);
        assert_eq!(deployment.channels.len(), 3);
        assert!(deployment
            .channels
            .iter()
            .all(|c| c.producers == vec![0]));
    }

    #[test]
    fn demo_needs_a_worker() {
        assert!(demo_deployment(1).is_err());
    }

    #[test]
    fn demo_runs_end_to_end() {
        let deployment = demo_deployment(3).unwrap();
        run_local(3, deployment).unwrap();
    }
}
