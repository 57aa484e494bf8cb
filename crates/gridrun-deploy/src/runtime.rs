//! The per-instance deployment runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use gridrun_channel::{Channel, ChannelConfig, ChannelRole};
use gridrun_core::{ChannelSpec, Deployment, Runner, RunnerId, RunnerTarget, Topology};
use gridrun_fabric::{Fabric, InstanceId, RemoteFault};
use gridrun_match::assign;
use gridrun_rpc::{RpcEngine, RpcError};

use crate::error::{DeployError, DeployResult};

/// Built-in RPC target that returns the serving instance's topology.
pub const GET_TOPOLOGY_RPC: &str = "[DeployR] Get Topology";

/// Built-in RPC target that parks an instance with no assigned runner:
/// it joins the collective channel handshake with no role and returns.
pub const PARK_RPC: &str = "[DeployR] Park";

/// Lifecycle of one instance's runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    New,
    Initialized,
    Listening,
    Matching,
    Dispatching,
    RunningLocal,
    Done,
}

type EntryFn = Box<dyn FnMut() + Send>;

struct Shared {
    fabric: Arc<dyn Fabric>,
    rpc: RpcEngine,
    topology: Topology,
    functions: Mutex<HashMap<String, EntryFn>>,
    channel_specs: Mutex<Vec<ChannelSpec>>,
    channels: Mutex<HashMap<String, Arc<Channel>>>,
    runner_id: Mutex<Option<RunnerId>>,
    phase: Mutex<Phase>,
    /// Set once this instance has been launched or parked.
    dispatched: AtomicBool,
}

/// The deployment runtime for one instance.
///
/// Every instance constructs one with its fabric handle and its local
/// topology, registers the same functions and channel specs (the
/// program is SPMD), and then splits: the coordinator calls
/// [`Runtime::deploy`], everyone else [`Runtime::serve`].
pub struct Runtime {
    shared: Arc<Shared>,
}

/// Cheap clone handed to entry closures.
///
/// Entries own their captures; this is the explicit environment they
/// capture instead of borrowing the runtime.
#[derive(Clone)]
pub struct RuntimeHandle {
    shared: Arc<Shared>,
}

impl Runtime {
    pub fn new(fabric: Arc<dyn Fabric>, topology: Topology) -> Self {
        let rpc = RpcEngine::new(Arc::clone(&fabric));
        Self {
            shared: Arc::new(Shared {
                fabric,
                rpc,
                topology,
                functions: Mutex::new(HashMap::new()),
                channel_specs: Mutex::new(Vec::new()),
                channels: Mutex::new(HashMap::new()),
                runner_id: Mutex::new(None),
                phase: Mutex::new(Phase::New),
                dispatched: AtomicBool::new(false),
            }),
        }
    }

    /// A handle for entry closures to capture.
    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Whether this instance is the nominated coordinator.
    pub fn is_coordinator(&self) -> bool {
        self.shared.fabric.current_instance_id() == self.shared.fabric.root_instance_id()
    }

    pub fn phase(&self) -> Phase {
        *self.shared.phase.lock()
    }

    /// Register a user entry function.
    ///
    /// Also installs the launch shim: an RPC target under the same name
    /// that acknowledges the dispatch, records the runner id, joins the
    /// channel handshake, and runs the entry. Fails with
    /// `DuplicateName` if `name` is taken; the first registration wins.
    pub fn register_function(
        &self,
        name: &str,
        entry: impl FnMut() + Send + 'static,
    ) -> DeployResult<()> {
        let phase = *self.shared.phase.lock();
        if !matches!(phase, Phase::New | Phase::Initialized) {
            return Err(DeployError::WrongPhase(phase));
        }

        {
            let mut functions = self.shared.functions.lock();
            if functions.contains_key(name) {
                return Err(DeployError::DuplicateName(name.to_string()));
            }
            functions.insert(name.to_string(), Box::new(entry));
        }

        let shared = Arc::clone(&self.shared);
        let function = name.to_string();
        self.shared
            .rpc
            .register_target(name, move || launch_shim(&shared, &function))
            .map_err(|e| match e {
                RpcError::DuplicateName(name) => DeployError::DuplicateName(name),
                other => DeployError::Rpc(other),
            })?;

        debug!(function = name, "entry function registered");
        Ok(())
    }

    /// Declare the deployment's channels on this instance.
    ///
    /// Must be called identically on every instance before `serve`; the
    /// coordinator's `deploy` takes the specs from the deployment
    /// instead. Channel tags are assigned from declaration order.
    pub fn configure_channels(&self, specs: Vec<ChannelSpec>) -> DeployResult<()> {
        for spec in &specs {
            spec.validate()?;
        }
        *self.shared.channel_specs.lock() = specs;
        Ok(())
    }

    /// Register the built-in RPC targets and leave `New`.
    pub fn initialize(&self) -> DeployResult<()> {
        let mut phase = self.shared.phase.lock();
        if *phase != Phase::New {
            return Err(DeployError::WrongPhase(*phase));
        }

        let shared = Arc::clone(&self.shared);
        self.shared.rpc.register_target(GET_TOPOLOGY_RPC, move || {
            let encoded = match shared.topology.serialize() {
                Ok(encoded) => encoded,
                Err(e) => {
                    error!(error = %e, "local topology failed to serialize");
                    return;
                }
            };
            if let Err(e) = shared.rpc.submit_return_value(&encoded) {
                error!(error = %e, "failed to submit topology");
            }
        })?;

        let shared = Arc::clone(&self.shared);
        self.shared.rpc.register_target(PARK_RPC, move || {
            if let Err(e) = park_shim(&shared) {
                error!(error = %e, "park shim failed");
            }
        })?;

        *phase = Phase::Initialized;
        info!(
            instance = self.shared.fabric.current_instance_id(),
            coordinator = self.shared.fabric.root_instance_id(),
            "runtime initialized"
        );
        Ok(())
    }

    /// Coordinator path: resolve, validate, dispatch, set up channels,
    /// and run the local entry if one is assigned here.
    ///
    /// Failures leave the runtime in `Initialized` so the caller can
    /// retry with another deployment; workers keep listening meanwhile.
    pub fn deploy(&self, deployment: Deployment) -> DeployResult<()> {
        {
            let phase = *self.shared.phase.lock();
            if phase != Phase::Initialized {
                return Err(DeployError::WrongPhase(phase));
            }
        }
        if !self.is_coordinator() {
            return Err(DeployError::NotCoordinator);
        }

        match self.deploy_inner(deployment) {
            Ok(()) => {
                *self.shared.phase.lock() = Phase::Done;
                Ok(())
            }
            Err(e) => {
                *self.shared.phase.lock() = Phase::Initialized;
                Err(e)
            }
        }
    }

    fn deploy_inner(&self, deployment: Deployment) -> DeployResult<()> {
        let shared = &self.shared;
        let me = shared.fabric.current_instance_id();

        *shared.phase.lock() = Phase::Matching;
        let runners = self.resolve(&deployment)?;

        // Deployment-level validity.
        for (i, runner) in runners.iter().enumerate() {
            if runners[..i].iter().any(|r| r.id == runner.id) {
                return Err(DeployError::DuplicateRunnerId(runner.id));
            }
            if runners[..i].iter().any(|r| r.instance == runner.instance) {
                return Err(DeployError::DuplicateInstanceId(runner.instance));
            }
            if !shared.functions.lock().contains_key(&runner.function) {
                return Err(DeployError::UnknownFunction(runner.function.clone()));
            }
        }

        *shared.phase.lock() = Phase::Dispatching;
        self.configure_channels(deployment.channels.clone())?;

        let mut local = None;
        for runner in &runners {
            if runner.instance == me {
                local = Some(runner.clone());
                continue;
            }
            info!(
                runner = runner.id,
                function = %runner.function,
                instance = runner.instance,
                "dispatching runner"
            );
            match shared.rpc.request(runner.instance, &runner.function, runner.id) {
                Ok(ack) => ack.release(),
                Err(RpcError::Remote(RemoteFault::UnknownTarget(name))) => {
                    return Err(DeployError::UnknownFunction(name));
                }
                Err(other) => return Err(other.into()),
            }
        }

        // Instances that host no runner still have to join the channel
        // handshake; park them.
        for instance in shared.fabric.instances() {
            if instance == me || runners.iter().any(|r| r.instance == instance) {
                continue;
            }
            debug!(instance, "parking unassigned instance");
            shared.rpc.request(instance, PARK_RPC, 0)?.release();
        }

        let local_runner_id = local.as_ref().map(|r| r.id);
        *shared.runner_id.lock() = local_runner_id;
        build_channels(shared, local_runner_id)?;

        if let Some(runner) = local {
            *shared.phase.lock() = Phase::RunningLocal;
            info!(runner = runner.id, function = %runner.function, "running local entry");
            run_entry(shared, &runner.function)?;
        }
        Ok(())
    }

    /// Resolve every runner to an instance, gathering topologies and
    /// matching when the deployment is not fully placed.
    fn resolve(&self, deployment: &Deployment) -> DeployResult<Vec<Runner>> {
        let shared = &self.shared;

        if deployment.fully_placed() {
            return Ok(deployment
                .runners
                .iter()
                .filter_map(|spec| match &spec.target {
                    RunnerTarget::Instance(instance) => Some(Runner {
                        id: spec.id,
                        function: spec.function.clone(),
                        instance: *instance,
                    }),
                    RunnerTarget::Topology(_) => None,
                })
                .collect());
        }

        let mut required = Vec::with_capacity(deployment.runners.len());
        for spec in &deployment.runners {
            match &spec.target {
                RunnerTarget::Topology(topology) => required.push(topology.clone()),
                RunnerTarget::Instance(_) => {
                    return Err(DeployError::Description(gridrun_core::CoreError::InvalidDescription(
                        "deployment mixes pinned instances with required topologies".into(),
                    )));
                }
            }
        }

        let given = self.gather_global_topology()?;
        let assignment = assign(&required, &given).ok_or(DeployError::Unmatchable)?;

        let instances = shared.fabric.instances();
        Ok(deployment
            .runners
            .iter()
            .zip(assignment)
            .map(|(spec, host_index)| Runner {
                id: spec.id,
                function: spec.function.clone(),
                instance: instances[host_index],
            })
            .collect())
    }

    /// One topology per participating instance, in group order. Peers
    /// are asked over RPC; the local topology is read directly.
    fn gather_global_topology(&self) -> DeployResult<Vec<Topology>> {
        let shared = &self.shared;
        let me = shared.fabric.current_instance_id();

        let mut global = Vec::new();
        for instance in shared.fabric.instances() {
            if instance == me {
                global.push(shared.topology.clone());
                continue;
            }
            let reply = shared.rpc.request(instance, GET_TOPOLOGY_RPC, 0)?;
            let topology = Topology::deserialize(reply.as_bytes())?;
            reply.release();
            debug!(instance, devices = topology.devices.len(), "topology gathered");
            global.push(topology);
        }
        Ok(global)
    }

    /// Worker path: serve incoming RPCs until this instance has been
    /// launched (entry already executed by the shim) or parked.
    pub fn serve(&self) -> DeployResult<()> {
        {
            let mut phase = self.shared.phase.lock();
            if *phase != Phase::Initialized {
                return Err(DeployError::WrongPhase(*phase));
            }
            *phase = Phase::Listening;
        }

        while !self.shared.dispatched.load(Ordering::Acquire) {
            self.shared.rpc.listen()?;
        }

        *self.shared.phase.lock() = Phase::Done;
        Ok(())
    }

    /// Release channel resources and enter the collective shutdown.
    pub fn finalize(&self) -> DeployResult<()> {
        self.shared.channels.lock().clear();
        self.shared.fabric.finalize()?;
        Ok(())
    }
}

impl RuntimeHandle {
    /// The runner id assigned to this instance, once launched.
    pub fn runner_id(&self) -> Option<RunnerId> {
        *self.shared.runner_id.lock()
    }

    pub fn instance_id(&self) -> InstanceId {
        self.shared.fabric.current_instance_id()
    }

    pub fn is_coordinator(&self) -> bool {
        self.shared.fabric.current_instance_id() == self.shared.fabric.root_instance_id()
    }

    /// This instance's local topology.
    pub fn local_topology(&self) -> Topology {
        self.shared.topology.clone()
    }

    /// A channel of the running deployment, by name.
    pub fn channel(&self, name: &str) -> DeployResult<Arc<Channel>> {
        self.shared
            .channels
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| DeployError::UnknownChannel(name.to_string()))
    }
}

/// Role this instance plays in `spec`, given its runner id.
fn role_for(spec: &ChannelSpec, runner: Option<RunnerId>) -> ChannelRole {
    match runner {
        Some(id) if spec.consumer == id => ChannelRole::Consumer,
        Some(id) if spec.producers.contains(&id) => ChannelRole::Producer,
        _ => ChannelRole::Observer,
    }
}

/// Collective channel setup; every instance calls this between dispatch
/// and entry execution, with tags assigned from spec order.
fn build_channels(shared: &Arc<Shared>, runner: Option<RunnerId>) -> DeployResult<()> {
    let specs = shared.channel_specs.lock().clone();
    for (index, spec) in specs.iter().enumerate() {
        let role = role_for(spec, runner);
        let channel = Channel::open(
            Arc::clone(&shared.fabric),
            ChannelConfig {
                tag: index as u64,
                capacity: spec.capacity,
                payload_size: spec.payload_size,
            },
            role,
        )?;
        shared
            .channels
            .lock()
            .insert(spec.name.clone(), Arc::new(channel));
    }
    Ok(())
}

/// Run a registered entry function to completion.
fn run_entry(shared: &Arc<Shared>, function: &str) -> DeployResult<()> {
    let entry = shared.functions.lock().remove(function);
    let Some(mut entry) = entry else {
        return Err(DeployError::UnknownFunction(function.to_string()));
    };
    entry();
    shared.functions.lock().insert(function.to_string(), entry);
    Ok(())
}

/// Body of the per-function RPC target: acknowledge the dispatch before
/// anything else (the coordinator is serially collecting acks), then
/// record the runner id, join the channel handshake, and run the entry.
fn launch_shim(shared: &Arc<Shared>, function: &str) {
    let runner_id = match shared.rpc.rpc_argument() {
        Some(arg) => arg,
        None => {
            error!(function, "launch shim invoked outside an RPC");
            return;
        }
    };
    if let Err(e) = shared.rpc.submit_return_value(&[]) {
        error!(function, error = %e, "failed to acknowledge dispatch");
        return;
    }

    *shared.runner_id.lock() = Some(runner_id);
    info!(runner = runner_id, function, "runner launched");

    if let Err(e) = build_channels(shared, Some(runner_id)) {
        error!(function, error = %e, "channel setup failed");
        return;
    }

    *shared.phase.lock() = Phase::RunningLocal;
    if let Err(e) = run_entry(shared, function) {
        error!(function, error = %e, "entry execution failed");
    }
    shared.dispatched.store(true, Ordering::Release);
}

/// Body of the park target: acknowledge, join the handshake with no
/// role, and release the serve loop.
fn park_shim(shared: &Arc<Shared>) -> DeployResult<()> {
    shared.rpc.submit_return_value(&[])?;
    build_channels(shared, None)?;
    shared.dispatched.store(true, Ordering::Release);
    info!("instance parked");
    Ok(())
}
