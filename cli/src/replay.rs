//! Dry-run replay of a plan against the recording kernel.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use physnet_core::{KernelHandles, NetworkError, PhysicalNetwork, RecordingKernel};
use physnet_types::{
    InterfaceName, ManagerSettings, NetId, NetworkScope, Permission, UidRangeMap,
};

use crate::plan::{Plan, Step, uid_ranges};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub step: String,
    pub error: Option<String>,
    /// Positive errno of the failure.
    pub errno: Option<i32>,
    pub calls: Vec<String>,
}

impl StepOutcome {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkState {
    pub net_id: NetId,
    pub scope: NetworkScope,
    pub permission: Permission,
    pub is_default: bool,
    pub interfaces: Vec<InterfaceName>,
    pub uid_ranges: UidRangeMap,
    pub summary: String,
}

impl NetworkState {
    fn of(network: &PhysicalNetwork) -> Self {
        Self {
            net_id: network.net_id(),
            scope: network.scope(),
            permission: network.permission(),
            is_default: network.is_default(),
            interfaces: network.interfaces().cloned().collect(),
            uid_ranges: network.uid_range_map().clone(),
            summary: network.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub steps: Vec<StepOutcome>,
    pub networks: Vec<NetworkState>,
}

impl Report {
    #[must_use]
    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|step| !step.succeeded()).count()
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            match &step.error {
                None => {
                    let _ = writeln!(out, "step {}: {} ... ok", step.index, step.step);
                }
                Some(error) => {
                    let _ = writeln!(out, "step {}: {} ... failed: {error}", step.index, step.step);
                }
            }
            for call in &step.calls {
                let _ = writeln!(out, "    {call}");
            }
        }
        out.push_str("final state:\n");
        for network in &self.networks {
            let _ = writeln!(out, "  {}", network.summary);
        }
        out
    }
}

/// Networks wired to one shared recording kernel, in netId order.
pub struct Replay {
    kernel: Arc<RecordingKernel>,
    networks: BTreeMap<NetId, PhysicalNetwork>,
}

impl Replay {
    #[must_use]
    pub fn new(plan: &Plan, settings: ManagerSettings) -> Self {
        let kernel = Arc::new(RecordingKernel::new());
        let handles = KernelHandles::new(kernel.clone(), kernel.clone());
        let networks = plan
            .networks
            .iter()
            .map(|decl| {
                let network = PhysicalNetwork::with_settings(
                    decl.net_id,
                    kernel.clone(),
                    decl.scope,
                    &handles,
                    settings,
                );
                (decl.net_id, network)
            })
            .collect();
        Self { kernel, networks }
    }

    pub fn inject_faults(&self, plan: &Plan) -> Result<()> {
        for decl in &plan.faults {
            let fault = decl.to_fault()?;
            tracing::debug!(kind = %fault.kind, errno = %fault.errno, "Injecting fault");
            match &fault.interface {
                Some(interface) => self.kernel.fail_on(fault.kind, interface, fault.errno),
                None => self.kernel.fail(fault.kind, fault.errno),
            }
        }
        Ok(())
    }

    /// Apply every step in order. A failing step is reported and the replay moves on.
    pub fn run(&mut self, steps: &[Step]) -> Vec<StepOutcome> {
        steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let result = self.apply(step);
                let calls = self
                    .kernel
                    .take_calls()
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                if let Err(err) = &result {
                    tracing::warn!(step = i + 1, op = step.op(), "Step failed: {err}");
                }
                StepOutcome {
                    index: i + 1,
                    step: step.to_string(),
                    error: result.as_ref().err().map(ToString::to_string),
                    errno: result.as_ref().err().map(|err| err.errno().code()),
                    calls,
                }
            })
            .collect()
    }

    fn apply(&mut self, step: &Step) -> Result<(), NetworkError> {
        let Some(network) = self.networks.get_mut(&step.net_id()) else {
            // Plans are validated before replay; an unknown id is a no-op.
            tracing::warn!(net_id = %step.net_id(), "Step targets unknown network");
            return Ok(());
        };
        match step {
            Step::AddInterface { interface, .. } => network.add_interface(interface),
            Step::RemoveInterface { interface, .. } => network.remove_interface(interface),
            Step::ClearInterfaces { .. } => network.clear_interfaces(),
            Step::SetPermission { permission, .. } => network.set_permission(*permission),
            Step::AddAsDefault { .. } => network.add_as_default(),
            Step::RemoveAsDefault { .. } => network.remove_as_default(),
            Step::AddUsers {
                sub_priority,
                ranges,
                ..
            } => network.add_users(&uid_ranges(ranges), *sub_priority),
            Step::RemoveUsers {
                sub_priority,
                ranges,
                ..
            } => network.remove_users(&uid_ranges(ranges), *sub_priority),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<NetworkState> {
        self.networks.values().map(NetworkState::of).collect()
    }
}

/// Build the networks, inject faults, run every step and collect the result.
pub fn replay(plan: &Plan, settings: ManagerSettings) -> Result<Report> {
    let mut replay = Replay::new(plan, settings);
    replay.inject_faults(plan)?;
    let steps = replay.run(&plan.steps);
    Ok(Report {
        steps,
        networks: replay.snapshot(),
    })
}
