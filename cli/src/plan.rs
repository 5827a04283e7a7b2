//! Replay plans.
//!
//! A plan is a TOML file that declares networks, optional injected failures, and the steps to
//! apply in order:
//!
//! ```toml
//! [[network]]
//! net_id = 100
//! scope = "local"
//!
//! [[fault]]
//! kind = "modify_permission"
//! interface = "wlan0"
//! errno = 19
//!
//! [[step]]
//! op = "add_interface"
//! net_id = 100
//! interface = "eth0"
//!
//! [[step]]
//! op = "add_users"
//! net_id = 100
//! sub_priority = 10
//! ranges = [{ start = 1000, stop = 1999 }]
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use physnet_core::{CallKind, Errno, Fault};
use physnet_types::{InterfaceName, NetId, NetworkScope, Permission, UidRange, UidRanges};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Plan {
    #[serde(default, rename = "network")]
    pub networks: Vec<NetworkDecl>,
    #[serde(default, rename = "fault")]
    pub faults: Vec<FaultDecl>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkDecl {
    pub net_id: NetId,
    #[serde(default)]
    pub scope: NetworkScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FaultDecl {
    pub kind: String,
    pub interface: Option<InterfaceName>,
    /// Either sign is accepted.
    pub errno: i32,
}

impl FaultDecl {
    pub fn to_fault(&self) -> Result<Fault> {
        let kind: CallKind = self.kind.parse()?;
        Ok(Fault {
            kind,
            interface: self.interface.clone(),
            errno: Errno::new(self.errno),
        })
    }
}

/// One operation against a declared network.
///
/// `sub_priority` stays a raw integer so out-of-range values reach the manager and are rejected
/// there.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    AddInterface {
        net_id: NetId,
        interface: InterfaceName,
    },
    RemoveInterface {
        net_id: NetId,
        interface: InterfaceName,
    },
    ClearInterfaces {
        net_id: NetId,
    },
    SetPermission {
        net_id: NetId,
        permission: Permission,
    },
    AddAsDefault {
        net_id: NetId,
    },
    RemoveAsDefault {
        net_id: NetId,
    },
    AddUsers {
        net_id: NetId,
        sub_priority: i32,
        ranges: Vec<UidRange>,
    },
    RemoveUsers {
        net_id: NetId,
        sub_priority: i32,
        ranges: Vec<UidRange>,
    },
}

impl Step {
    #[must_use]
    pub fn net_id(&self) -> NetId {
        match self {
            Step::AddInterface { net_id, .. }
            | Step::RemoveInterface { net_id, .. }
            | Step::ClearInterfaces { net_id }
            | Step::SetPermission { net_id, .. }
            | Step::AddAsDefault { net_id }
            | Step::RemoveAsDefault { net_id }
            | Step::AddUsers { net_id, .. }
            | Step::RemoveUsers { net_id, .. } => *net_id,
        }
    }

    #[must_use]
    pub fn op(&self) -> &'static str {
        match self {
            Step::AddInterface { .. } => "add_interface",
            Step::RemoveInterface { .. } => "remove_interface",
            Step::ClearInterfaces { .. } => "clear_interfaces",
            Step::SetPermission { .. } => "set_permission",
            Step::AddAsDefault { .. } => "add_as_default",
            Step::RemoveAsDefault { .. } => "remove_as_default",
            Step::AddUsers { .. } => "add_users",
            Step::RemoveUsers { .. } => "remove_users",
        }
    }
}

pub fn uid_ranges(ranges: &[UidRange]) -> UidRanges {
    ranges.iter().copied().collect()
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} netId={}", self.op(), self.net_id())?;
        match self {
            Step::AddInterface { interface, .. } | Step::RemoveInterface { interface, .. } => {
                write!(f, " {interface}")
            }
            Step::SetPermission { permission, .. } => write!(f, " {permission}"),
            Step::AddUsers {
                sub_priority,
                ranges,
                ..
            }
            | Step::RemoveUsers {
                sub_priority,
                ranges,
                ..
            } => write!(f, " {sub_priority}: {}", uid_ranges(ranges)),
            Step::ClearInterfaces { .. } | Step::AddAsDefault { .. } | Step::RemoveAsDefault { .. } => {
                Ok(())
            }
        }
    }
}

impl Plan {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plan {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid plan {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let plan: Plan = toml::from_str(content)?;
        plan.validate()?;
        Ok(plan)
    }

    fn validate(&self) -> Result<()> {
        let mut declared = BTreeSet::new();
        for network in &self.networks {
            if !declared.insert(network.net_id) {
                bail!("netId {} is declared twice", network.net_id);
            }
        }
        for (index, step) in self.steps.iter().enumerate() {
            if !declared.contains(&step.net_id()) {
                bail!(
                    "step {} ({}) targets undeclared netId {}",
                    index + 1,
                    step.op(),
                    step.net_id()
                );
            }
        }
        for fault in &self.faults {
            fault.to_fault()?;
        }
        Ok(())
    }
}
