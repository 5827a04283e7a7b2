//! A collaborator that records instead of touching the kernel.
//!
//! [`RecordingKernel`] implements the routing-table, socket-diagnostics and fallthrough
//! traits at once. Every call is appended to a journal in the order it was made, and faults can
//! be injected per call kind (optionally per interface) to exercise partial-failure paths. It
//! backs the test suite and the CLI dry run.

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use physnet_types::{InterfaceName, NetId, NetworkScope, Permission, UidRangeMap};

use crate::delegate::FallthroughDelegate;
use crate::error::Errno;
use crate::route::{ResolvableInterface, RouteController, RouteSpec};
use crate::sock_diag::{SockDiag, SockDiagSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    AddToDefaultNetwork,
    RemoveFromDefaultNetwork,
    ModifyPermission,
    AddRoute,
    RemoveRoute,
    AddInterface,
    RemoveInterface,
    AddUsers,
    RemoveUsers,
    OpenSockDiag,
    DestroySockets,
    AddFallthrough,
    RemoveFallthrough,
}

impl CallKind {
    pub const ALL: [CallKind; 13] = [
        CallKind::AddToDefaultNetwork,
        CallKind::RemoveFromDefaultNetwork,
        CallKind::ModifyPermission,
        CallKind::AddRoute,
        CallKind::RemoveRoute,
        CallKind::AddInterface,
        CallKind::RemoveInterface,
        CallKind::AddUsers,
        CallKind::RemoveUsers,
        CallKind::OpenSockDiag,
        CallKind::DestroySockets,
        CallKind::AddFallthrough,
        CallKind::RemoveFallthrough,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CallKind::AddToDefaultNetwork => "add_to_default_network",
            CallKind::RemoveFromDefaultNetwork => "remove_from_default_network",
            CallKind::ModifyPermission => "modify_permission",
            CallKind::AddRoute => "add_route",
            CallKind::RemoveRoute => "remove_route",
            CallKind::AddInterface => "add_interface",
            CallKind::RemoveInterface => "remove_interface",
            CallKind::AddUsers => "add_users",
            CallKind::RemoveUsers => "remove_users",
            CallKind::OpenSockDiag => "open_sock_diag",
            CallKind::DestroySockets => "destroy_sockets",
            CallKind::AddFallthrough => "add_fallthrough",
            CallKind::RemoveFallthrough => "remove_fallthrough",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown call kind '{0}'")]
pub struct UnknownCallKind(pub String);

impl FromStr for CallKind {
    type Err = UnknownCallKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        CallKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| UnknownCallKind(s.to_string()))
    }
}

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AddToDefaultNetwork {
        interface: InterfaceName,
        permission: Permission,
    },
    RemoveFromDefaultNetwork {
        interface: InterfaceName,
        permission: Permission,
    },
    ModifyPermission {
        net_id: NetId,
        interface: InterfaceName,
        from: Permission,
        to: Permission,
        scope: NetworkScope,
    },
    AddRoute {
        interface: InterfaceName,
        route: RouteSpec,
    },
    RemoveRoute {
        interface: InterfaceName,
        route: RouteSpec,
    },
    AddInterface {
        net_id: NetId,
        interface: InterfaceName,
        permission: Permission,
        uid_range_map: UidRangeMap,
        scope: NetworkScope,
    },
    RemoveInterface {
        net_id: NetId,
        interface: InterfaceName,
        permission: Permission,
        uid_range_map: UidRangeMap,
        scope: NetworkScope,
    },
    AddUsers {
        net_id: NetId,
        interface: InterfaceName,
        rules: UidRangeMap,
        scope: NetworkScope,
    },
    RemoveUsers {
        net_id: NetId,
        interface: InterfaceName,
        rules: UidRangeMap,
        scope: NetworkScope,
    },
    OpenSockDiag,
    DestroySockets {
        net_id: NetId,
        permission: Permission,
        exclude_loopback: bool,
    },
    AddFallthrough {
        interface: InterfaceName,
        permission: Permission,
    },
    RemoveFallthrough {
        interface: InterfaceName,
        permission: Permission,
    },
}

impl Call {
    #[must_use]
    pub fn kind(&self) -> CallKind {
        match self {
            Call::AddToDefaultNetwork { .. } => CallKind::AddToDefaultNetwork,
            Call::RemoveFromDefaultNetwork { .. } => CallKind::RemoveFromDefaultNetwork,
            Call::ModifyPermission { .. } => CallKind::ModifyPermission,
            Call::AddRoute { .. } => CallKind::AddRoute,
            Call::RemoveRoute { .. } => CallKind::RemoveRoute,
            Call::AddInterface { .. } => CallKind::AddInterface,
            Call::RemoveInterface { .. } => CallKind::RemoveInterface,
            Call::AddUsers { .. } => CallKind::AddUsers,
            Call::RemoveUsers { .. } => CallKind::RemoveUsers,
            Call::OpenSockDiag => CallKind::OpenSockDiag,
            Call::DestroySockets { .. } => CallKind::DestroySockets,
            Call::AddFallthrough { .. } => CallKind::AddFallthrough,
            Call::RemoveFallthrough { .. } => CallKind::RemoveFallthrough,
        }
    }

    #[must_use]
    pub fn interface(&self) -> Option<&InterfaceName> {
        match self {
            Call::AddToDefaultNetwork { interface, .. }
            | Call::RemoveFromDefaultNetwork { interface, .. }
            | Call::ModifyPermission { interface, .. }
            | Call::AddRoute { interface, .. }
            | Call::RemoveRoute { interface, .. }
            | Call::AddInterface { interface, .. }
            | Call::RemoveInterface { interface, .. }
            | Call::AddUsers { interface, .. }
            | Call::RemoveUsers { interface, .. }
            | Call::AddFallthrough { interface, .. }
            | Call::RemoveFallthrough { interface, .. } => Some(interface),
            Call::OpenSockDiag | Call::DestroySockets { .. } => None,
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Call::AddToDefaultNetwork {
                interface,
                permission,
            }
            | Call::RemoveFromDefaultNetwork {
                interface,
                permission,
            }
            | Call::AddFallthrough {
                interface,
                permission,
            }
            | Call::RemoveFallthrough {
                interface,
                permission,
            } => write!(f, "{} {interface} {permission}", self.kind()),
            Call::ModifyPermission {
                net_id,
                interface,
                from,
                to,
                scope,
            } => write!(
                f,
                "{} netId={net_id} {interface} {from}->{to}{}",
                self.kind(),
                local_suffix(*scope)
            ),
            Call::AddRoute { interface, route } | Call::RemoveRoute { interface, route } => write!(
                f,
                "{} {interface} {} {} priority={}",
                self.kind(),
                route.destination,
                route.route_type,
                route.priority
            ),
            Call::AddInterface {
                net_id,
                interface,
                permission,
                uid_range_map,
                scope,
            }
            | Call::RemoveInterface {
                net_id,
                interface,
                permission,
                uid_range_map,
                scope,
            } => write!(
                f,
                "{} netId={net_id} {interface} {permission} uids={uid_range_map}{}",
                self.kind(),
                local_suffix(*scope)
            ),
            Call::AddUsers {
                net_id,
                interface,
                rules,
                scope,
            }
            | Call::RemoveUsers {
                net_id,
                interface,
                rules,
                scope,
            } => write!(
                f,
                "{} netId={net_id} {interface} {rules}{}",
                self.kind(),
                local_suffix(*scope)
            ),
            Call::OpenSockDiag => write!(f, "{}", self.kind()),
            Call::DestroySockets {
                net_id,
                permission,
                exclude_loopback,
            } => write!(
                f,
                "{} netId={net_id} lacking {permission}{}",
                self.kind(),
                if *exclude_loopback {
                    " (sparing loopback)"
                } else {
                    ""
                }
            ),
        }
    }
}

fn local_suffix(scope: NetworkScope) -> &'static str {
    if scope.is_local() { " local" } else { "" }
}

/// An injected failure. Matches every call of `kind`, restricted to `interface` when set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind: CallKind,
    pub interface: Option<InterfaceName>,
    pub errno: Errno,
}

impl Fault {
    fn matches(&self, call: &Call) -> bool {
        self.kind == call.kind()
            && self
                .interface
                .as_ref()
                .is_none_or(|wanted| call.interface() == Some(wanted))
    }
}

#[derive(Debug, Default)]
struct Journal {
    calls: Vec<Call>,
    faults: Vec<Fault>,
}

#[derive(Debug, Default)]
pub struct RecordingKernel {
    journal: Mutex<Journal>,
}

impl RecordingKernel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn journal(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail every future `kind` call with `errno`.
    pub fn fail(&self, kind: CallKind, errno: Errno) {
        self.journal().faults.push(Fault {
            kind,
            interface: None,
            errno,
        });
    }

    /// Fail every future `kind` call that targets `interface`.
    pub fn fail_on(&self, kind: CallKind, interface: &InterfaceName, errno: Errno) {
        self.journal().faults.push(Fault {
            kind,
            interface: Some(interface.clone()),
            errno,
        });
    }

    pub fn clear_faults(&self) {
        self.journal().faults.clear();
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.journal().calls.clone()
    }

    /// Drain the journal, keeping injected faults.
    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut self.journal().calls)
    }

    #[must_use]
    pub fn count(&self, kind: CallKind) -> usize {
        self.journal()
            .calls
            .iter()
            .filter(|call| call.kind() == kind)
            .count()
    }

    /// Record `call`, then answer it with the first matching fault, if any.
    fn record(&self, call: Call) -> Result<(), Errno> {
        tracing::debug!(%call, "kernel call");
        let mut journal = self.journal();
        let outcome = journal
            .faults
            .iter()
            .find(|fault| fault.matches(&call))
            .map_or(Ok(()), |fault| Err(fault.errno));
        journal.calls.push(call);
        outcome
    }
}

impl RouteController for RecordingKernel {
    fn add_interface_to_default_network(
        &self,
        interface: &InterfaceName,
        permission: Permission,
    ) -> Result<(), Errno> {
        self.record(Call::AddToDefaultNetwork {
            interface: interface.clone(),
            permission,
        })
    }

    fn remove_interface_from_default_network(
        &self,
        interface: &InterfaceName,
        permission: Permission,
    ) -> Result<(), Errno> {
        self.record(Call::RemoveFromDefaultNetwork {
            interface: interface.clone(),
            permission,
        })
    }

    fn modify_physical_network_permission(
        &self,
        net_id: NetId,
        interface: &InterfaceName,
        old_permission: Permission,
        new_permission: Permission,
        scope: NetworkScope,
    ) -> Result<(), Errno> {
        self.record(Call::ModifyPermission {
            net_id,
            interface: interface.clone(),
            from: old_permission,
            to: new_permission,
            scope,
        })
    }

    fn add_route(&self, interface: &InterfaceName, route: &RouteSpec) -> Result<(), Errno> {
        self.record(Call::AddRoute {
            interface: interface.clone(),
            route: *route,
        })
    }

    fn remove_route(&self, interface: &InterfaceName, route: &RouteSpec) -> Result<(), Errno> {
        self.record(Call::RemoveRoute {
            interface: interface.clone(),
            route: *route,
        })
    }

    fn add_interface_to_physical_network(
        &self,
        net_id: NetId,
        interface: &InterfaceName,
        permission: Permission,
        uid_range_map: &UidRangeMap,
        scope: NetworkScope,
    ) -> Result<(), Errno> {
        self.record(Call::AddInterface {
            net_id,
            interface: interface.clone(),
            permission,
            uid_range_map: uid_range_map.clone(),
            scope,
        })
    }

    fn remove_interface_from_physical_network(
        &self,
        net_id: NetId,
        interface: ResolvableInterface<'_>,
        permission: Permission,
        uid_range_map: &UidRangeMap,
        scope: NetworkScope,
    ) -> Result<(), Errno> {
        self.record(Call::RemoveInterface {
            net_id,
            interface: interface.name().clone(),
            permission,
            uid_range_map: uid_range_map.clone(),
            scope,
        })
    }

    fn add_users_to_physical_network(
        &self,
        net_id: NetId,
        interface: &InterfaceName,
        rules: &UidRangeMap,
        scope: NetworkScope,
    ) -> Result<(), Errno> {
        self.record(Call::AddUsers {
            net_id,
            interface: interface.clone(),
            rules: rules.clone(),
            scope,
        })
    }

    fn remove_users_from_physical_network(
        &self,
        net_id: NetId,
        interface: &InterfaceName,
        rules: &UidRangeMap,
        scope: NetworkScope,
    ) -> Result<(), Errno> {
        self.record(Call::RemoveUsers {
            net_id,
            interface: interface.clone(),
            rules: rules.clone(),
            scope,
        })
    }
}

struct RecordingSession<'a> {
    kernel: &'a RecordingKernel,
}

impl SockDiagSession for RecordingSession<'_> {
    fn destroy_sockets_lacking_permission(
        &mut self,
        net_id: NetId,
        permission: Permission,
        exclude_loopback: bool,
    ) -> Result<usize, Errno> {
        self.kernel
            .record(Call::DestroySockets {
                net_id,
                permission,
                exclude_loopback,
            })
            .map(|()| 0)
    }
}

impl SockDiag for RecordingKernel {
    fn open(&self) -> Result<Box<dyn SockDiagSession + '_>, Errno> {
        self.record(Call::OpenSockDiag)?;
        Ok(Box::new(RecordingSession { kernel: self }))
    }
}

impl FallthroughDelegate for RecordingKernel {
    fn add_fallthrough(
        &self,
        interface: &InterfaceName,
        permission: Permission,
    ) -> Result<(), Errno> {
        self.record(Call::AddFallthrough {
            interface: interface.clone(),
            permission,
        })
    }

    fn remove_fallthrough(
        &self,
        interface: &InterfaceName,
        permission: Permission,
    ) -> Result<(), Errno> {
        self.record(Call::RemoveFallthrough {
            interface: interface.clone(),
            permission,
        })
    }
}
