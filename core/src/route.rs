//! Boundary: the routing-table collaborator.
//!
//! Implementations program kernel policy-routing rules, routes and UID-range rules, and keep
//! a cache from interface name to kernel index. The manager never talks to netlink itself.

use std::fmt;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};

use physnet_types::{InterfaceName, NetId, NetworkScope, Permission, UidRangeMap};

use crate::error::Errno;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteType {
    Unicast,
    Throw,
    Unreachable,
}

impl RouteType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RouteType::Unicast => "unicast",
            RouteType::Throw => "throw",
            RouteType::Unreachable => "unreachable",
        }
    }
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which routing table a route lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteTable {
    /// The per-interface table.
    Interface,
    LocalNetwork,
    LegacyNetwork,
    LegacySystem,
}

/// A route to install or withdraw on one interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteSpec {
    pub destination: IpNet,
    pub route_type: RouteType,
    pub table: RouteTable,
    /// Zero leaves the path MTU unset. Ignored on removal.
    pub mtu: u32,
    pub priority: u32,
}

impl RouteSpec {
    /// Throw route used purely to flush cached destination decisions.
    #[must_use]
    pub const fn throw(destination: IpNet, priority: u32) -> Self {
        Self {
            destination,
            route_type: RouteType::Throw,
            table: RouteTable::Interface,
            mtu: 0,
            priority,
        }
    }
}

/// IPv4 and IPv6 default prefixes, in that order.
#[must_use]
pub fn default_prefixes() -> [IpNet; 2] {
    [
        IpNet::V4(Ipv4Net::default()),
        IpNet::V6(Ipv6Net::default()),
    ]
}

/// Proof that an interface still resolves to a kernel index.
///
/// Removing an interface from its physical network evicts the cached index, after which the
/// routing-table collaborator can no longer address the interface by name. The removal call
/// takes this token by value, so every step that still needs the index must borrow it first;
/// once it has been handed over nothing else can use it.
#[derive(Debug)]
pub struct ResolvableInterface<'a> {
    name: &'a InterfaceName,
}

impl<'a> ResolvableInterface<'a> {
    pub(crate) fn new(name: &'a InterfaceName) -> Self {
        Self { name }
    }

    #[must_use]
    pub fn name(&self) -> &'a InterfaceName {
        self.name
    }
}

/// Kernel policy-routing mutations.
///
/// Every method blocks until the kernel has answered. Errors carry the kernel's errno.
pub trait RouteController: Send + Sync {
    fn add_interface_to_default_network(
        &self,
        interface: &InterfaceName,
        permission: Permission,
    ) -> Result<(), Errno>;

    fn remove_interface_from_default_network(
        &self,
        interface: &InterfaceName,
        permission: Permission,
    ) -> Result<(), Errno>;

    fn modify_physical_network_permission(
        &self,
        net_id: NetId,
        interface: &InterfaceName,
        old_permission: Permission,
        new_permission: Permission,
        scope: NetworkScope,
    ) -> Result<(), Errno>;

    fn add_route(&self, interface: &InterfaceName, route: &RouteSpec) -> Result<(), Errno>;

    fn remove_route(&self, interface: &InterfaceName, route: &RouteSpec) -> Result<(), Errno>;

    fn add_interface_to_physical_network(
        &self,
        net_id: NetId,
        interface: &InterfaceName,
        permission: Permission,
        uid_range_map: &UidRangeMap,
        scope: NetworkScope,
    ) -> Result<(), Errno>;

    /// Tears down the interface's rules and evicts its cached kernel index.
    ///
    /// Consumes `interface`: callers cannot resolve the interface again afterwards.
    fn remove_interface_from_physical_network(
        &self,
        net_id: NetId,
        interface: ResolvableInterface<'_>,
        permission: Permission,
        uid_range_map: &UidRangeMap,
        scope: NetworkScope,
    ) -> Result<(), Errno>;

    /// `rules` holds exactly the `(sub-priority, ranges)` pairs to add.
    fn add_users_to_physical_network(
        &self,
        net_id: NetId,
        interface: &InterfaceName,
        rules: &UidRangeMap,
        scope: NetworkScope,
    ) -> Result<(), Errno>;

    fn remove_users_from_physical_network(
        &self,
        net_id: NetId,
        interface: &InterfaceName,
        rules: &UidRangeMap,
        scope: NetworkScope,
    ) -> Result<(), Errno>;
}
