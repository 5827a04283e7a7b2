//! The physical network manager.
//!
//! A `PhysicalNetwork` is the authoritative view of one routing domain: which interfaces belong
//! to it, the permission they share, whether it is the default network, and which UID ranges are
//! routed through it. Every mutation is pushed to the collaborators interface by interface and
//! the in-memory view only moves forward once the kernel side has accepted it.
//!
//! Multi-interface operations are fail-fast with no compensation: the first collaborator error
//! stops the loop and is returned as-is. Interfaces already updated in that loop keep their new
//! state, and the caller reconciles from `permission()`, `interfaces()` and friends.
//!
//! Methods take `&mut self`; one mutation is in flight per network at a time.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use physnet_types::{
    InterfaceName, ManagerSettings, NetId, NetworkScope, Permission, SubPriority, UidRangeMap,
    UidRanges,
};

use crate::delegate::FallthroughDelegate;
use crate::error::{InvalidArgument, NetworkError, Operation, Result};
use crate::route::{ResolvableInterface, RouteController, RouteSpec, default_prefixes};
use crate::sock_diag::{SockDiag, SockDiagSession};

/// Kernel-facing collaborators shared by every network a registry owns.
#[derive(Clone)]
pub struct KernelHandles {
    pub routes: Arc<dyn RouteController>,
    pub sock_diag: Arc<dyn SockDiag>,
}

impl KernelHandles {
    #[must_use]
    pub fn new(routes: Arc<dyn RouteController>, sock_diag: Arc<dyn SockDiag>) -> Self {
        Self { routes, sock_diag }
    }
}

impl fmt::Debug for KernelHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelHandles").finish_non_exhaustive()
    }
}

pub struct PhysicalNetwork {
    net_id: NetId,
    delegate: Arc<dyn FallthroughDelegate>,
    routes: Arc<dyn RouteController>,
    sock_diag: Arc<dyn SockDiag>,
    settings: ManagerSettings,
    scope: NetworkScope,
    permission: Permission,
    is_default: bool,
    interfaces: BTreeSet<InterfaceName>,
    uid_range_map: UidRangeMap,
}

impl PhysicalNetwork {
    #[must_use]
    pub fn new(
        net_id: NetId,
        delegate: Arc<dyn FallthroughDelegate>,
        scope: NetworkScope,
        kernel: &KernelHandles,
    ) -> Self {
        Self::with_settings(net_id, delegate, scope, kernel, ManagerSettings::default())
    }

    #[must_use]
    pub fn with_settings(
        net_id: NetId,
        delegate: Arc<dyn FallthroughDelegate>,
        scope: NetworkScope,
        kernel: &KernelHandles,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            net_id,
            delegate,
            routes: Arc::clone(&kernel.routes),
            sock_diag: Arc::clone(&kernel.sock_diag),
            settings,
            scope,
            permission: Permission::None,
            is_default: false,
            interfaces: BTreeSet::new(),
            uid_range_map: UidRangeMap::new(),
        }
    }

    #[must_use]
    pub fn net_id(&self) -> NetId {
        self.net_id
    }

    #[must_use]
    pub fn permission(&self) -> Permission {
        self.permission
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    #[must_use]
    pub fn scope(&self) -> NetworkScope {
        self.scope
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        self.scope.is_local()
    }

    #[must_use]
    pub fn has_interface(&self, interface: &InterfaceName) -> bool {
        self.interfaces.contains(interface)
    }

    /// Attached interfaces in name order.
    pub fn interfaces(&self) -> impl ExactSizeIterator<Item = &InterfaceName> {
        self.interfaces.iter()
    }

    #[must_use]
    pub fn uid_range_map(&self) -> &UidRangeMap {
        &self.uid_range_map
    }

    /// The sub-priority at which `uid` is routed through this network, if any.
    #[must_use]
    pub fn applies_to_user(&self, uid: u32) -> Option<SubPriority> {
        self.uid_range_map.lookup(uid)
    }

    // ------------------------------------------------------------------------
    // Permission
    // ------------------------------------------------------------------------

    pub fn set_permission(&mut self, permission: Permission) -> Result<()> {
        if permission == self.permission {
            return Ok(());
        }
        if self.interfaces.is_empty() {
            self.permission = permission;
            return Ok(());
        }

        // Nothing can lack NONE, so there are no sockets to close on a downgrade to it.
        let sock_diag = Arc::clone(&self.sock_diag);
        let mut session = if permission == Permission::None {
            None
        } else {
            Some(self.open_sock_diag(sock_diag.as_ref())?)
        };

        // Closing early narrows, but does not close, the window for sockets opened before the
        // tables change.
        if let Some(session) = session.as_deref_mut() {
            self.destroy_sockets_lacking_permission(session, permission);
        }

        for interface in &self.interfaces {
            if let Err(errno) = self.routes.modify_physical_network_permission(
                self.net_id,
                interface,
                self.permission,
                permission,
                self.scope,
            ) {
                tracing::error!(
                    net_id = %self.net_id,
                    interface = %interface,
                    from = %self.permission,
                    to = %permission,
                    "failed to change permission on interface: {errno}"
                );
                return Err(NetworkError::collaborator(
                    Operation::ModifyPermission,
                    self.net_id,
                    interface,
                    errno,
                ));
            }
            self.invalidate_route_cache(interface);
        }

        if self.is_default {
            for interface in &self.interfaces {
                // Add under the new permission before dropping the old one so the interface
                // never leaves fallthrough entirely.
                self.add_to_default(interface, permission)?;
                self.remove_from_default(&ResolvableInterface::new(interface), self.permission)?;
            }
        }

        // Sockets opened after the first pass are no longer routable; they cannot send a RST,
        // but closing them at least surfaces an error to the app.
        if let Some(session) = session.as_deref_mut() {
            self.destroy_sockets_lacking_permission(session, permission);
        }

        tracing::info!(
            net_id = %self.net_id,
            from = %self.permission,
            to = %permission,
            interfaces = self.interfaces.len(),
            "Network permission changed"
        );
        self.permission = permission;
        Ok(())
    }

    fn open_sock_diag<'s>(
        &self,
        sock_diag: &'s dyn SockDiag,
    ) -> Result<Box<dyn SockDiagSession + 's>> {
        sock_diag.open().map_err(|errno| {
            tracing::error!(
                net_id = %self.net_id,
                "Error closing sockets for permission change: {errno}"
            );
            NetworkError::ResourceUnavailable {
                net_id: self.net_id,
                errno,
            }
        })
    }

    fn destroy_sockets_lacking_permission(
        &self,
        session: &mut dyn SockDiagSession,
        permission: Permission,
    ) {
        match session.destroy_sockets_lacking_permission(
            self.net_id,
            permission,
            self.settings.loopback().excluded(),
        ) {
            Ok(destroyed) => {
                tracing::debug!(
                    net_id = %self.net_id,
                    permission = %permission,
                    destroyed,
                    "Destroyed sockets lacking permission"
                );
            }
            Err(errno) => {
                tracing::error!(
                    net_id = %self.net_id,
                    permission = %permission,
                    "Failed to close sockets for permission change: {errno}"
                );
            }
        }
    }

    /// Flush every cached destination decision that predates a table change by installing and
    /// withdrawing a throw route that sorts after all real routes.
    fn invalidate_route_cache(&self, interface: &InterfaceName) {
        let priority = self.settings.throw_route_priority();
        for destination in default_prefixes() {
            let route = RouteSpec::throw(destination, priority);
            if let Err(errno) = self.routes.add_route(interface, &route) {
                tracing::warn!(
                    interface = %interface,
                    destination = %destination,
                    "Route cache invalidation: add throw route failed: {errno}"
                );
            }
            if let Err(errno) = self.routes.remove_route(interface, &route) {
                tracing::warn!(
                    interface = %interface,
                    destination = %destination,
                    "Route cache invalidation: remove throw route failed: {errno}"
                );
            }
        }
    }

    // ------------------------------------------------------------------------
    // Default network
    // ------------------------------------------------------------------------

    pub fn add_as_default(&mut self) -> Result<()> {
        if self.is_default {
            return Ok(());
        }
        for interface in &self.interfaces {
            self.add_to_default(interface, self.permission)?;
        }
        self.is_default = true;
        tracing::info!(net_id = %self.net_id, "Network is now default");
        Ok(())
    }

    pub fn remove_as_default(&mut self) -> Result<()> {
        if !self.is_default {
            return Ok(());
        }
        for interface in &self.interfaces {
            self.remove_from_default(&ResolvableInterface::new(interface), self.permission)?;
        }
        self.is_default = false;
        tracing::info!(net_id = %self.net_id, "Network is no longer default");
        Ok(())
    }

    fn add_to_default(&self, interface: &InterfaceName, permission: Permission) -> Result<()> {
        if let Err(errno) = self
            .routes
            .add_interface_to_default_network(interface, permission)
        {
            tracing::error!(
                net_id = %self.net_id,
                interface = %interface,
                "failed to add interface to default network: {errno}"
            );
            return Err(NetworkError::collaborator(
                Operation::AddToDefaultNetwork,
                self.net_id,
                interface,
                errno,
            ));
        }
        self.delegate
            .add_fallthrough(interface, permission)
            .map_err(|errno| {
                NetworkError::collaborator(Operation::AddFallthrough, self.net_id, interface, errno)
            })
    }

    fn remove_from_default(
        &self,
        interface: &ResolvableInterface<'_>,
        permission: Permission,
    ) -> Result<()> {
        let name = interface.name();
        if let Err(errno) = self
            .routes
            .remove_interface_from_default_network(name, permission)
        {
            tracing::error!(
                net_id = %self.net_id,
                interface = %name,
                "failed to remove interface from default network: {errno}"
            );
            return Err(NetworkError::collaborator(
                Operation::RemoveFromDefaultNetwork,
                self.net_id,
                name,
                errno,
            ));
        }
        self.delegate
            .remove_fallthrough(name, permission)
            .map_err(|errno| {
                NetworkError::collaborator(Operation::RemoveFallthrough, self.net_id, name, errno)
            })
    }

    // ------------------------------------------------------------------------
    // UID ranges
    // ------------------------------------------------------------------------

    /// Route traffic from `uid_ranges` through this network at `sub_priority`.
    ///
    /// Overlap with ranges registered elsewhere is for the routing-table collaborator to reject;
    /// here only self-overlap is refused.
    pub fn add_users(&mut self, uid_ranges: &UidRanges, sub_priority: i32) -> Result<()> {
        let sub_priority = SubPriority::new(sub_priority).map_err(InvalidArgument::from)?;
        if !can_add_uid_ranges(uid_ranges) {
            tracing::error!(
                net_id = %self.net_id,
                ranges = %uid_ranges,
                "uid ranges overlap each other"
            );
            return Err(InvalidArgument::OverlappingUidRanges(uid_ranges.clone()).into());
        }

        let rules = UidRangeMap::single(sub_priority, uid_ranges.clone());
        for interface in &self.interfaces {
            if let Err(errno) = self.routes.add_users_to_physical_network(
                self.net_id,
                interface,
                &rules,
                self.scope,
            ) {
                tracing::error!(
                    net_id = %self.net_id,
                    interface = %interface,
                    "failed to add users on interface: {errno}"
                );
                return Err(NetworkError::collaborator(
                    Operation::AddUsers,
                    self.net_id,
                    interface,
                    errno,
                ));
            }
        }
        self.uid_range_map.add(sub_priority, uid_ranges);
        Ok(())
    }

    pub fn remove_users(&mut self, uid_ranges: &UidRanges, sub_priority: i32) -> Result<()> {
        let sub_priority = SubPriority::new(sub_priority).map_err(InvalidArgument::from)?;

        let rules = UidRangeMap::single(sub_priority, uid_ranges.clone());
        for interface in &self.interfaces {
            if let Err(errno) = self.routes.remove_users_from_physical_network(
                self.net_id,
                interface,
                &rules,
                self.scope,
            ) {
                tracing::error!(
                    net_id = %self.net_id,
                    interface = %interface,
                    "failed to remove users on interface: {errno}"
                );
                return Err(NetworkError::collaborator(
                    Operation::RemoveUsers,
                    self.net_id,
                    interface,
                    errno,
                ));
            }
        }
        self.uid_range_map.remove(sub_priority, uid_ranges);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Interfaces
    // ------------------------------------------------------------------------

    pub fn add_interface(&mut self, interface: &InterfaceName) -> Result<()> {
        if self.has_interface(interface) {
            return Ok(());
        }
        if let Err(errno) = self.routes.add_interface_to_physical_network(
            self.net_id,
            interface,
            self.permission,
            &self.uid_range_map,
            self.scope,
        ) {
            tracing::error!(
                net_id = %self.net_id,
                interface = %interface,
                "failed to add interface: {errno}"
            );
            return Err(NetworkError::collaborator(
                Operation::AddInterface,
                self.net_id,
                interface,
                errno,
            ));
        }
        if self.is_default {
            self.add_to_default(interface, self.permission)?;
        }
        self.interfaces.insert(interface.clone());
        tracing::info!(net_id = %self.net_id, interface = %interface, "Interface added");
        Ok(())
    }

    pub fn remove_interface(&mut self, interface: &InterfaceName) -> Result<()> {
        if !self.has_interface(interface) {
            return Ok(());
        }
        let resolvable = ResolvableInterface::new(interface);
        if self.is_default {
            self.remove_from_default(&resolvable, self.permission)?;
        }
        // Evicts the interface index; nothing that needs to resolve the name may follow.
        if let Err(errno) = self.routes.remove_interface_from_physical_network(
            self.net_id,
            resolvable,
            self.permission,
            &self.uid_range_map,
            self.scope,
        ) {
            tracing::error!(
                net_id = %self.net_id,
                interface = %interface,
                "failed to remove interface: {errno}"
            );
            return Err(NetworkError::collaborator(
                Operation::RemoveInterface,
                self.net_id,
                interface,
                errno,
            ));
        }
        self.interfaces.remove(interface);
        tracing::info!(net_id = %self.net_id, interface = %interface, "Interface removed");
        Ok(())
    }

    /// Detach every interface, stopping at the first failure.
    pub fn clear_interfaces(&mut self) -> Result<()> {
        let attached: Vec<InterfaceName> = self.interfaces.iter().cloned().collect();
        for interface in &attached {
            self.remove_interface(interface)?;
        }
        Ok(())
    }
}

fn can_add_uid_ranges(uid_ranges: &UidRanges) -> bool {
    !uid_ranges.overlaps_self()
}

impl fmt::Debug for PhysicalNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalNetwork")
            .field("net_id", &self.net_id)
            .field("scope", &self.scope)
            .field("permission", &self.permission)
            .field("is_default", &self.is_default)
            .field("interfaces", &self.interfaces)
            .field("uid_range_map", &self.uid_range_map)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for PhysicalNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "netId {} PHYSICAL{} permission={}{} interfaces={{",
            self.net_id,
            if self.is_local() { " local" } else { "" },
            self.permission,
            if self.is_default { " default" } else { "" },
        )?;
        for (i, interface) in self.interfaces.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{interface}")?;
        }
        write!(f, "}} uids={}", self.uid_range_map)
    }
}
