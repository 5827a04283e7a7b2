//! Boundary: socket diagnostics.
//!
//! Opening yields a session; the session enumerates and force-closes sockets on a network whose
//! owner no longer holds the permission the network requires.

use physnet_types::{NetId, Permission};

use crate::error::Errno;

pub trait SockDiag: Send + Sync {
    fn open(&self) -> Result<Box<dyn SockDiagSession + '_>, Errno>;
}

pub trait SockDiagSession {
    /// Returns how many sockets were destroyed.
    fn destroy_sockets_lacking_permission(
        &mut self,
        net_id: NetId,
        permission: Permission,
        exclude_loopback: bool,
    ) -> Result<usize, Errno>;
}
