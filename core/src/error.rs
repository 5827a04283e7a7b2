//! Errors surfaced by the physical network manager.
//!
//! Collaborators report failures as an [`Errno`]. The manager wraps that code together with the
//! operation and interface it was applying, and hands the first failure back unchanged.

use std::fmt;
use std::io;

use thiserror::Error;

use physnet_types::{InterfaceName, InvalidSubPriority, NetId, UidRanges};

pub type Result<T> = std::result::Result<T, NetworkError>;

/// A positive OS error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(i32);

impl Errno {
    pub const EINVAL: Errno = Errno(libc::EINVAL);
    pub const EBADFD: Errno = Errno(libc::EBADFD);
    pub const ENODEV: Errno = Errno(libc::ENODEV);
    pub const EEXIST: Errno = Errno(libc::EEXIST);
    pub const ENOENT: Errno = Errno(libc::ENOENT);
    pub const ENOMEM: Errno = Errno(libc::ENOMEM);
    pub const ENOBUFS: Errno = Errno(libc::ENOBUFS);

    /// Accepts either sign; netlink code commonly reports `-errno`.
    #[must_use]
    pub const fn new(code: i32) -> Self {
        Self(code.wrapping_abs())
    }

    #[must_use]
    pub const fn code(self) -> i32 {
        self.0
    }

    /// The `-errno` convention used by netd-style command handlers.
    #[must_use]
    pub const fn negated(self) -> i32 {
        -self.0
    }
}

impl From<io::Error> for Errno {
    fn from(err: io::Error) -> Self {
        Self::new(err.raw_os_error().unwrap_or(libc::EIO))
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", io::Error::from_raw_os_error(self.0))
    }
}

impl std::error::Error for Errno {}

/// The collaborator call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    AddToDefaultNetwork,
    RemoveFromDefaultNetwork,
    AddFallthrough,
    RemoveFallthrough,
    ModifyPermission,
    AddInterface,
    RemoveInterface,
    AddUsers,
    RemoveUsers,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::AddToDefaultNetwork => "add interface to default network",
            Operation::RemoveFromDefaultNetwork => "remove interface from default network",
            Operation::AddFallthrough => "add fallthrough",
            Operation::RemoveFallthrough => "remove fallthrough",
            Operation::ModifyPermission => "modify permission",
            Operation::AddInterface => "add interface",
            Operation::RemoveInterface => "remove interface",
            Operation::AddUsers => "add users",
            Operation::RemoveUsers => "remove users",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidArgument {
    #[error(transparent)]
    SubPriority(#[from] InvalidSubPriority),
    #[error("uid ranges {0} overlap each other")]
    OverlappingUidRanges(UidRanges),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] InvalidArgument),

    #[error("socket diagnostics unavailable for netId {net_id}: {errno}")]
    ResourceUnavailable { net_id: NetId, errno: Errno },

    #[error("failed to {operation} {interface} on netId {net_id}: {errno}")]
    Collaborator {
        operation: Operation,
        net_id: NetId,
        interface: InterfaceName,
        #[source]
        errno: Errno,
    },
}

impl NetworkError {
    pub(crate) fn collaborator(
        operation: Operation,
        net_id: NetId,
        interface: &InterfaceName,
        errno: Errno,
    ) -> Self {
        Self::Collaborator {
            operation,
            net_id,
            interface: interface.clone(),
            errno,
        }
    }

    /// The error code a command handler should report for this failure.
    #[must_use]
    pub fn errno(&self) -> Errno {
        match self {
            NetworkError::InvalidArgument(_) => Errno::EINVAL,
            NetworkError::ResourceUnavailable { .. } => Errno::EBADFD,
            NetworkError::Collaborator { errno, .. } => *errno,
        }
    }
}
