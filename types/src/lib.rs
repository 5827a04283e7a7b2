//! Core domain types for physnet.
//!
//! Pure value types with no IO: permissions, identifiers, interface names, UID ranges and the
//! resolved settings the manager runs with. Everything here can be used from any layer.

mod ids;
mod interface;
mod permission;
mod settings;
mod uid;

pub use ids::NetId;
pub use interface::{IFNAMSIZ, InterfaceName, InterfaceNameError};
pub use permission::{InvalidPermissionBits, Permission, UnknownPermission};
pub use settings::{
    DEFAULT_THROW_ROUTE_PRIORITY, LogFilter, LoopbackSockets, ManagerSettings, SettingsError,
};
pub use uid::{
    InvalidSubPriority, InvalidUidRange, SubPriority, UidRange, UidRangeMap, UidRanges,
    is_valid_sub_priority,
};

/// Whether a network may receive global default-route treatment.
///
/// Local networks use a distinct kernel-table variant and never act as the default network.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NetworkScope {
    #[default]
    Global,
    Local,
}

impl NetworkScope {
    #[must_use]
    pub const fn is_local(self) -> bool {
        matches!(self, NetworkScope::Local)
    }
}

impl From<bool> for NetworkScope {
    fn from(local: bool) -> Self {
        if local {
            NetworkScope::Local
        } else {
            NetworkScope::Global
        }
    }
}
