use physnet_types::{InterfaceName, Permission};

use crate::error::Errno;

/// Side effects of default-network membership that belong to the owning registry.
///
/// Called whenever an interface joins or leaves default-route fallthrough.
pub trait FallthroughDelegate: Send + Sync {
    fn add_fallthrough(
        &self,
        interface: &InterfaceName,
        permission: Permission,
    ) -> Result<(), Errno>;

    fn remove_fallthrough(
        &self,
        interface: &InterfaceName,
        permission: Permission,
    ) -> Result<(), Errno>;
}
