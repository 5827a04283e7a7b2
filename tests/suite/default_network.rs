//! Default-network membership and fallthrough registration.

use physnet_core::{Call, CallKind, Errno, NetworkError, Operation};
use physnet_types::{NetworkScope, Permission};

use crate::common::{Harness, NET_ID, iface};

#[test]
fn add_as_default_registers_every_interface() {
    let mut h = Harness::new().with_interfaces(&["eth0", "wlan0"]);

    h.network.add_as_default().unwrap();

    assert!(h.network.is_default());
    assert_eq!(
        h.kernel.calls(),
        [
            Call::AddToDefaultNetwork {
                interface: iface("eth0"),
                permission: Permission::None,
            },
            Call::AddFallthrough {
                interface: iface("eth0"),
                permission: Permission::None,
            },
            Call::AddToDefaultNetwork {
                interface: iface("wlan0"),
                permission: Permission::None,
            },
            Call::AddFallthrough {
                interface: iface("wlan0"),
                permission: Permission::None,
            },
        ]
    );
}

#[test]
fn add_as_default_twice_is_a_noop() {
    let mut h = Harness::new().with_interfaces(&["eth0"]).as_default();
    h.network.add_as_default().unwrap();
    assert!(h.kernel.calls().is_empty());
    assert!(h.network.is_default());
}

#[test]
fn remove_as_default_when_not_default_is_a_noop() {
    let mut h = Harness::new().with_interfaces(&["eth0"]);
    h.network.remove_as_default().unwrap();
    assert!(h.kernel.calls().is_empty());
    assert!(!h.network.is_default());
}

#[test]
fn toggling_is_symmetric() {
    let mut h = Harness::new()
        .with_interfaces(&["eth0"])
        .with_permission(Permission::Network);

    h.network.add_as_default().unwrap();
    h.network.remove_as_default().unwrap();

    assert!(!h.network.is_default());
    assert_eq!(
        h.kinds(),
        [
            CallKind::AddToDefaultNetwork,
            CallKind::AddFallthrough,
            CallKind::RemoveFromDefaultNetwork,
            CallKind::RemoveFallthrough,
        ]
    );
    assert!(h.kernel.calls().iter().all(|call| match call {
        Call::AddToDefaultNetwork { permission, .. }
        | Call::AddFallthrough { permission, .. }
        | Call::RemoveFromDefaultNetwork { permission, .. }
        | Call::RemoveFallthrough { permission, .. } => *permission == Permission::Network,
        _ => false,
    }));
}

#[test]
fn default_flag_flips_on_empty_network() {
    let mut h = Harness::new();
    h.network.add_as_default().unwrap();
    assert!(h.network.is_default());
    h.network.remove_as_default().unwrap();
    assert!(!h.network.is_default());
    assert!(h.kernel.calls().is_empty());
}

#[test]
fn routing_failure_skips_fallthrough_and_keeps_flag() {
    let mut h = Harness::new().with_interfaces(&["eth0", "wlan0"]);
    h.kernel.fail_on(
        CallKind::AddToDefaultNetwork,
        &iface("wlan0"),
        Errno::ENOBUFS,
    );

    let err = h.network.add_as_default().unwrap_err();

    assert_eq!(
        err,
        NetworkError::Collaborator {
            operation: Operation::AddToDefaultNetwork,
            net_id: NET_ID,
            interface: iface("wlan0"),
            errno: Errno::ENOBUFS,
        }
    );
    assert!(!h.network.is_default());
    // eth0 stays registered; the caller reconciles.
    assert_eq!(
        h.kinds(),
        [
            CallKind::AddToDefaultNetwork,
            CallKind::AddFallthrough,
            CallKind::AddToDefaultNetwork,
        ]
    );
}

#[test]
fn delegate_failure_on_remove_keeps_flag() {
    let mut h = Harness::new().with_interfaces(&["eth0"]).as_default();
    h.kernel.fail(CallKind::RemoveFallthrough, Errno::EINVAL);

    let err = h.network.remove_as_default().unwrap_err();

    assert!(matches!(
        err,
        NetworkError::Collaborator {
            operation: Operation::RemoveFallthrough,
            ..
        }
    ));
    assert_eq!(err.errno(), Errno::EINVAL);
    assert!(h.network.is_default());
}

#[test]
fn interface_added_to_default_network_joins_fallthrough() {
    let mut h = Harness::new().with_interfaces(&["eth0"]).as_default();

    h.network.add_interface(&iface("rmnet0")).unwrap();

    assert_eq!(
        h.kinds(),
        [
            CallKind::AddInterface,
            CallKind::AddToDefaultNetwork,
            CallKind::AddFallthrough,
        ]
    );
    assert!(h.network.has_interface(&iface("rmnet0")));
}

#[test]
fn interface_removed_from_default_network_leaves_fallthrough_first() {
    let mut h = Harness::new().with_interfaces(&["eth0"]).as_default();

    h.network.remove_interface(&iface("eth0")).unwrap();

    assert_eq!(
        h.kinds(),
        [
            CallKind::RemoveFromDefaultNetwork,
            CallKind::RemoveFallthrough,
            CallKind::RemoveInterface,
        ]
    );
    assert!(h.network.is_default());
    assert_eq!(h.network.interfaces().len(), 0);
}

#[test]
fn local_network_keeps_its_scope_through_default_changes() {
    let mut h = Harness::local().with_interfaces(&["eth0"]);
    h.network.add_as_default().unwrap();

    assert_eq!(h.network.scope(), NetworkScope::Local);
    assert!(h.network.is_local());
    assert!(h.network.to_string().contains(" local"));
    assert!(h.network.to_string().contains(" default"));
}
