//! Permission transitions across attached interfaces.

use physnet_core::{Call, CallKind, Errno, NetworkError, Operation, RouteSpec};
use physnet_types::{LoopbackSockets, ManagerSettings, NetworkScope, Permission};

use crate::common::{Harness, NET_ID, iface};

fn throw_pair(name: &str, destination: &str, priority: u32) -> [Call; 2] {
    let route = RouteSpec::throw(destination.parse().unwrap(), priority);
    [
        Call::AddRoute {
            interface: iface(name),
            route,
        },
        Call::RemoveRoute {
            interface: iface(name),
            route,
        },
    ]
}

fn modify(name: &str, from: Permission, to: Permission) -> Call {
    Call::ModifyPermission {
        net_id: NET_ID,
        interface: iface(name),
        from,
        to,
        scope: NetworkScope::Global,
    }
}

fn destroy(permission: Permission) -> Call {
    Call::DestroySockets {
        net_id: NET_ID,
        permission,
        exclude_loopback: true,
    }
}

#[test]
fn same_permission_is_a_noop() {
    let mut h = Harness::new().with_interfaces(&["eth0"]);
    h.network.set_permission(Permission::None).unwrap();
    assert!(h.kernel.calls().is_empty());
    assert_eq!(h.network.permission(), Permission::None);
}

#[test]
fn empty_network_updates_without_kernel_work() {
    let mut h = Harness::new();
    h.network.set_permission(Permission::System).unwrap();
    assert_eq!(h.network.permission(), Permission::System);
    assert!(h.kernel.calls().is_empty());
}

#[test]
fn upgrade_on_two_interfaces_follows_full_sequence() {
    let mut h = Harness::new().with_interfaces(&["eth0"]);

    h.network.add_interface(&iface("wlan0")).unwrap();
    assert_eq!(h.interface_names(), ["eth0", "wlan0"]);
    assert_eq!(h.kinds(), [CallKind::AddInterface]);
    assert!(matches!(
        &h.kernel.take_calls()[0],
        Call::AddInterface { permission: Permission::None, .. }
    ));

    h.network.set_permission(Permission::System).unwrap();

    let mut expected = vec![Call::OpenSockDiag, destroy(Permission::System)];
    for name in ["eth0", "wlan0"] {
        expected.push(modify(name, Permission::None, Permission::System));
        expected.extend(throw_pair(name, "0.0.0.0/0", 100_000));
        expected.extend(throw_pair(name, "::/0", 100_000));
    }
    expected.push(destroy(Permission::System));

    assert_eq!(h.kernel.calls(), expected);
    assert_eq!(h.kernel.count(CallKind::OpenSockDiag), 1);
    assert_eq!(h.kernel.count(CallKind::AddFallthrough), 0);
    assert_eq!(h.kernel.count(CallKind::RemoveFallthrough), 0);
    assert_eq!(h.network.permission(), Permission::System);
}

#[test]
fn sockets_are_destroyed_before_and_after_table_update() {
    let mut h = Harness::new().with_interfaces(&["eth0"]);
    h.network.set_permission(Permission::Network).unwrap();

    let kinds = h.kinds();
    let destroys: Vec<usize> = kinds
        .iter()
        .enumerate()
        .filter(|(_, kind)| **kind == CallKind::DestroySockets)
        .map(|(i, _)| i)
        .collect();
    let modify_at = kinds
        .iter()
        .position(|kind| *kind == CallKind::ModifyPermission)
        .unwrap();
    assert_eq!(destroys.len(), 2);
    assert!(destroys[0] < modify_at);
    assert!(destroys[1] > modify_at);
}

#[test]
fn downgrade_to_none_skips_socket_diagnostics() {
    let mut h = Harness::new()
        .with_interfaces(&["eth0"])
        .with_permission(Permission::System);

    h.network.set_permission(Permission::None).unwrap();

    assert_eq!(h.kernel.count(CallKind::OpenSockDiag), 0);
    assert_eq!(h.kernel.count(CallKind::DestroySockets), 0);
    assert_eq!(h.kernel.calls()[0], modify("eth0", Permission::System, Permission::None));
    assert_eq!(h.network.permission(), Permission::None);
}

#[test]
fn unavailable_diagnostics_aborts_before_any_table_change() {
    let mut h = Harness::new().with_interfaces(&["eth0"]);
    h.kernel.fail(CallKind::OpenSockDiag, Errno::ENOENT);

    let err = h.network.set_permission(Permission::System).unwrap_err();

    assert!(matches!(err, NetworkError::ResourceUnavailable { .. }));
    assert_eq!(err.errno(), Errno::EBADFD);
    assert_eq!(h.kinds(), [CallKind::OpenSockDiag]);
    assert_eq!(h.network.permission(), Permission::None);
}

#[test]
fn socket_destruction_failure_is_not_fatal() {
    let mut h = Harness::new().with_interfaces(&["eth0"]);
    h.kernel.fail(CallKind::DestroySockets, Errno::ENOMEM);

    h.network.set_permission(Permission::System).unwrap();

    assert_eq!(h.kernel.count(CallKind::DestroySockets), 2);
    assert_eq!(h.network.permission(), Permission::System);
}

#[test]
fn modify_failure_stops_loop_and_keeps_old_permission() {
    let mut h = Harness::new().with_interfaces(&["eth0", "usb0", "wlan0"]);
    h.kernel
        .fail_on(CallKind::ModifyPermission, &iface("usb0"), Errno::ENODEV);

    let err = h.network.set_permission(Permission::Network).unwrap_err();

    assert_eq!(
        err,
        NetworkError::Collaborator {
            operation: Operation::ModifyPermission,
            net_id: NET_ID,
            interface: iface("usb0"),
            errno: Errno::ENODEV,
        }
    );
    // eth0 was already switched and stays switched; wlan0 was never touched.
    let modified: Vec<String> = h
        .kernel
        .calls()
        .iter()
        .filter(|call| call.kind() == CallKind::ModifyPermission)
        .filter_map(|call| call.interface().map(ToString::to_string))
        .collect();
    assert_eq!(modified, ["eth0", "usb0"]);
    assert_eq!(h.kernel.count(CallKind::DestroySockets), 1);
    assert_eq!(h.network.permission(), Permission::None);
}

#[test]
fn route_cache_invalidation_failures_are_ignored() {
    let mut h = Harness::new().with_interfaces(&["eth0"]);
    h.kernel.fail(CallKind::AddRoute, Errno::EEXIST);
    h.kernel.fail(CallKind::RemoveRoute, Errno::ENOENT);

    h.network.set_permission(Permission::System).unwrap();

    assert_eq!(h.kernel.count(CallKind::AddRoute), 2);
    assert_eq!(h.kernel.count(CallKind::RemoveRoute), 2);
    assert_eq!(h.network.permission(), Permission::System);
}

#[test]
fn default_network_reregisters_fallthrough_add_before_remove() {
    let mut h = Harness::new()
        .with_interfaces(&["eth0", "wlan0"])
        .as_default();

    h.network.set_permission(Permission::Network).unwrap();

    let fallthrough: Vec<Call> = h
        .kernel
        .calls()
        .into_iter()
        .filter(|call| {
            matches!(
                call.kind(),
                CallKind::AddToDefaultNetwork
                    | CallKind::AddFallthrough
                    | CallKind::RemoveFromDefaultNetwork
                    | CallKind::RemoveFallthrough
            )
        })
        .collect();

    let mut expected = Vec::new();
    for name in ["eth0", "wlan0"] {
        expected.push(Call::AddToDefaultNetwork {
            interface: iface(name),
            permission: Permission::Network,
        });
        expected.push(Call::AddFallthrough {
            interface: iface(name),
            permission: Permission::Network,
        });
        expected.push(Call::RemoveFromDefaultNetwork {
            interface: iface(name),
            permission: Permission::None,
        });
        expected.push(Call::RemoveFallthrough {
            interface: iface(name),
            permission: Permission::None,
        });
    }
    assert_eq!(fallthrough, expected);

    // The fallthrough swap happens after every table update and before the second sweep.
    let kinds = h.kinds();
    let last_modify = kinds
        .iter()
        .rposition(|kind| *kind == CallKind::ModifyPermission)
        .unwrap();
    let first_fallthrough = kinds
        .iter()
        .position(|kind| *kind == CallKind::AddToDefaultNetwork)
        .unwrap();
    assert!(last_modify < first_fallthrough);
    assert_eq!(kinds.last(), Some(&CallKind::DestroySockets));
}

#[test]
fn fallthrough_failure_leaves_permission_unchanged() {
    let mut h = Harness::new().with_interfaces(&["eth0"]).as_default();
    h.kernel.fail(CallKind::AddFallthrough, Errno::ENOBUFS);

    let err = h.network.set_permission(Permission::System).unwrap_err();

    assert_eq!(err.errno(), Errno::ENOBUFS);
    assert_eq!(h.network.permission(), Permission::None);
    // The table update already happened and is not rolled back.
    assert_eq!(h.kernel.count(CallKind::ModifyPermission), 1);
    assert_eq!(h.kernel.count(CallKind::DestroySockets), 1);
}

#[test]
fn new_permission_is_used_by_later_calls() {
    let mut h = Harness::new()
        .with_interfaces(&["eth0"])
        .with_permission(Permission::System);

    h.network.add_interface(&iface("wlan0")).unwrap();
    h.network.add_as_default().unwrap();

    for call in h.kernel.calls() {
        match call {
            Call::AddInterface { permission, .. }
            | Call::AddToDefaultNetwork { permission, .. }
            | Call::AddFallthrough { permission, .. } => {
                assert_eq!(permission, Permission::System);
            }
            other => panic!("unexpected call {other}"),
        }
    }
    assert_eq!(h.kernel.count(CallKind::AddFallthrough), 2);
}

#[test]
fn settings_flow_into_collaborator_calls() {
    let settings = ManagerSettings::new(4242, LoopbackSockets::Destroy).unwrap();
    let mut h = Harness::with_settings(settings).with_interfaces(&["eth0"]);

    h.network.set_permission(Permission::System).unwrap();

    let calls = h.kernel.calls();
    assert!(calls.contains(&Call::DestroySockets {
        net_id: NET_ID,
        permission: Permission::System,
        exclude_loopback: false,
    }));
    assert!(calls.iter().all(|call| match call {
        Call::AddRoute { route, .. } | Call::RemoveRoute { route, .. } => route.priority == 4242,
        _ => true,
    }));
}

#[test]
fn local_network_passes_local_scope() {
    let mut h = Harness::local().with_interfaces(&["eth0"]);
    h.network.set_permission(Permission::Network).unwrap();
    assert!(h.kernel.calls().contains(&Call::ModifyPermission {
        net_id: NET_ID,
        interface: iface("eth0"),
        from: Permission::None,
        to: Permission::Network,
        scope: NetworkScope::Local,
    }));
}
