//! UID-range routing through the network.

use physnet_core::{Call, CallKind, Errno, InvalidArgument, NetworkError, Operation};
use physnet_types::{InvalidSubPriority, NetworkScope, Permission, SubPriority, UidRangeMap};

use crate::common::{Harness, NET_ID, iface, ranges};

fn sub(value: i32) -> SubPriority {
    SubPriority::new(value).unwrap()
}

#[test]
fn add_then_remove_round_trips_the_map() {
    let mut h = Harness::new().with_interfaces(&["eth0"]);
    let uids = ranges(&[(1000, 1999)]);

    h.network.add_users(&uids, 10).unwrap();

    assert_eq!(
        h.kernel.take_calls(),
        [Call::AddUsers {
            net_id: NET_ID,
            interface: iface("eth0"),
            rules: UidRangeMap::single(sub(10), uids.clone()),
            scope: NetworkScope::Global,
        }]
    );
    assert_eq!(h.network.uid_range_map().get(sub(10)), Some(&uids));
    assert_eq!(h.network.applies_to_user(1500), Some(sub(10)));

    h.network.remove_users(&uids, 10).unwrap();

    assert_eq!(h.kinds(), [CallKind::RemoveUsers]);
    assert!(h.network.uid_range_map().is_empty());
    assert_eq!(h.network.applies_to_user(1500), None);
}

#[test]
fn invalid_sub_priority_is_rejected_before_any_call() {
    let mut h = Harness::new().with_interfaces(&["eth0"]);
    let uids = ranges(&[(1000, 1999)]);

    for value in [-1, 1000, i32::MIN, i32::MAX] {
        let err = h.network.add_users(&uids, value).unwrap_err();
        assert_eq!(
            err,
            NetworkError::InvalidArgument(InvalidArgument::SubPriority(InvalidSubPriority(value)))
        );
        assert_eq!(err.errno(), Errno::EINVAL);

        let err = h.network.remove_users(&uids, value).unwrap_err();
        assert_eq!(err.errno(), Errno::EINVAL);
    }

    assert!(h.kernel.calls().is_empty());
    assert!(h.network.uid_range_map().is_empty());
}

#[test]
fn boundary_sub_priorities_are_accepted() {
    let mut h = Harness::new().with_interfaces(&["eth0"]);

    h.network.add_users(&ranges(&[(1, 1)]), 0).unwrap();
    h.network.add_users(&ranges(&[(2, 2)]), 998).unwrap();
    h.network.add_users(&ranges(&[(3, 3)]), 999).unwrap();

    let keys: Vec<i32> = h
        .network
        .uid_range_map()
        .iter()
        .map(|(sub_priority, _)| sub_priority.value())
        .collect();
    assert_eq!(keys, [0, 998, 999]);
    assert!(h.network.applies_to_user(3).unwrap().is_no_default());
}

#[test]
fn self_overlapping_ranges_are_rejected() {
    let mut h = Harness::new().with_interfaces(&["eth0"]);
    let uids = ranges(&[(1000, 1999), (1500, 2500)]);

    let err = h.network.add_users(&uids, 10).unwrap_err();

    assert_eq!(
        err,
        NetworkError::InvalidArgument(InvalidArgument::OverlappingUidRanges(uids))
    );
    assert_eq!(err.errno(), Errno::EINVAL);
    assert!(h.kernel.calls().is_empty());
    assert!(h.network.uid_range_map().is_empty());
}

#[test]
fn adjacent_ranges_do_not_overlap() {
    let mut h = Harness::new();
    h.network
        .add_users(&ranges(&[(1000, 1999), (2000, 2999)]), 10)
        .unwrap();
    assert_eq!(
        h.network.uid_range_map().to_string(),
        "[10: {1000-1999 2000-2999}]"
    );
}

#[test]
fn empty_network_only_updates_the_map() {
    let mut h = Harness::new();
    h.network.add_users(&ranges(&[(5000, 5999)]), 20).unwrap();
    assert!(h.kernel.calls().is_empty());
    assert_eq!(h.network.applies_to_user(5000), Some(sub(20)));
}

#[test]
fn interface_failure_leaves_map_unchanged() {
    let mut h = Harness::new().with_interfaces(&["eth0", "wlan0"]);
    h.kernel
        .fail_on(CallKind::AddUsers, &iface("wlan0"), Errno::ENOMEM);

    let err = h.network.add_users(&ranges(&[(1000, 1999)]), 10).unwrap_err();

    assert_eq!(
        err,
        NetworkError::Collaborator {
            operation: Operation::AddUsers,
            net_id: NET_ID,
            interface: iface("wlan0"),
            errno: Errno::ENOMEM,
        }
    );
    assert_eq!(h.kernel.count(CallKind::AddUsers), 2);
    assert!(h.network.uid_range_map().is_empty());
}

#[test]
fn remove_failure_keeps_ranges() {
    let mut h = Harness::new().with_interfaces(&["eth0"]);
    let uids = ranges(&[(1000, 1999)]);
    h.network.add_users(&uids, 10).unwrap();
    h.kernel.fail(CallKind::RemoveUsers, Errno::ENOENT);

    let err = h.network.remove_users(&uids, 10).unwrap_err();

    assert_eq!(err.errno(), Errno::ENOENT);
    assert_eq!(h.network.uid_range_map().get(sub(10)), Some(&uids));
}

#[test]
fn removal_at_another_sub_priority_leaves_map_alone() {
    let mut h = Harness::new().with_interfaces(&["eth0"]);
    let uids = ranges(&[(1000, 1999)]);
    h.network.add_users(&uids, 10).unwrap();

    h.network.remove_users(&uids, 11).unwrap();

    assert_eq!(h.network.uid_range_map().get(sub(10)), Some(&uids));
    assert_eq!(h.network.uid_range_map().len(), 1);
}

#[test]
fn lowest_sub_priority_wins_lookup() {
    let mut h = Harness::new();
    h.network.add_users(&ranges(&[(0, 9999)]), 500).unwrap();
    h.network.add_users(&ranges(&[(1000, 1999)]), 5).unwrap();

    assert_eq!(h.network.applies_to_user(1200), Some(sub(5)));
    assert_eq!(h.network.applies_to_user(3000), Some(sub(500)));
    assert_eq!(h.network.applies_to_user(10_000), None);
}

#[test]
fn new_interfaces_inherit_the_uid_map() {
    let mut h = Harness::local();
    let uids = ranges(&[(1000, 1999)]);
    h.network.add_users(&uids, 10).unwrap();

    h.network.add_interface(&iface("tun0")).unwrap();

    assert_eq!(
        h.kernel.calls(),
        [Call::AddInterface {
            net_id: NET_ID,
            interface: iface("tun0"),
            permission: Permission::None,
            uid_range_map: UidRangeMap::single(sub(10), uids),
            scope: NetworkScope::Local,
        }]
    );
}

#[test]
fn rules_name_only_the_requested_sub_priority() {
    let mut h = Harness::new().with_interfaces(&["eth0"]);
    h.network.add_users(&ranges(&[(1, 99)]), 1).unwrap();
    h.kernel.take_calls();

    h.network.add_users(&ranges(&[(100, 199)]), 2).unwrap();

    match &h.kernel.calls()[0] {
        Call::AddUsers { rules, .. } => {
            assert_eq!(rules.len(), 1);
            assert_eq!(rules.get(sub(2)), Some(&ranges(&[(100, 199)])));
        }
        other => panic!("unexpected call {other}"),
    }
    assert_eq!(h.network.uid_range_map().len(), 2);
}
