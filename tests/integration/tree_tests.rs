//! Address tree: registration rules, resolution and the address inverse.

use std::sync::Arc;

use oscdev::osc::types::Argument;
use oscdev::tree::{AddressTree, TreeBuilder, getter, handler};
use oscdev::{Error, TreeError};

/// `/analogin/{0..7}/value`, `/analogin/{0..7}/gain`, `/led/state`.
fn board_tree() -> AddressTree {
    let mut b = TreeBuilder::new();
    b.register(
        &["analogin", "value"],
        Some(8),
        handler(|index, _| index.map(|i| Argument::Int32(i * 10))),
        Some(getter(|i| Some(Argument::Int32(i as i32)))),
    )
    .unwrap();
    b.register(&["analogin", "gain"], None, handler(|_, _| Some(Argument::Int32(-1))), None)
        .unwrap();
    b.register(&["led", "state"], None, handler(|_, _| Some(Argument::Int32(0))), None)
        .unwrap();
    b.build()
}

#[test]
fn resolves_ranged_leaf_with_index() {
    let tree = board_tree();
    let target = tree.resolve("/analogin/5/value").unwrap();
    assert_eq!(target.index, Some(5));
    assert_eq!(target.invoke(&[]), Some(Argument::Int32(50)));
    assert_eq!(Some(target.node), tree.find(&["analogin", "value"]));
}

#[test]
fn sibling_under_same_range_shares_index() {
    let tree = board_tree();
    assert_eq!(tree.resolve("/analogin/7/gain").unwrap().index, Some(7));
}

#[test]
fn index_at_range_is_out_of_range() {
    let tree = board_tree();
    assert_eq!(
        tree.resolve("/analogin/8/value").err(),
        Some(Error::IndexOutOfRange { index: 8, range: 8 })
    );
}

#[test]
fn huge_index_saturates_into_out_of_range() {
    let tree = board_tree();
    assert_eq!(
        tree.resolve("/analogin/99999999999/value").err(),
        Some(Error::IndexOutOfRange {
            index: u32::MAX,
            range: 8
        })
    );
}

#[test]
fn unknown_names_and_bad_shapes_are_not_found() {
    let tree = board_tree();
    for address in [
        "/analogin/5/bogus",
        "/analogin/value",
        "/analogin/-1/value",
        "/analogin/+5/value",
        "/analogin/5",
        "/analogin",
        "/led",
        "/led/state/extra",
        "/led//state",
        "led/state",
        "/",
    ] {
        assert_eq!(tree.resolve(address).err(), Some(Error::NotFound), "{address}");
    }
}

#[test]
fn unranged_leaf_has_no_index() {
    let tree = board_tree();
    assert_eq!(tree.resolve("/led/state").unwrap().index, None);
}

#[test]
fn build_address_inverts_resolve() {
    let tree = board_tree();
    let value = tree.find(&["analogin", "value"]).unwrap();
    for i in 0..8 {
        let address = tree.build_address(value, Some(i)).unwrap();
        assert_eq!(address, format!("/analogin/{i}/value"));
        let target = tree.resolve(&address).unwrap();
        assert_eq!((target.node, target.index), (value, Some(i as i32)));
    }

    let led = tree.find(&["led", "state"]).unwrap();
    assert_eq!(tree.build_address(led, None).unwrap(), "/led/state");
}

#[test]
fn build_address_checks_index_shape() {
    let tree = board_tree();
    let value = tree.find(&["analogin", "value"]).unwrap();
    let led = tree.find(&["led", "state"]).unwrap();
    assert_eq!(
        tree.build_address(value, Some(8)).err(),
        Some(Error::IndexOutOfRange { index: 8, range: 8 })
    );
    assert_eq!(tree.build_address(value, None).err(), Some(Error::NotFound));
    assert_eq!(tree.build_address(led, Some(0)).err(), Some(Error::NotFound));
}

#[test]
fn registration_rules() {
    let noop = || handler(|_, _| None);
    let mut b = TreeBuilder::new();
    b.register(&["analogin", "value"], Some(8), noop(), None).unwrap();

    assert_eq!(b.register(&[], None, noop(), None).err(), Some(TreeError::EmptyPath));
    assert_eq!(
        b.register(&["analogin", "value"], None, noop(), None).err(),
        Some(TreeError::DuplicateName)
    );
    assert_eq!(
        b.register(&["analogin", "other"], Some(4), noop(), None).err(),
        Some(TreeError::RangeConflict)
    );
    assert_eq!(
        b.register(&["analogin", "value", "deeper"], None, noop(), None).err(),
        Some(TreeError::NotAContainer)
    );
    assert_eq!(
        b.register(&["servo", "position"], Some(0), noop(), None).err(),
        Some(TreeError::ZeroRange)
    );
    assert_eq!(
        b.register(&["servo", "position"], Some(i32::MAX as u32 + 1), noop(), None).err(),
        Some(TreeError::RangeTooLarge)
    );
    assert_eq!(
        b.register(&["analogin", "bank", "x"], Some(2), noop(), None).err(),
        Some(TreeError::NestedRange)
    );
    assert_eq!(b.register(&["top"], Some(2), noop(), None).err(), Some(TreeError::RangeConflict));
}

#[test]
fn getter_needs_narrow_range() {
    let mut b = TreeBuilder::new();
    let read = || Some(getter(|_| None));
    assert_eq!(
        b.register(&["led", "state"], None, handler(|_, _| None), read()).err(),
        Some(TreeError::NotAutosendCapable)
    );
    assert_eq!(
        b.register(&["wide", "value"], Some(33), handler(|_, _| None), read()).err(),
        Some(TreeError::NotAutosendCapable)
    );
    assert!(
        b.register(&["narrow", "value"], Some(32), handler(|_, _| None), read())
            .is_ok()
    );
}

#[test]
fn frozen_tree_resolves_from_many_threads() {
    let tree = Arc::new(board_tree());
    let workers: Vec<_> = (0..4)
        .map(|t| {
            let tree = tree.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    let channel = (i + t) % 8;
                    let target = tree.resolve(&format!("/analogin/{channel}/value")).unwrap();
                    assert_eq!(target.index, Some(channel));
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
}

#[test]
fn widest_range_keeps_indices_positive() {
    let noop = || handler(|_, _| None);
    let mut b = TreeBuilder::new();
    b.register(&["wide", "v"], Some(i32::MAX as u32), noop(), None).unwrap();
    assert_eq!(
        b.register(&["huge", "v"], Some(u32::MAX), noop(), None).err(),
        Some(TreeError::RangeTooLarge)
    );
    let tree = b.build();
    assert_eq!(tree.resolve("/wide/2147483646/v").unwrap().index, Some(i32::MAX - 1));
    assert!(tree.resolve("/wide/2147483647/v").is_err());
}
