//! Autosend: subscriptions through the tree, change detection, mask
//! persistence and the interval control.

use std::sync::{Arc, Mutex};

use oscdev::Error;
use oscdev::app::ports::{ConfigPort, SharedStore, StorageError, share_store};
use oscdev::autosend::{AUTOSEND_NAMESPACE, AutosendState, Autosender, MASK_SENTINEL};
use oscdev::config::{CONFIG_NAMESPACE, ProtocolConfig};
use oscdev::osc::codec::{decode, encode_message};
use oscdev::osc::engine::{Dispatcher, ERROR_ADDRESS};
use oscdev::osc::types::{Argument, Message};
use oscdev::tree::{NodeId, TreeBuilder, getter, handler};

use crate::mock_store::{BrokenStore, RecordingStore};

struct Rig {
    dispatcher: Dispatcher,
    autosender: Autosender,
    leaf: NodeId,
    /// Per-channel level; `None` means the conversion is not ready.
    levels: Arc<Mutex<[Option<i32>; 8]>>,
}

impl Rig {
    fn new(store: SharedStore) -> Self {
        let levels = Arc::new(Mutex::new([Some(0); 8]));
        let read = levels.clone();
        let sample = levels.clone();
        let state = AutosendState::new(store, 10);
        let mut b = TreeBuilder::new();
        let leaf = b
            .register(
                &["analogin", "value"],
                Some(8),
                handler(move |i, _| read.lock().unwrap()[i? as usize].map(Argument::Int32)),
                Some(getter(move |i| sample.lock().unwrap()[i as usize].map(Argument::Int32))),
            )
            .unwrap();
        state.attach(&mut b, leaf).unwrap();
        state
            .attach_interval_control(&mut b, &["system", "autosend-interval"])
            .unwrap();
        let tree = Arc::new(b.build());
        Self {
            dispatcher: Dispatcher::new(tree.clone(), &ProtocolConfig::default()),
            autosender: Autosender::new(tree, state),
            leaf,
            levels,
        }
    }

    fn set(&self, channel: usize, level: Option<i32>) {
        self.levels.lock().unwrap()[channel] = level;
    }

    fn send(&self, msg: Message) -> Vec<Message> {
        self.dispatcher
            .handle_inbound(&encode_message(&msg))
            .map(|p| decode(&p).unwrap())
            .unwrap_or_default()
    }

    fn state(&self) -> &AutosendState {
        self.autosender.state()
    }
}

fn value(channel: u32, v: i32) -> Message {
    Message::new(format!("/analogin/{channel}/value"), vec![Argument::Int32(v)])
}

#[test]
fn never_written_store_means_nothing_subscribed() {
    let store = RecordingStore::new();
    let rig = Rig::new(share_store(store.clone()));
    assert_eq!(rig.state().mask(rig.leaf), Some(0));
    for ch in 0..8 {
        assert!(!rig.state().is_subscribed(rig.leaf, ch));
    }
    assert!(rig.autosender.tick().is_empty());
    assert_eq!(store.write_count(AUTOSEND_NAMESPACE), 0);
}

#[test]
fn unchanged_value_is_not_republished() {
    let rig = Rig::new(share_store(RecordingStore::new()));
    rig.state().set_subscribed(rig.leaf, 3, true).unwrap();
    rig.state().seed_last_value(rig.leaf, 3, Argument::Int32(100));

    rig.set(3, Some(100));
    assert!(rig.autosender.tick().is_empty());

    rig.set(3, Some(101));
    assert_eq!(rig.autosender.tick(), vec![value(3, 101)]);
    assert_eq!(rig.state().last_value(rig.leaf, 3), Some(Argument::Int32(101)));
    assert!(rig.autosender.tick().is_empty());
}

#[test]
fn subscribing_over_the_wire_publishes_on_next_tick() {
    let rig = Rig::new(share_store(RecordingStore::new()));
    rig.set(2, Some(7));
    rig.set(6, Some(9));

    assert!(rig.send(Message::query("/analogin/6/autosend").with_arg(1)).is_empty());
    assert!(rig.send(Message::query("/analogin/2/autosend").with_arg(1)).is_empty());
    assert_eq!(
        rig.send(Message::query("/analogin/2/autosend")),
        vec![Message::new("/analogin/2/autosend", vec![Argument::Int32(1)])]
    );
    assert_eq!(rig.send(Message::query("/analogin/4/autosend"))[0].args, vec![Argument::Int32(0)]);

    // Index order within a source.
    assert_eq!(rig.autosender.tick(), vec![value(2, 7), value(6, 9)]);
    let packet = rig.autosender.tick_packet();
    assert!(packet.is_none());
}

#[test]
fn resubscribe_republishes_current_value() {
    let rig = Rig::new(share_store(RecordingStore::new()));
    rig.set(1, Some(5));
    rig.state().set_subscribed(rig.leaf, 1, true).unwrap();
    assert_eq!(rig.autosender.tick(), vec![value(1, 5)]);

    rig.send(Message::query("/analogin/1/autosend").with_arg(0));
    assert!(rig.autosender.tick().is_empty());
    rig.send(Message::query("/analogin/1/autosend").with_arg(1));
    assert_eq!(rig.autosender.tick(), vec![value(1, 5)]);
}

#[test]
fn getter_not_ready_is_skipped_for_the_tick() {
    let rig = Rig::new(share_store(RecordingStore::new()));
    rig.state().set_subscribed(rig.leaf, 0, true).unwrap();
    rig.state().set_subscribed(rig.leaf, 1, true).unwrap();
    rig.set(0, None);
    rig.set(1, Some(11));

    assert_eq!(rig.autosender.tick(), vec![value(1, 11)]);
    assert_eq!(rig.state().last_value(rig.leaf, 0), None);

    rig.set(0, Some(3));
    assert_eq!(rig.autosender.tick(), vec![value(0, 3)]);
}

#[test]
fn mask_survives_a_restart() {
    let store = RecordingStore::new();
    {
        let rig = Rig::new(share_store(store.clone()));
        rig.send(Message::query("/analogin/0/autosend").with_arg(1));
        rig.send(Message::query("/analogin/7/autosend").with_arg(1));
        rig.send(Message::query("/analogin/7/autosend").with_arg(1));
    }
    assert_eq!(
        store.get(AUTOSEND_NAMESPACE, "analogin/value"),
        Some(vec![MASK_SENTINEL, 0b1000_0001])
    );
    assert_eq!(store.write_count(AUTOSEND_NAMESPACE), 2, "no write when nothing changed");

    let rig = Rig::new(share_store(store));
    assert_eq!(rig.state().mask(rig.leaf), Some(0b1000_0001));
    // Last values are not persisted: everything subscribed goes out once.
    assert_eq!(rig.autosender.tick(), vec![value(0, 0), value(7, 0)]);
}

#[test]
fn record_without_sentinel_is_ignored() {
    let store = RecordingStore::new();
    store.put(AUTOSEND_NAMESPACE, "analogin/value", &[0x00, 0xFF]);
    let rig = Rig::new(share_store(store));
    assert_eq!(rig.state().mask(rig.leaf), Some(0));
}

#[test]
fn failing_store_boots_unsubscribed_and_keeps_the_change_in_memory() {
    let rig = Rig::new(share_store(BrokenStore));
    assert_eq!(rig.state().mask(rig.leaf), Some(0));

    assert_eq!(
        rig.state().set_subscribed(rig.leaf, 4, true),
        Err(Error::Store(StorageError::IoError))
    );
    assert!(rig.state().is_subscribed(rig.leaf, 4));

    // The wire path logs the failure and stays silent.
    assert!(rig.send(Message::query("/analogin/5/autosend").with_arg(1)).is_empty());
    assert!(rig.state().is_subscribed(rig.leaf, 5));
}

#[test]
fn enable_leaf_rejects_out_of_range_index() {
    let rig = Rig::new(share_store(RecordingStore::new()));
    let out = rig.send(Message::query("/analogin/8/autosend").with_arg(1));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].address, ERROR_ADDRESS);
    assert_eq!(
        rig.state().set_subscribed(rig.leaf, 8, true),
        Err(Error::IndexOutOfRange { index: 8, range: 8 })
    );
}

#[test]
fn interval_control_bounds_and_persistence() {
    let store = RecordingStore::new();
    let rig = Rig::new(share_store(store.clone()));
    let interval =
        |rig: &Rig| rig.send(Message::query("/system/autosend-interval"))[0].args[0].clone();
    assert_eq!(interval(&rig), Argument::Int32(10));

    for rejected in [0, 5001, -3] {
        assert!(
            rig.send(Message::query("/system/autosend-interval").with_arg(rejected))
                .is_empty()
        );
        assert_eq!(interval(&rig), Argument::Int32(10), "{rejected}");
    }
    assert_eq!(store.write_count(CONFIG_NAMESPACE), 0);

    rig.send(Message::query("/system/autosend-interval").with_arg(250));
    assert_eq!(interval(&rig), Argument::Int32(250));
    assert_eq!(rig.autosender.interval().as_millis(), 250);
    assert_eq!(store.load_config().unwrap().autosend_interval_ms, 250);

    rig.send(Message::query("/system/autosend-interval").with_arg(5000));
    assert_eq!(interval(&rig), Argument::Int32(5000));
}
