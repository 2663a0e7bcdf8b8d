//! Dispatcher: inbound packet → resolve → handler → reply packet.

use std::sync::{Arc, Mutex};

use oscdev::config::ProtocolConfig;
use oscdev::osc::codec::{BUNDLE_TAG, decode, encode_bundle, encode_message};
use oscdev::osc::engine::{Dispatcher, ERROR_ADDRESS};
use oscdev::osc::types::{Argument, Bundle, Message};
use oscdev::tree::{TreeBuilder, handler};

type CallLog = Arc<Mutex<Vec<(String, Option<i32>, Vec<Argument>)>>>;

/// `/analogin/{0..7}/value` echoes `index * 100` on read, `/led/state`
/// remembers the last write. Every call is logged.
fn dispatcher() -> (Dispatcher, CallLog) {
    let log: CallLog = Arc::default();
    let led = Arc::new(Mutex::new(0));
    let mut b = TreeBuilder::new();

    let calls = log.clone();
    b.register(
        &["analogin", "value"],
        Some(8),
        handler(move |index, args| {
            calls.lock().unwrap().push(("value".into(), index, args.to_vec()));
            index.map(|i| Argument::Int32(i * 100))
        }),
        None,
    )
    .unwrap();

    let calls = log.clone();
    b.register(
        &["led", "state"],
        None,
        handler(move |index, args| {
            calls.lock().unwrap().push(("led".into(), index, args.to_vec()));
            let mut led = led.lock().unwrap();
            match args.first().and_then(Argument::as_i32) {
                Some(v) => {
                    *led = v;
                    // Ignored: writes never reply.
                    Some(Argument::Int32(-1))
                }
                None => Some(Argument::Int32(*led)),
            }
        }),
        None,
    )
    .unwrap();

    (Dispatcher::new(Arc::new(b.build()), &ProtocolConfig::default()), log)
}

fn replies(d: &Dispatcher, packet: &[u8]) -> Vec<Message> {
    d.handle_inbound(packet)
        .map(|p| decode(&p).unwrap())
        .unwrap_or_default()
}

#[test]
fn read_yields_exactly_one_reply_on_same_address() {
    let (d, log) = dispatcher();
    let out = replies(&d, &encode_message(&Message::query("/analogin/5/value")));
    assert_eq!(out, vec![Message::new("/analogin/5/value", vec![Argument::Int32(500)])]);
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[test]
fn write_yields_no_reply_and_passes_arguments() {
    let (d, log) = dispatcher();
    let msg = Message::query("/analogin/5/value").with_arg(42);
    assert!(d.handle_inbound(&encode_message(&msg)).is_none());
    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[("value".to_string(), Some(5), vec![Argument::Int32(42)])]
    );
}

#[test]
fn write_return_value_is_ignored() {
    let (d, _) = dispatcher();
    assert!(
        d.handle_inbound(&encode_message(&Message::query("/led/state").with_arg(1)))
            .is_none()
    );
    let out = replies(&d, &encode_message(&Message::query("/led/state")));
    assert_eq!(out[0].args, vec![Argument::Int32(1)]);
}

#[test]
fn replies_for_a_bundle_keep_wire_order() {
    let (d, _) = dispatcher();
    let request = Bundle::of_messages([
        Message::query("/analogin/3/value"),
        Message::query("/led/state").with_arg(1),
        Message::query("/led/state"),
        Message::query("/analogin/1/value"),
    ]);
    let packet = d.handle_inbound(&encode_bundle(&request)).unwrap();
    assert!(packet.starts_with(BUNDLE_TAG), "several replies travel as a bundle");
    assert_eq!(
        decode(&packet).unwrap(),
        vec![
            Message::new("/analogin/3/value", vec![Argument::Int32(300)]),
            Message::new("/led/state", vec![Argument::Int32(1)]),
            Message::new("/analogin/1/value", vec![Argument::Int32(100)]),
        ]
    );
}

#[test]
fn single_reply_to_a_bundle_is_a_bare_message() {
    let (d, _) = dispatcher();
    let request = Bundle::of_messages([
        Message::query("/led/state").with_arg(0),
        Message::query("/analogin/2/value"),
    ]);
    let packet = d.handle_inbound(&encode_bundle(&request)).unwrap();
    assert_eq!(packet[0], b'/');
}

#[test]
fn unresolved_address_gets_tagged_error_and_siblings_still_run() {
    let (d, log) = dispatcher();
    let request = Bundle::of_messages([
        Message::query("/analogin/5/bogus"),
        Message::query("/analogin/8/value"),
        Message::query("/analogin/0/value"),
    ]);
    let out = replies(&d, &encode_bundle(&request));
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].address, ERROR_ADDRESS);
    assert_eq!(
        out[0].args,
        vec![Argument::from("/analogin/5/bogus"), Argument::from("address not found")]
    );
    assert_eq!(out[1].address, ERROR_ADDRESS);
    assert_eq!(out[1].args[0], Argument::from("/analogin/8/value"));
    assert_eq!(out[2], Message::new("/analogin/0/value", vec![Argument::Int32(0)]));
    assert_eq!(log.lock().unwrap().len(), 1, "only the resolvable message reaches a handler");
}

#[test]
fn malformed_element_does_not_abort_the_bundle() {
    let (d, _) = dispatcher();
    let good = encode_message(&Message::query("/led/state"));
    // "/led/state" with a type tag naming an unknown 'q' argument.
    let mut bad = b"/led/state\0\0,q\0\0".to_vec();
    bad.extend_from_slice(&[0, 0, 0, 1]);

    let mut packet = BUNDLE_TAG.to_vec();
    packet.extend_from_slice(&[0; 8]);
    for element in [&bad, &good] {
        packet.extend_from_slice(&(element.len() as u32).to_be_bytes());
        packet.extend_from_slice(element);
    }

    let out = replies(&d, &packet);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].address, ERROR_ADDRESS);
    assert_eq!(out[0].args[0], Argument::from("/led/state"));
    assert_eq!(out[0].args[1], Argument::from("unknown type tag 'q'"));
    assert_eq!(out[1], Message::new("/led/state", vec![Argument::Int32(0)]));
}

#[test]
fn broken_packet_gets_one_error_and_the_endpoint_keeps_going() {
    let (d, _) = dispatcher();
    let cases: [&[u8]; 3] = [
        b"hello world",
        b"#bundle\0\0\0\0\0\0\0\0\0\xff\xff\xff\xff",
        b"",
    ];
    for garbage in cases {
        let out = replies(&d, garbage);
        assert_eq!(out.len(), 1, "{garbage:?}");
        assert_eq!(out[0].address, ERROR_ADDRESS);
        assert_eq!(out[0].args.len(), 2);
    }
    let out = replies(&d, &encode_message(&Message::query("/analogin/7/value")));
    assert_eq!(out[0].args, vec![Argument::Int32(700)]);
}

#[test]
fn truncated_string_argument_is_reported_not_panicked() {
    let (d, _) = dispatcher();
    // Type tag promises a string but the buffer ends before its NUL.
    let out = replies(&d, b"/led/state\0\0,s\0\0abcd");
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].address, ERROR_ADDRESS);
    assert_eq!(out[0].args[0], Argument::from("/led/state"));
    assert_eq!(
        out[0].args[1],
        Argument::from("malformed packet: unterminated string")
    );
}

#[test]
fn leading_spaces_before_a_typed_command_are_skipped() {
    let (d, _) = dispatcher();
    let mut packet = b"   ".to_vec();
    packet.extend(encode_message(&Message::query("/analogin/2/value")));
    assert_eq!(replies(&d, &packet)[0].args, vec![Argument::Int32(200)]);
}
