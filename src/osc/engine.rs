//! Dispatcher — routes inbound packets through the address tree.
//!
//! **Transport-decoupled**: the dispatcher does not own a transport.
//! Callers feed one packet via [`Dispatcher::handle_inbound`] and get back
//! at most one reply packet. The I/O task bridges the transport to it.
//!
//! Every message passes through a three-step pipeline:
//!
//! 1. **Decode**: per-message failures become `/error` replies; a broken
//!    bundle frame yields a single `/error` for the whole packet.
//! 2. **Resolve**: unknown addresses and bad indices become `/error`
//!    replies tagged with the offending address.
//! 3. **Invoke**: a zero-argument message is a read and its value is
//!    echoed back on the same address; anything else is a write and is
//!    answered with silence.
//!
//! Replies keep wire order and leave as one packet (bundle collapse
//! applies).

use core::fmt::Write as _;
use std::sync::Arc;

use log::{debug, warn};

use crate::config::ProtocolConfig;
use crate::error::Error;
use crate::tree::AddressTree;

use super::codec::{self, DecodeLimits, Rejected};
use super::types::{Argument, Message};

/// Address of structured error replies: `,ss` = offending address, reason.
pub const ERROR_ADDRESS: &str = "/error";

/// Build the `/error` reply for a failed message.
pub fn error_reply(address: Option<&str>, error: &Error) -> Message {
    let mut reason = heapless::String::<64>::new();
    let _ = write!(reason, "{}", error);
    Message::new(
        ERROR_ADDRESS,
        vec![
            Argument::from(address.unwrap_or("")),
            Argument::from(reason.as_str()),
        ],
    )
}

#[derive(Clone)]
pub struct Dispatcher {
    tree: Arc<AddressTree>,
    limits: DecodeLimits,
}

impl Dispatcher {
    pub fn new(tree: Arc<AddressTree>, config: &ProtocolConfig) -> Self {
        Self {
            tree,
            limits: DecodeLimits::from(config),
        }
    }

    pub fn tree(&self) -> &Arc<AddressTree> {
        &self.tree
    }

    /// Process one inbound packet. Returns the encoded reply packet, if
    /// any message produced a reply.
    pub fn handle_inbound(&self, packet: &[u8]) -> Option<Vec<u8>> {
        codec::encode_batch(self.dispatch(packet))
    }

    /// Process one inbound packet, returning the reply messages in wire
    /// order.
    pub fn dispatch(&self, packet: &[u8]) -> Vec<Message> {
        let decoded = match codec::decode_lenient(packet, self.limits) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("OSC: dropping packet ({} bytes): {}", packet.len(), e);
                return vec![error_reply(None, &e)];
            }
        };

        decoded
            .into_iter()
            .filter_map(|element| match element {
                Ok(msg) => self.dispatch_message(&msg),
                Err(Rejected { address, error }) => {
                    warn!(
                        "OSC: rejected {}: {}",
                        address.as_deref().unwrap_or("<no address>"),
                        error
                    );
                    Some(error_reply(address.as_deref(), &error))
                }
            })
            .collect()
    }

    /// Resolve and invoke a single decoded message.
    pub fn dispatch_message(&self, msg: &Message) -> Option<Message> {
        let target = match self.tree.resolve(&msg.address) {
            Ok(target) => target,
            Err(e) => {
                warn!("OSC: {} -> {}", msg.address, e);
                return Some(error_reply(Some(&msg.address), &e));
            }
        };

        let value = target.invoke(&msg.args);
        if msg.is_query() {
            debug!("OSC: read {} -> {:?}", msg.address, value);
            value.map(|v| Message::new(msg.address.clone(), vec![v]))
        } else {
            debug!("OSC: write {} ({} args)", msg.address, msg.args.len());
            None
        }
    }
}
