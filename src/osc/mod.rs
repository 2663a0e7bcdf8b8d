//! OSC protocol layer: values, wire codec, framing, dispatch and I/O.

pub mod codec;
pub mod engine;
pub mod framing;
pub mod io_task;
pub mod text;
pub mod transport;
pub mod types;

pub use types::{Argument, Bundle, Message, Packet, TimeTag};
