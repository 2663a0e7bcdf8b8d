//! Application layer.
//!
//! Port traits in [`ports`] keep the protocol core away from files and
//! flash; [`device`] wires simulated peripherals into an address tree.

pub mod device;
pub mod ports;
