//! oscdev — OSC device control protocol engine.
//!
//! A host addresses properties of a device (`/analogin/5/value`) with OSC
//! messages; zero arguments reads, one or more writes. The device can also
//! publish changed values on its own (autosend).
//!
//! - [`osc::codec`]: wire format, shared by the device and host roles
//! - [`tree`]: address resolution and reverse lookup
//! - [`osc::engine`]: the inbound dispatcher
//! - [`autosend`]: change-driven publication with persisted subscriptions
//! - [`osc::io_task`]: drives both actors over a [`osc::transport::Transport`]

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod autosend;
pub mod config;
pub mod drivers;
pub mod osc;
pub mod resource;
pub mod tree;

mod error;

pub use error::{Error, Result, TreeError};
