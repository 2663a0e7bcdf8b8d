//! Adapters — concrete implementations of the port and transport traits.
//!
//! | Adapter  | Implements               | Connects to               |
//! |----------|--------------------------|---------------------------|
//! | `store`  | StoragePort (ConfigPort) | HashMap / JSON file       |
//! | `udp`    | Transport                | UDP socket, one packet per datagram |
//! | `stream` | Transport                | TCP (any `Read + Write`), length-prefixed |

pub mod store;
pub mod stream;
pub mod udp;
