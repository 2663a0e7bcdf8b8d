//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock stores and in-process transports. All tests run on the
//! host with no sockets beyond loopback.

mod autosend_tests;
mod dispatch_tests;
mod mock_store;
mod tree_tests;
