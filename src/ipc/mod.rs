//! Local IPC layer publishing the device endpoint.
//!
//! The device host listens on a named pipe (Windows) or Unix domain socket
//! (Linux/macOS) named after the device, and accepts JSON-line requests from
//! `chardev-client`. One connection stands in for one open file.

pub mod protocol;
pub mod server;
