//! Read/write character device: registration, endpoint, and boundary copies.

pub mod boundary;
pub mod endpoint;
pub mod registry;

pub use boundary::{CopyFault, UserDest, UserSource};
pub use endpoint::{Endpoint, Session};
pub use registry::{DeviceId, DeviceRegistry, Registration};

/// Default name the device is published under.
pub const DEVICE_NAME: &str = "chardev";

/// Capacity of the shared buffer; an upper bound on one line of input.
pub const BUF_LEN: usize = 512;
