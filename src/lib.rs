#![forbid(unsafe_code)]

//! Single-open read/write character device.
//!
//! The [`device`] module holds the driver core: registration, the endpoint
//! with its shared buffer, and the validated boundary copies. [`ipc`]
//! publishes an endpoint over a local socket, and [`client`] talks to it.

pub mod client;
pub mod config;
pub mod device;
pub mod errors;
pub mod ipc;

pub use config::{DeviceConfig, LengthConvention};
pub use errors::{AppError, Result};
