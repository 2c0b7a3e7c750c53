//! Heart rate monitor library
//! A BLE client for sensors implementing the Bluetooth SIG Heart Rate Service.

// Module declarations
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod utils;

pub use error::{ErrorKind, FrameError};
