//! Serial transport layer wrapping tokio-serial.
//!
//! Everything above this module only needs `AsyncRead + AsyncWrite`, so
//! tests and alternative links (USB CDC bridges, TCP serial servers) plug in
//! without touching the protocol code.

pub mod config;
mod serial;

pub use config::{DEFAULT_BAUD_RATE, FLASH_BAUD_RATE, SerialConfig};
pub use serial::SerialTransport;
