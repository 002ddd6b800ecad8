//! YMODEM batch sender.
//!
//! [`YModem`] owns a raw duplex port and pushes one or more files to a
//! device, one block at a time, waiting for every block to be acknowledged
//! before sending the next:
//!
//! ```text
//! open ──► header ──► data blocks ──► EOT ──► (next file) ──► empty header ──► close
//! ```
//!
//! The two trailer bytes of every block are always zero. Receiving firmware
//! ignores them and a real CRC is not computed.

mod config;
pub mod packet;
mod transfer;

pub use config::{FLASH_REQUEST, LISTENING_BANNER, YModemConfig};
pub use transfer::YModem;
