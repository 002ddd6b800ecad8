//! # Ferriflash
//!
//! Async serial protocol engine for provisioning and flashing IoT devices.
//!
//! Ferriflash talks to a device over a serial port in either of two modes:
//! the listening-mode console, where the firmware prints prompts and reads
//! answers, and the YMODEM receiver used to flash firmware binaries.
//!
//! ## Features
//!
//! - Idle batching of ragged serial reads into whole messages
//! - Prompt/response dialogues with per-step deadlines
//! - Wi-Fi provisioning, claim codes and device queries
//! - YMODEM batch sender with 128- and 1024-byte blocks
//! - Anything `AsyncRead + AsyncWrite` works as a port
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferriflash::transport::{SerialConfig, SerialTransport};
//! use ferriflash::{YModem, YModemConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ferriflash::Error> {
//!     let port = SerialTransport::open(&SerialConfig::for_flashing("/dev/ttyACM0"))?;
//!
//!     let mut ymodem = YModem::new(port, YModemConfig::new().block_len(1024))?;
//!     ymodem.send(["system-part1.bin", "tinker.bin"]).await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod driver;
pub mod error;
pub mod transport;
pub mod ymodem;

// Re-export main types for convenience
pub use channel::{PromptTrigger, Reply, StreamBatcher};
pub use driver::{ConversationBuilder, DeviceConsole, WifiCredentials, WifiSetup};
pub use error::{Error, Result};
pub use transport::{SerialConfig, SerialTransport};
pub use ymodem::{YModem, YModemConfig};
