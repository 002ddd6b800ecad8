//! YMODEM transfer configuration.

use std::time::Duration;

use super::packet::{SHORT_BLOCK, mark_for};
use crate::error::TransferError;

/// Byte written to a listening device to start a YMODEM receive.
pub const FLASH_REQUEST: u8 = b'f';

/// Line printed by a device in listening mode once it is ready to receive.
pub const LISTENING_BANNER: &str = "Waiting for the binary file to be sent ... (press 'a' to abort)";

/// YMODEM transfer configuration.
#[derive(Debug, Clone)]
pub struct YModemConfig {
    /// Payload bytes per block, 128 or 1024.
    pub block_len: usize,

    /// Bound on the opening handshake.
    pub open_timeout: Duration,

    /// Bound on each write-and-acknowledge exchange.
    pub packet_timeout: Duration,

    /// Byte written to ask the device for a transfer.
    pub request_byte: u8,

    /// Banner that also completes the opening handshake.
    pub banner: String,

    /// Pause between data blocks.
    pub block_delay: Duration,

    /// Name announced in every file header instead of the file's own name.
    pub header_name: Option<String>,
}

impl Default for YModemConfig {
    fn default() -> Self {
        Self {
            block_len: SHORT_BLOCK,
            open_timeout: Duration::from_secs(10),
            packet_timeout: Duration::from_secs(10),
            request_byte: FLASH_REQUEST,
            banner: LISTENING_BANNER.to_string(),
            block_delay: Duration::from_millis(1),
            header_name: None,
        }
    }
}

impl YModemConfig {
    /// Default configuration (128-byte blocks).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the block length. Checked by [`validate`](Self::validate).
    pub fn block_len(mut self, block_len: usize) -> Self {
        self.block_len = block_len;
        self
    }

    /// Set the opening handshake timeout.
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Set the per-packet timeout.
    pub fn packet_timeout(mut self, timeout: Duration) -> Self {
        self.packet_timeout = timeout;
        self
    }

    /// Set the pause between data blocks.
    pub fn block_delay(mut self, delay: Duration) -> Self {
        self.block_delay = delay;
        self
    }

    /// Announce every file under `name` (older bootloaders expect `binary`).
    pub fn header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = Some(name.into());
        self
    }

    /// Set the listening-mode banner.
    pub fn banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = banner.into();
        self
    }

    /// Check the configuration, returning the block mark to use.
    pub fn validate(&self) -> Result<u8, TransferError> {
        mark_for(self.block_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ymodem::packet::{SOH, STX};

    #[test]
    fn test_default_config() {
        let config = YModemConfig::default();
        assert_eq!(config.block_len, 128);
        assert_eq!(config.open_timeout, Duration::from_secs(10));
        assert_eq!(config.packet_timeout, Duration::from_secs(10));
        assert_eq!(config.validate().unwrap(), SOH);
    }

    #[test]
    fn test_block_length_validation() {
        assert_eq!(YModemConfig::new().block_len(1024).validate().unwrap(), STX);
        assert!(matches!(
            YModemConfig::new().block_len(256).validate(),
            Err(TransferError::InvalidBlockLength(256))
        ));
    }
}
