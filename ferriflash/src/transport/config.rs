//! Serial port configuration.

use std::time::Duration;

/// Baud rate used by the listening-mode dialogues.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Baud rate at which the device accepts YMODEM flashing.
pub const FLASH_BAUD_RATE: u32 = 28800;

/// Serial connection configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device path (e.g. `/dev/ttyACM0`, `COM3`).
    pub path: String,

    /// Line speed.
    pub baud_rate: u32,

    /// Read/write timeout handed to the OS driver.
    pub timeout: Duration,
}

impl SerialConfig {
    /// Configuration for a listening-mode dialogue on `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_secs(10),
        }
    }

    /// Configuration for YMODEM flashing on `path`.
    pub fn for_flashing(path: impl Into<String>) -> Self {
        Self::new(path).baud_rate(FLASH_BAUD_RATE)
    }

    /// Set the baud rate.
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the driver timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SerialConfig::new("/dev/ttyACM0");
        assert_eq!(config.path, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
    }

    #[test]
    fn test_flashing_speed() {
        let config = SerialConfig::for_flashing("COM3").timeout(Duration::from_secs(1));
        assert_eq!(config.baud_rate, 28800);
        assert_eq!(config.timeout, Duration::from_secs(1));
    }
}
