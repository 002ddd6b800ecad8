//! Serial transport implementation using tokio-serial.

use log::debug;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use super::config::SerialConfig;
use crate::error::{Result, TransportError};

/// Opens serial devices as async byte streams.
pub struct SerialTransport;

impl SerialTransport {
    /// Open the port described by `config` as 8N1 without flow control.
    ///
    /// The returned stream implements `AsyncRead + AsyncWrite` and can be
    /// handed to [`YModem`](crate::ymodem::YModem) directly, or split with
    /// `tokio::io::split` for a batcher/trigger pair.
    pub fn open(config: &SerialConfig) -> Result<SerialStream> {
        debug!("opening {} at {} baud", config.path, config.baud_rate);

        let stream = tokio_serial::new(&config.path, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.timeout)
            .open_native_async()
            .map_err(|source| TransportError::OpenFailed {
                path: config.path.clone(),
                source,
            })?;

        Ok(stream)
    }
}
