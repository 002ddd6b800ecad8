//! Error types for ferriflash.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for ferriflash operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Serial port level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Batching and prompt matching errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// YMODEM transfer errors
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Dialogue and command errors
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

/// Transport layer errors (opening, reading and writing the port).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to open the serial device
    #[error("Failed to open serial port {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },

    /// The port was already closed by a previous operation
    #[error("Serial port is closed")]
    Closed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Channel layer errors (batched stream, prompt triggers).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// A trigger was registered with an empty prompt
    #[error("prompt must be specified")]
    EmptyPrompt,

    /// No device output arrived before the armed deadline
    #[error("Serial timed out after {0:?}")]
    Timeout(Duration),

    /// The stream ended while a dialogue was still running
    #[error("Serial port closed early")]
    ClosedEarly,
}

/// YMODEM transfer errors.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Block length other than 128 or 1024
    #[error("Invalid configuration: block length must be 128 or 1024, got {0}")]
    InvalidBlockLength(usize),

    /// Device never asked for the transfer
    #[error("Timed out waiting for initial response from device after {0:?}")]
    OpenTimeout(Duration),

    /// A packet exchange was not classified in time
    #[error("Timed out waiting for packet acknowledgement after {0:?}")]
    PacketTimeout(Duration),

    /// NAK or a confirmed double CA from the receiver
    #[error("Transfer cancelled")]
    Cancelled,

    /// Response led by a byte the protocol does not define
    #[error("Unknown response from device: {0:#04x}")]
    UnknownResponse(u8),

    /// Local file could not be read
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File name and length do not fit in one header block
    #[error("Header for {name:?} does not fit in a {block_len}-byte block")]
    HeaderTooLong { name: String, block_len: usize },
}

/// Driver layer errors (dialogues and listening-mode commands).
#[derive(Error, Debug)]
pub enum DriverError {
    /// An answer failed validation before being sent
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// The device answered but not in the expected form
    #[error("Unexpected response from device: {message}")]
    UnexpectedResponse { message: String },

    /// Credentials file could not be loaded
    #[error("Invalid credentials file {path}: {message}")]
    Credentials { path: PathBuf, message: String },
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Transport(TransportError::Io(err))
    }
}

impl Error {
    /// Whether this error came from a serial timeout of any kind.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Channel(ChannelError::Timeout(_))
                | Error::Transfer(TransferError::OpenTimeout(_))
                | Error::Transfer(TransferError::PacketTimeout(_))
        )
    }
}

/// Result type alias using ferriflash's Error.
pub type Result<T> = std::result::Result<T, Error>;
