//! YMODEM control bytes, block framing and response classification.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::TransferError;

/// Start of a 128-byte block.
pub const SOH: u8 = 0x01;
/// Start of a 1024-byte block.
pub const STX: u8 = 0x02;
/// End of file.
pub const EOT: u8 = 0x04;
/// Positive acknowledgement.
pub const ACK: u8 = 0x06;
/// Negative acknowledgement.
pub const NAK: u8 = 0x15;
/// Cancel; sent in pairs.
pub const CA: u8 = 0x18;
/// Receiver asks for 16-bit CRC mode (`'C'`).
pub const CRC16: u8 = 0x43;

/// Block lengths the protocol defines.
pub const SHORT_BLOCK: usize = 128;
pub const LONG_BLOCK: usize = 1024;

/// Name of a control byte, for logging.
pub fn control_name(byte: u8) -> Option<&'static str> {
    match byte {
        SOH => Some("SOH"),
        STX => Some("STX"),
        EOT => Some("EOT"),
        ACK => Some("ACK"),
        NAK => Some("NAK"),
        CA => Some("CA"),
        CRC16 => Some("CRC16"),
        _ => None,
    }
}

/// Block mark for a block length: SOH for 128, STX for 1024.
pub fn mark_for(block_len: usize) -> Result<u8, TransferError> {
    match block_len {
        SHORT_BLOCK => Ok(SOH),
        LONG_BLOCK => Ok(STX),
        other => Err(TransferError::InvalidBlockLength(other)),
    }
}

/// Frame `payload` as `[mark][seq][255-seq][payload, zero padded][0x00][0x00]`.
///
/// The two trailer bytes stay zero; receiving firmware does not check them.
pub fn encode_block(mark: u8, seq: u8, payload: &[u8], block_len: usize) -> Bytes {
    debug_assert!(payload.len() <= block_len);

    let mut frame = BytesMut::with_capacity(block_len + 5);
    frame.put_u8(mark);
    frame.put_u8(seq);
    frame.put_u8(!seq);
    frame.put_slice(payload);
    frame.put_bytes(0, block_len - payload.len());
    frame.put_bytes(0, 2);
    frame.freeze()
}

/// Header block payload: `"<name>\0<length> "`.
pub fn header_payload(name: &str, length: u64) -> Vec<u8> {
    format!("{}\0{} ", name, length).into_bytes()
}

/// Outcome of looking at the bytes received for one exchange so far.
#[derive(Debug)]
pub enum Classification {
    /// Not conclusive yet; keep reading.
    Pending,

    /// Acknowledged.
    Accepted,

    /// The exchange failed.
    Rejected(TransferError),
}

/// Classify the accumulated response to one exchange.
///
/// `bundled_crc_request` is set for the first block of a file: the receiver
/// answers it with ACK followed by `'C'`, so two bytes are needed before
/// the ACK counts. A single CA is inconclusive; two confirm cancellation.
pub fn classify(response: &[u8], bundled_crc_request: bool) -> Classification {
    match response.first() {
        None => Classification::Pending,
        Some(&ACK) if bundled_crc_request && response.len() < 2 => Classification::Pending,
        Some(&ACK) => Classification::Accepted,
        Some(&CA) if response.len() < 2 => Classification::Pending,
        Some(&CA) | Some(&NAK) => Classification::Rejected(TransferError::Cancelled),
        Some(&other) => Classification::Rejected(TransferError::UnknownResponse(other)),
    }
}
