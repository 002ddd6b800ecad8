//! The transfer state machine.

use std::path::Path;

use bytes::BytesMut;
use log::{debug, info, trace};
use memchr::memmem::Finder;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::config::YModemConfig;
use super::packet::{
    CA, CRC16, Classification, EOT, classify, control_name, encode_block, header_payload,
};
use crate::error::{ChannelError, Result, TransferError, TransportError};

/// YMODEM sender over a raw duplex port.
///
/// The port is closed when [`send`](Self::send) finishes, whether it
/// succeeded or not. After a failure two CA bytes are written first so the
/// receiver abandons its side of the transfer.
pub struct YModem<P> {
    /// The port; `None` once closed.
    port: Option<P>,

    config: YModemConfig,

    /// SOH or STX, fixed by the block length.
    mark: u8,

    /// Acknowledged packets in the current file. Goes on the wire mod 256.
    seq: u32,

    /// Set while sending the batch terminator.
    ending: bool,

    errored: bool,
}

impl<P> YModem<P>
where
    P: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap `port`. Fails if the configured block length is not 128 or 1024.
    pub fn new(port: P, config: YModemConfig) -> Result<Self> {
        let mark = config.validate()?;

        Ok(Self {
            port: Some(port),
            config,
            mark,
            seq: 0,
            ending: false,
            errored: false,
        })
    }

    /// Packets acknowledged so far in the current file.
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Whether the port has been closed.
    pub fn is_closed(&self) -> bool {
        self.port.is_none()
    }

    /// Send `files` in order as one batch.
    ///
    /// Opens the transfer once, sends every file, then the empty batch
    /// terminator. An empty list still opens and terminates the batch. The
    /// first error aborts the batch and is returned after the port has been
    /// closed.
    pub async fn send<I, Q>(&mut self, files: I) -> Result<()>
    where
        I: IntoIterator<Item = Q>,
        Q: AsRef<Path>,
    {
        let result = self.send_batch(files).await;
        if result.is_err() {
            self.errored = true;
        }
        self.close().await;
        result
    }

    /// Send a single file as a batch of one.
    pub async fn send_file(&mut self, file: impl AsRef<Path>) -> Result<()> {
        self.send([file]).await
    }

    async fn send_batch<I, Q>(&mut self, files: I) -> Result<()>
    where
        I: IntoIterator<Item = Q>,
        Q: AsRef<Path>,
    {
        self.open().await?;

        for file in files {
            self.transmit_file(file.as_ref()).await?;
        }

        self.end_batch().await
    }

    /// Request a transfer and wait for the receiver to be ready.
    ///
    /// Ready means a chunk led by the CRC-16 request byte, or the listening
    /// banner anywhere in the text received so far.
    async fn open(&mut self) -> Result<()> {
        let timeout = self.config.open_timeout;
        let request = self.config.request_byte;
        let banner = (!self.config.banner.is_empty())
            .then(|| Finder::new(self.config.banner.as_bytes()).into_owned());
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;

        debug!("ymodem: requesting transfer");
        match tokio::time::timeout(timeout, await_ready(port, request, banner)).await {
            Ok(result) => result,
            Err(_) => Err(TransferError::OpenTimeout(timeout).into()),
        }
    }

    async fn transmit_file(&mut self, path: &Path) -> Result<()> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| TransferError::FileRead {
                path: path.to_path_buf(),
                source,
            })?;

        let name = match &self.config.header_name {
            Some(name) => name.clone(),
            None => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        info!("ymodem: sending file {} ({} bytes)", path.display(), data.len());
        self.send_blocks(&name, &data).await?;

        debug!("ymodem: end of file");
        self.exchange(&[EOT]).await
    }

    /// Header then data blocks for one file.
    async fn send_blocks(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.seq = 0;
        self.ending = false;

        self.send_header(name, data.len() as u64).await?;

        let mut blocks = data.chunks(self.config.block_len).peekable();
        while let Some(block) = blocks.next() {
            self.send_packet(block).await?;
            if blocks.peek().is_some() && !self.config.block_delay.is_zero() {
                tokio::time::sleep(self.config.block_delay).await;
            }
        }

        Ok(())
    }

    async fn end_batch(&mut self) -> Result<()> {
        self.seq = 0;
        self.ending = true;

        debug!("ymodem: end of batch");
        self.send_header("", 0).await
    }

    async fn send_header(&mut self, name: &str, length: u64) -> Result<()> {
        let payload = header_payload(name, length);
        if payload.len() > self.config.block_len {
            return Err(TransferError::HeaderTooLong {
                name: name.to_string(),
                block_len: self.config.block_len,
            }
            .into());
        }

        self.send_packet(&payload).await
    }

    async fn send_packet(&mut self, payload: &[u8]) -> Result<()> {
        let frame = encode_block(self.mark, self.seq as u8, payload, self.config.block_len);
        trace!("ymodem: write seq {} ({} bytes)", self.seq, frame.len());
        self.exchange(&frame).await
    }

    /// Write `packet` and wait for the response to be classified.
    async fn exchange(&mut self, packet: &[u8]) -> Result<()> {
        let timeout = self.config.packet_timeout;
        let bundled_crc_request = self.seq == 0 && !self.ending;
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;

        match tokio::time::timeout(timeout, await_ack(port, packet, bundled_crc_request)).await {
            Ok(Ok(())) => {
                self.seq += 1;
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransferError::PacketTimeout(timeout).into()),
        }
    }

    /// Close the port once. After an error, tell the receiver to give up
    /// first; failures on that path are ignored.
    async fn close(&mut self) {
        let Some(mut port) = self.port.take() else {
            return;
        };

        if self.errored {
            debug!("ymodem: cancelling transfer");
            if let Err(e) = port.write_all(&[CA, CA]).await {
                debug!("ymodem: cancel not delivered: {}", e);
            }
            let _ = port.flush().await;
        }

        if let Err(e) = port.shutdown().await {
            debug!("ymodem: error closing port: {}", e);
        }
    }
}

async fn await_ready<P>(port: &mut P, request: u8, banner: Option<Finder<'static>>) -> Result<()>
where
    P: AsyncRead + AsyncWrite + Unpin,
{
    port.write_all(&[request]).await?;
    port.flush().await?;

    let mut received = BytesMut::new();
    loop {
        let start = received.len();
        if port.read_buf(&mut received).await? == 0 {
            return Err(ChannelError::ClosedEarly.into());
        }
        log_data(&received[start..]);

        if received[start] == CRC16 {
            debug!("ymodem: receiver requested CRC-16 mode");
            return Ok(());
        }
        if let Some(banner) = &banner
            && banner.find(&received).is_some()
        {
            debug!("ymodem: receiver is listening");
            return Ok(());
        }
    }
}

async fn await_ack<P>(port: &mut P, packet: &[u8], bundled_crc_request: bool) -> Result<()>
where
    P: AsyncRead + AsyncWrite + Unpin,
{
    port.write_all(packet).await?;
    port.flush().await?;

    let mut response = BytesMut::new();
    loop {
        let start = response.len();
        if port.read_buf(&mut response).await? == 0 {
            return Err(ChannelError::ClosedEarly.into());
        }
        log_data(&response[start..]);

        match classify(&response, bundled_crc_request) {
            Classification::Pending => continue,
            Classification::Accepted => return Ok(()),
            Classification::Rejected(e) => return Err(e.into()),
        }
    }
}

/// Short responses are control bytes; log them by name.
fn log_data(data: &[u8]) {
    if data.len() <= 2 {
        for &byte in data {
            match control_name(byte) {
                Some(name) => trace!("ymodem: read {}", name),
                None => trace!("ymodem: read {:#04x}", byte),
            }
        }
    } else {
        trace!("ymodem: read {:?}", String::from_utf8_lossy(data));
    }
}
