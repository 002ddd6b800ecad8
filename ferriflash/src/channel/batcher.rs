//! Idle-delimited batching of raw serial reads.
//!
//! Serial drivers deliver device output in ragged pieces: a single line can
//! arrive as three reads, or two lines as one. The batcher holds everything
//! it receives and releases it as one unit only after the input has been
//! quiet for the idle period, so downstream consumers see whole bursts.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::task::noop_waker_ref;
use log::trace;
use tokio::io::AsyncRead;
use tokio_util::io::poll_read_buf;

use super::timer::{IdleTimer, TokioTimer};

/// Idle period used by the listening-mode dialogues.
pub const DEFAULT_IDLE_PERIOD: Duration = Duration::from_millis(250);

const READ_CHUNK: usize = 1024;

/// Accumulator plus idle timer, independent of any reader.
///
/// Bytes pushed in are never emitted immediately. Each push cancels the
/// pending timer and arms a new one; when a timer expires with no push in
/// between, the whole accumulator becomes one batch.
#[derive(Debug)]
pub struct Batcher<T = TokioTimer> {
    accumulator: BytesMut,
    flushed: VecDeque<Bytes>,
    idle: Duration,
    timer: T,
}

impl Batcher<TokioTimer> {
    /// Create a batcher on the tokio clock.
    pub fn new(idle: Duration) -> Self {
        Self::with_timer(idle, TokioTimer::new())
    }
}

impl<T: IdleTimer> Batcher<T> {
    /// Create a batcher driven by the given timer.
    pub fn with_timer(idle: Duration, timer: T) -> Self {
        Self {
            accumulator: BytesMut::new(),
            flushed: VecDeque::new(),
            idle,
            timer,
        }
    }

    /// Append a chunk and restart the idle period.
    pub fn push(&mut self, chunk: &[u8]) {
        self.accumulator.extend_from_slice(chunk);
        self.timer.cancel();
        self.timer.schedule(self.idle);
    }

    /// Poll for the next batch, flushing if the idle timer has expired.
    pub fn poll_batch(&mut self, cx: &mut Context<'_>) -> Poll<Bytes> {
        if let Poll::Ready(()) = self.timer.poll_expired(cx) {
            self.flush();
        }
        match self.flushed.pop_front() {
            Some(batch) => Poll::Ready(batch),
            None => Poll::Pending,
        }
    }

    /// Take a batch that has already been flushed, without waiting.
    ///
    /// Returns `None` until the idle timer has fired at least once.
    pub fn read(&mut self) -> Option<Bytes> {
        let mut cx = Context::from_waker(noop_waker_ref());
        match self.poll_batch(&mut cx) {
            Poll::Ready(batch) => Some(batch),
            Poll::Pending => None,
        }
    }

    /// Flush whatever is held regardless of the timer (end of input).
    pub fn finish(&mut self) -> Option<Bytes> {
        self.timer.cancel();
        self.flush();
        self.flushed.pop_front()
    }

    /// Number of bytes waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.accumulator.len()
    }

    /// The configured idle period.
    pub fn idle_period(&self) -> Duration {
        self.idle
    }

    fn flush(&mut self) {
        if self.accumulator.is_empty() {
            return;
        }
        let batch = self.accumulator.split().freeze();
        trace!("batch flushed: {} bytes", batch.len());
        self.flushed.push_back(batch);
    }
}

/// A [`Batcher`] reading from an `AsyncRead`, exposed as a `Stream` of batches.
///
/// End of input flushes the remainder immediately and then ends the stream.
/// Read errors are passed through untouched.
#[derive(Debug)]
pub struct StreamBatcher<R, T = TokioTimer> {
    reader: R,
    batcher: Batcher<T>,
    read_buf: BytesMut,
    eof: bool,
}

impl<R: AsyncRead + Unpin> StreamBatcher<R, TokioTimer> {
    /// Batch `reader` with the given idle period on the tokio clock.
    pub fn new(reader: R, idle: Duration) -> Self {
        Self::with_timer(reader, idle, TokioTimer::new())
    }
}

impl<R: AsyncRead + Unpin, T: IdleTimer> StreamBatcher<R, T> {
    /// Batch `reader` using a caller-supplied timer.
    pub fn with_timer(reader: R, idle: Duration, timer: T) -> Self {
        Self {
            reader,
            batcher: Batcher::with_timer(idle, timer),
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            eof: false,
        }
    }

    /// Take an already-flushed batch without waiting. See [`Batcher::read`].
    pub fn read(&mut self) -> Option<Bytes> {
        self.batcher.read()
    }

    /// Get a reference to the underlying batcher.
    pub fn batcher(&self) -> &Batcher<T> {
        &self.batcher
    }

    /// Get a mutable reference to the wrapped reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Unwrap the reader. Unflushed bytes are dropped.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R, T> Stream for StreamBatcher<R, T>
where
    R: AsyncRead + Unpin,
    T: IdleTimer + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        // Drain everything the reader has before looking at the timer, so a
        // steady trickle of input keeps postponing the flush.
        while !this.eof {
            if this.read_buf.capacity() - this.read_buf.len() < READ_CHUNK {
                this.read_buf.reserve(READ_CHUNK);
            }
            match poll_read_buf(Pin::new(&mut this.reader), cx, &mut this.read_buf) {
                Poll::Ready(Ok(0)) => this.eof = true,
                Poll::Ready(Ok(_)) => {
                    let chunk = this.read_buf.split();
                    trace!("batcher read {} bytes", chunk.len());
                    this.batcher.push(&chunk);
                }
                Poll::Ready(Err(err)) => return Poll::Ready(Some(Err(err))),
                Poll::Pending => break,
            }
        }

        if this.eof {
            return Poll::Ready(this.batcher.finish().map(Ok));
        }

        this.batcher.poll_batch(cx).map(|batch| Some(Ok(batch)))
    }
}
