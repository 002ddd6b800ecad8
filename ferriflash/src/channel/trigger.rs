//! Prompt/response automaton over a batched serial stream.
//!
//! The device prints known prompt strings; each registered prompt has a
//! handler that decides what to answer. Answers are written to the port and
//! drained before the conversation moves on, so at most one prompt is ever
//! in flight.

use std::fmt;
use std::future::Future;
use std::io;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use log::{debug, trace};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::scanner::PromptScanner;
use crate::error::{ChannelError, Result, TransportError};

/// Continuation run once a reply has been written and drained.
pub type AfterSent = Box<dyn FnOnce() + Send>;

/// Future returned by a trigger handler.
pub type HandlerFuture = BoxFuture<'static, Result<Reply>>;

/// Boxed trigger handler.
pub type TriggerHandler = Box<dyn FnMut() -> HandlerFuture + Send>;

/// What a handler wants done after its prompt matched.
pub enum Reply {
    /// Write `text` to the port, drain, then run `after_sent` if present.
    /// Empty text writes nothing and skips `after_sent`.
    Send {
        text: String,
        after_sent: Option<AfterSent>,
    },

    /// Leave the port alone.
    Nothing,

    /// The dialogue is complete; stop listening.
    Finish,
}

impl Reply {
    /// Reply with `text`.
    pub fn send(text: impl Into<String>) -> Self {
        Reply::Send {
            text: text.into(),
            after_sent: None,
        }
    }

    /// Attach a continuation to a `Send` reply. Other replies are unchanged.
    ///
    /// Continuations chain: an existing one runs first, then `f`.
    pub fn and_then(self, f: impl FnOnce() + Send + 'static) -> Self {
        match self {
            Reply::Send { text, after_sent } => {
                let after_sent: AfterSent = match after_sent {
                    Some(first) => Box::new(move || {
                        first();
                        f();
                    }),
                    None => Box::new(f),
                };
                Reply::Send {
                    text,
                    after_sent: Some(after_sent),
                }
            }
            other => other,
        }
    }

    /// The text this reply would write, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Reply::Send { text, .. } => Some(text),
            _ => None,
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Send { text, after_sent } => f
                .debug_struct("Send")
                .field("text", text)
                .field("after_sent", &after_sent.is_some())
                .finish(),
            Reply::Nothing => f.write_str("Nothing"),
            Reply::Finish => f.write_str("Finish"),
        }
    }
}

/// Whether the trigger is still listening after processing a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Still listening for prompts.
    Continue,

    /// Stopped, either by a `Finish` reply or by [`PromptTrigger::stop`].
    Stopped,
}

/// Registered prompts and their handlers, driven by a stream of batches.
///
/// `S` is the batched device output (usually a
/// [`StreamBatcher`](super::StreamBatcher)) and `W` the writable side of the
/// same port.
pub struct PromptTrigger<S, W> {
    stream: S,
    port: W,
    triggers: IndexMap<String, TriggerHandler>,
    scanner: PromptScanner,
    listening: bool,
    quiet: bool,
}

impl<S, W> PromptTrigger<S, W>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a trigger with no prompts registered.
    pub fn new(stream: S, port: W) -> Self {
        Self {
            stream,
            port,
            triggers: IndexMap::new(),
            scanner: PromptScanner::new(),
            listening: false,
            quiet: false,
        }
    }

    /// Register `handler` for `prompt`.
    ///
    /// Prompts are scanned in registration order. Registering the same
    /// prompt again replaces its handler but keeps its original position.
    pub fn add_trigger<F, Fut>(&mut self, prompt: impl Into<String>, mut handler: F) -> Result<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        self.add_boxed_trigger(prompt, Box::new(move || -> HandlerFuture { Box::pin(handler()) }))
    }

    /// Register an already boxed handler.
    pub fn add_boxed_trigger(
        &mut self,
        prompt: impl Into<String>,
        handler: TriggerHandler,
    ) -> Result<()> {
        let prompt = prompt.into();
        if prompt.is_empty() {
            return Err(ChannelError::EmptyPrompt.into());
        }
        self.triggers.insert(prompt, handler);
        Ok(())
    }

    /// Start reacting to incoming batches. `quiet` keeps replies out of the logs.
    pub fn start(&mut self, quiet: bool) {
        self.listening = true;
        self.quiet = quiet;
    }

    /// Stop reacting to incoming batches. Safe to call at any time.
    pub fn stop(&mut self) {
        self.listening = false;
    }

    /// Whether the trigger is currently listening.
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Wait for the next batch from the device. `None` means the stream ended.
    ///
    /// Cancel-safe: dropping the future loses no data.
    pub async fn next_batch(&mut self) -> Result<Option<Bytes>> {
        match self.stream.next().await {
            Some(Ok(batch)) => Ok(Some(batch)),
            Some(Err(err)) => Err(TransportError::Io(err).into()),
            None => Ok(None),
        }
    }

    /// Feed one batch through the matcher and dispatch matched handlers.
    ///
    /// Handlers run one at a time, in the order their prompts appear. Each
    /// reply is written and drained before the rest of the output is
    /// scanned. Batches arriving while stopped are ignored.
    ///
    /// Every prompt in the batch is served, not just the first match.
    pub async fn on_data(&mut self, batch: &[u8]) -> Result<Flow> {
        if !self.listening {
            return Ok(Flow::Stopped);
        }

        trace!("trigger received {:?}", String::from_utf8_lossy(batch));
        self.scanner.extend(batch);

        while self.listening {
            let Some(index) = self
                .scanner
                .next_match(self.triggers.keys().map(String::as_str))
            else {
                break;
            };

            let future = match self.triggers.get_index_mut(index) {
                Some((prompt, handler)) => {
                    debug!("prompt matched: {:?}", prompt);
                    handler()
                }
                None => break,
            };

            match future.await? {
                Reply::Send { text, after_sent } => self.respond(&text, after_sent).await?,
                Reply::Nothing => {}
                Reply::Finish => self.stop(),
            }
        }

        Ok(if self.listening {
            Flow::Continue
        } else {
            Flow::Stopped
        })
    }

    /// Write `text`, wait for it to drain, then run `after_sent`.
    ///
    /// Empty text is a no-op and `after_sent` is not run.
    pub async fn respond(&mut self, text: &str, after_sent: Option<AfterSent>) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }

        self.port
            .write_all(text.as_bytes())
            .await
            .map_err(TransportError::Io)?;
        self.port.flush().await.map_err(TransportError::Io)?;

        if !self.quiet {
            debug!("serial input: {:?}", text);
        }

        if let Some(after_sent) = after_sent {
            after_sent();
        }
        Ok(())
    }

    /// Listen until a handler finishes the dialogue.
    ///
    /// Returns immediately if the trigger was never started. Fails with
    /// [`ChannelError::ClosedEarly`] if the stream ends first. No deadline
    /// is applied here; wrap the call or use
    /// [`Conversation`](crate::driver::Conversation) for timeouts.
    pub async fn run(&mut self) -> Result<()> {
        while self.listening {
            let batch = self.next_batch().await?.ok_or(ChannelError::ClosedEarly)?;
            self.on_data(&batch).await?;
        }
        Ok(())
    }

    /// Registered prompts, in scan order.
    pub fn prompts(&self) -> impl Iterator<Item = &str> {
        self.triggers.keys().map(String::as_str)
    }

    /// Output received but not yet consumed by a match.
    pub fn pending(&self) -> &[u8] {
        self.scanner.pending()
    }

    /// Get a mutable reference to the writable port.
    pub fn port_mut(&mut self) -> &mut W {
        &mut self.port
    }

    /// Take back the stream and the port.
    pub fn into_parts(self) -> (S, W) {
        (self.stream, self.port)
    }
}
