//! Scripted prompt/response conversations with per-step deadlines.
//!
//! Many listening-mode features are short dialogues: send a command, wait
//! for a prompt, answer it, wait for the next prompt. A [`Conversation`]
//! describes such a dialogue as a list of steps, each naming the prompt to
//! wait for and how long the device may take to print it.
//!
//! The deadline for step *n + 1* starts once the reply to step *n* has
//! drained. The first step's deadline starts after the initial command has
//! been written. Reaching a prompt clears the running deadline.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_core::Stream;
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

use crate::channel::{
    DEFAULT_IDLE_PERIOD, HandlerFuture, PromptTrigger, Reply, StreamBatcher, TriggerHandler,
};
use crate::error::{ChannelError, Result};

/// A resettable deadline shared between a driver loop and its handlers.
///
/// Handlers arm it from a reply continuation and clear it when their prompt
/// is reached; the loop reading device output enforces it.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    state: Arc<Mutex<Option<Armed>>>,
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    at: Instant,
    after: Duration,
}

impl Deadline {
    /// A deadline that is not armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire `after` from now, replacing any running deadline.
    pub fn arm(&self, after: Duration) {
        *self.lock() = Some(Armed {
            at: Instant::now() + after,
            after,
        });
    }

    /// Disarm.
    pub fn clear(&self) {
        *self.lock() = None;
    }

    /// Whether a deadline is running.
    pub fn is_armed(&self) -> bool {
        self.lock().is_some()
    }

    fn armed(&self) -> Option<Armed> {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Armed>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Feed device output to `trigger` until a handler finishes the dialogue.
///
/// Fails with [`ChannelError::Timeout`] when `deadline` expires while
/// waiting for output, and with [`ChannelError::ClosedEarly`] when the
/// stream ends first. The trigger is stopped on every exit path.
pub(crate) async fn drive<S, W>(trigger: &mut PromptTrigger<S, W>, deadline: &Deadline) -> Result<()>
where
    S: Stream<Item = std::io::Result<bytes::Bytes>> + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = drive_inner(trigger, deadline).await;
    trigger.stop();
    deadline.clear();
    result
}

async fn drive_inner<S, W>(trigger: &mut PromptTrigger<S, W>, deadline: &Deadline) -> Result<()>
where
    S: Stream<Item = std::io::Result<bytes::Bytes>> + Unpin,
    W: AsyncWrite + Unpin,
{
    while trigger.is_listening() {
        let next = match deadline.armed() {
            Some(armed) => match tokio::time::timeout_at(armed.at, trigger.next_batch()).await {
                Ok(next) => next?,
                Err(_) => {
                    debug!("serial timed out after {:?}", armed.after);
                    return Err(ChannelError::Timeout(armed.after).into());
                }
            },
            None => trigger.next_batch().await?,
        };

        let batch = next.ok_or(ChannelError::ClosedEarly)?;
        trigger.on_data(&batch).await?;
    }
    Ok(())
}

/// Outcome of a completed conversation.
#[derive(Debug, Clone)]
pub struct ConversationResult {
    /// Prompts reached, in order.
    pub steps: Vec<ConversationStep>,

    /// Total time for the whole conversation.
    pub elapsed: Duration,
}

impl ConversationResult {
    /// The prompt that ended the conversation.
    pub fn last_prompt(&self) -> Option<&str> {
        self.steps.last().map(|s| s.prompt.as_str())
    }
}

/// A prompt reached during a conversation.
#[derive(Debug, Clone)]
pub struct ConversationStep {
    /// The prompt that matched.
    pub prompt: String,

    /// Time from the start of the conversation until the match.
    pub elapsed: Duration,
}

struct Step {
    prompt: String,
    timeout: Option<Duration>,
    handler: TriggerHandler,
}

/// Builder for [`Conversation`].
///
/// # Example
///
/// ```rust
/// use ferriflash::driver::ConversationBuilder;
/// use std::time::Duration;
///
/// let conversation = ConversationBuilder::new()
///     .command("C")
///     .expect("Enter 63-digit claim code: ", Duration::from_secs(2))
///     .reply("0123\n")
///     .expect("Claim code set to: 0123", Duration::from_secs(2))
///     .finish()
///     .build()
///     .unwrap();
/// ```
pub struct ConversationBuilder {
    command: Option<String>,
    steps: Vec<Step>,
    idle_period: Duration,
    quiet: bool,
}

impl Default for ConversationBuilder {
    fn default() -> Self {
        Self {
            command: None,
            steps: Vec::new(),
            idle_period: DEFAULT_IDLE_PERIOD,
            quiet: false,
        }
    }
}

impl ConversationBuilder {
    /// Create an empty conversation builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Command written before waiting for the first prompt.
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Idle period used to batch device output (default 250 ms).
    pub fn idle_period(mut self, idle: Duration) -> Self {
        self.idle_period = idle;
        self
    }

    /// Keep replies out of the logs.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Wait for `prompt`, allowing the device `timeout` to print it.
    ///
    /// `None` waits indefinitely. Must be followed by a reply.
    pub fn expect(
        self,
        prompt: impl Into<String>,
        timeout: impl Into<Option<Duration>>,
    ) -> ExpectStep {
        ExpectStep {
            builder: self,
            prompt: prompt.into(),
            timeout: timeout.into(),
        }
    }

    /// Build the conversation.
    pub fn build(self) -> Result<Conversation> {
        if self.steps.iter().any(|step| step.prompt.is_empty()) {
            return Err(ChannelError::EmptyPrompt.into());
        }

        Ok(Conversation {
            command: self.command,
            steps: self.steps,
            idle_period: self.idle_period,
            quiet: self.quiet,
        })
    }

    fn push(mut self, prompt: String, timeout: Option<Duration>, handler: TriggerHandler) -> Self {
        self.steps.push(Step {
            prompt,
            timeout,
            handler,
        });
        self
    }
}

/// Intermediate builder state after [`ConversationBuilder::expect`].
pub struct ExpectStep {
    builder: ConversationBuilder,
    prompt: String,
    timeout: Option<Duration>,
}

impl ExpectStep {
    /// Answer the prompt with fixed text.
    pub fn reply(self, text: impl Into<String>) -> ConversationBuilder {
        let text = text.into();
        self.handler(Box::new(move || -> HandlerFuture {
            let reply = Reply::send(text.clone());
            Box::pin(async move { Ok(reply) })
        }))
    }

    /// Answer the prompt with whatever `handler` produces.
    pub fn reply_with<F, Fut>(self, mut handler: F) -> ConversationBuilder
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        self.handler(Box::new(move || -> HandlerFuture { Box::pin(handler()) }))
    }

    /// Reaching the prompt completes the conversation.
    pub fn finish(self) -> ConversationBuilder {
        self.handler(Box::new(|| -> HandlerFuture { Box::pin(async { Ok(Reply::Finish) }) }))
    }

    fn handler(self, handler: TriggerHandler) -> ConversationBuilder {
        self.builder.push(self.prompt, self.timeout, handler)
    }
}

/// A scripted dialogue ready to run against a port.
pub struct Conversation {
    command: Option<String>,
    steps: Vec<Step>,
    idle_period: Duration,
    quiet: bool,
}

impl Conversation {
    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the conversation has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run the conversation over `port`.
    ///
    /// A conversation without steps returns immediately and writes nothing.
    /// The port is left open.
    pub async fn run<P>(self, port: P) -> Result<ConversationResult>
    where
        P: AsyncRead + AsyncWrite + Unpin,
    {
        let started = Instant::now();
        if self.steps.is_empty() {
            return Ok(ConversationResult {
                steps: Vec::new(),
                elapsed: Duration::ZERO,
            });
        }

        let (reader, writer) = tokio::io::split(port);
        let mut trigger = PromptTrigger::new(StreamBatcher::new(reader, self.idle_period), writer);

        let deadline = Deadline::new();
        let records: Arc<Mutex<Vec<ConversationStep>>> = Arc::default();
        let first_timeout = self.steps[0].timeout;

        // Each step arms the deadline of the step after it.
        let next_timeouts: Vec<Option<Duration>> = self
            .steps
            .iter()
            .skip(1)
            .map(|step| step.timeout)
            .chain(std::iter::once(None))
            .collect();

        for (step, next_timeout) in self.steps.into_iter().zip(next_timeouts) {
            let handler = track_step(
                step.prompt.clone(),
                step.handler,
                next_timeout,
                deadline.clone(),
                records.clone(),
                started,
            );
            trigger.add_boxed_trigger(step.prompt, handler)?;
        }

        trigger.start(self.quiet);
        if let Some(command) = &self.command {
            trigger.respond(command, None).await?;
        }
        if let Some(timeout) = first_timeout {
            deadline.arm(timeout);
        }

        drive(&mut trigger, &deadline).await?;

        let steps = std::mem::take(&mut *records.lock().unwrap_or_else(PoisonError::into_inner));
        Ok(ConversationResult {
            steps,
            elapsed: started.elapsed(),
        })
    }
}

/// Wrap a step handler: clear the deadline on entry, record the step, and
/// arm the next step's deadline once the reply has drained.
fn track_step(
    prompt: String,
    mut handler: TriggerHandler,
    next_timeout: Option<Duration>,
    deadline: Deadline,
    records: Arc<Mutex<Vec<ConversationStep>>>,
    started: Instant,
) -> TriggerHandler {
    Box::new(move || -> HandlerFuture {
        deadline.clear();
        records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ConversationStep {
                prompt: prompt.clone(),
                elapsed: started.elapsed(),
            });

        let reply = handler();
        let deadline = deadline.clone();
        Box::pin(async move {
            let reply = reply.await?;
            Ok(match next_timeout {
                Some(timeout) => reply.and_then(move || deadline.arm(timeout)),
                None => reply,
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    fn claim_conversation(code: &str) -> Conversation {
        ConversationBuilder::new()
            .command("C")
            .expect("Enter 63-digit claim code: ", Duration::from_secs(2))
            .reply(format!("{}\n", code))
            .expect(format!("Claim code set to: {}", code), Duration::from_secs(2))
            .finish()
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_conversation_completes() {
        let (port, mut device) = duplex(1024);

        let device = tokio::spawn(async move {
            let mut command = [0u8; 1];
            device.read_exact(&mut command).await.unwrap();
            assert_eq!(&command, b"C");
            device.write_all(b"Enter 63-digit claim code: ").await.unwrap();

            let mut answer = [0u8; 5];
            device.read_exact(&mut answer).await.unwrap();
            assert_eq!(&answer, b"abcd\n");
            device.write_all(b"Claim code set to: abcd\r\n").await.unwrap();
            device
        });

        let result = claim_conversation("abcd").run(port).await.unwrap();
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[0].prompt, "Enter 63-digit claim code: ");
        assert_eq!(result.last_prompt(), Some("Claim code set to: abcd"));
        assert!(result.steps[0].elapsed <= result.steps[1].elapsed);

        let _device = device.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_prompt_timeout() {
        let (port, mut device) = duplex(1024);

        let device = tokio::spawn(async move {
            let mut command = [0u8; 1];
            device.read_exact(&mut command).await.unwrap();
            // keep the port open but never answer
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(device);
        });

        let err = claim_conversation("abcd").run(port).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Channel(ChannelError::Timeout(d)) if d == Duration::from_secs(2)
        ));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Channel error: Serial timed out after 2s");
        device.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_deadline_starts_after_reply() {
        for (delay, completes) in [(Duration::from_millis(1500), true), (Duration::from_secs(3), false)] {
            let (port, mut device) = duplex(1024);

            let device = tokio::spawn(async move {
                let mut command = [0u8; 1];
                device.read_exact(&mut command).await.unwrap();
                device.write_all(b"Enter 63-digit claim code: ").await.unwrap();

                let mut answer = [0u8; 3];
                device.read_exact(&mut answer).await.unwrap();
                tokio::time::sleep(delay).await;
                let _ = device.write_all(b"Claim code set to: xy").await;
                tokio::time::sleep(Duration::from_secs(60)).await;
            });

            let result = claim_conversation("xy").run(port).await;
            assert_eq!(result.is_ok(), completes, "delay {:?}", delay);
            device.abort();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_early() {
        let (port, mut device) = duplex(1024);

        let device = tokio::spawn(async move {
            let mut command = [0u8; 1];
            device.read_exact(&mut command).await.unwrap();
            device.write_all(b"Enter 63-digit").await.unwrap();
        });

        let err = claim_conversation("abcd").run(port).await.unwrap_err();
        assert!(matches!(err, Error::Channel(ChannelError::ClosedEarly)));
        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_conversation_writes_nothing() {
        let (port, mut device) = duplex(64);

        let conversation = ConversationBuilder::new().command("C").build().unwrap();
        assert!(conversation.is_empty());
        let result = conversation.run(port).await.unwrap();
        assert!(result.steps.is_empty());

        let mut written = Vec::new();
        device.read_to_end(&mut written).await.unwrap();
        assert!(written.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_untimed_step_waits() {
        let (port, mut device) = duplex(1024);

        let device = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(600)).await;
            device.write_all(b"ready> ").await.unwrap();
            device
        });

        let result = ConversationBuilder::new()
            .expect("ready> ", None)
            .finish()
            .build()
            .unwrap()
            .run(port)
            .await
            .unwrap();
        assert_eq!(result.last_prompt(), Some("ready> "));
        assert!(result.elapsed >= Duration::from_secs(600));

        let _device = device.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_with_handler() {
        let (port, mut device) = duplex(1024);

        let device = tokio::spawn(async move {
            device.write_all(b"Name: ").await.unwrap();
            let mut answer = [0u8; 6];
            device.read_exact(&mut answer).await.unwrap();
            device.write_all(b"Hello, photon").await.unwrap();
            answer
        });

        ConversationBuilder::new()
            .expect("Name: ", Duration::from_secs(1))
            .reply_with(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Reply::send("photon"))
            })
            .expect("Hello, photon", Duration::from_secs(1))
            .finish()
            .build()
            .unwrap()
            .run(port)
            .await
            .unwrap();

        assert_eq!(&device.await.unwrap(), b"photon");
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_continuation_runs_before_next_step() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (port, mut device) = duplex(1024);
        let ran = Arc::new(AtomicUsize::new(0));

        let device = tokio::spawn(async move {
            device.write_all(b"A:").await.unwrap();
            let mut answer = [0u8; 2];
            device.read_exact(&mut answer).await.unwrap();
            device.write_all(b"B:").await.unwrap();
            device
        });

        let counter = ran.clone();
        ConversationBuilder::new()
            .expect("A:", Duration::from_secs(2))
            .reply_with(move || {
                let counter = counter.clone();
                async move {
                    Ok(Reply::send("x\n").and_then(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }))
                }
            })
            .expect("B:", Duration::from_secs(2))
            .finish()
            .build()
            .unwrap()
            .run(port)
            .await
            .unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        let _device = device.await.unwrap();
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let result = ConversationBuilder::new().expect("", None).finish().build();
        assert!(matches!(result, Err(Error::Channel(ChannelError::EmptyPrompt))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_arm_and_clear() {
        let deadline = Deadline::new();
        assert!(!deadline.is_armed());

        deadline.arm(Duration::from_secs(5));
        assert!(deadline.is_armed());
        let armed = deadline.armed().unwrap();
        assert_eq!(armed.after, Duration::from_secs(5));
        assert_eq!(armed.at, Instant::now() + Duration::from_secs(5));

        deadline.clone().clear();
        assert!(!deadline.is_armed());
    }
}
