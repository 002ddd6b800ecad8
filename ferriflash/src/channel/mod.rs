//! Channel layer: idle batching and prompt-driven dialogues.
//!
//! Raw port reads go through a [`StreamBatcher`] so that each item is one
//! burst of device output; a [`PromptTrigger`] consumes those bursts and
//! answers the prompts it recognises.

mod batcher;
mod scanner;
mod timer;
mod trigger;

pub use batcher::{Batcher, DEFAULT_IDLE_PERIOD, StreamBatcher};
pub use scanner::PromptScanner;
pub use timer::{IdleTimer, ManualTimer, TokioTimer};
pub use trigger::{AfterSent, Flow, HandlerFuture, PromptTrigger, Reply, TriggerHandler};
