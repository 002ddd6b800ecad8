//! Device dialogues over the listening-mode console.
//!
//! The driver layer puts the channel pieces to work: scripted
//! [`Conversation`]s with per-step deadlines, the Wi-Fi provisioning
//! dialogue ([`WifiSetup`]) and one-shot commands ([`DeviceConsole`]).

pub mod commands;
mod conversation;
pub mod wifi;

pub use commands::{Antenna, DeviceConsole, DeviceIdentity, IpConfig};
pub use conversation::{
    Conversation, ConversationBuilder, ConversationResult, ConversationStep, Deadline, ExpectStep,
};
pub use wifi::{
    AnswerSource, Cipher, EapMethod, NoAnswers, Question, Security, WifiCredentials, WifiSetup,
    configure_wifi,
};
