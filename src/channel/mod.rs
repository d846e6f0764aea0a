pub mod telegram;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::request::ChannelMessageRef;

pub use telegram::TelegramChannel;

/// One inline button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub text: String,
    /// Opaque callback data returned when the button is pressed.
    pub data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: data.into(),
        }
    }
}

/// Rows of inline buttons under a message.
pub type Keyboard = Vec<Vec<Button>>;

/// An operator event coming from the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A button press on one of our messages.
    Callback {
        callback_id: String,
        message: ChannelMessageRef,
        data: String,
    },
    /// A text message, optionally replying to one of our messages.
    Text {
        message: ChannelMessageRef,
        reply_to: Option<i64>,
        text: String,
    },
    /// A voice message, to be transcribed before it is handled like text.
    Voice {
        message: ChannelMessageRef,
        reply_to: Option<i64>,
        file_id: String,
    },
}

impl InboundEvent {
    pub fn chat_id(&self) -> i64 {
        match self {
            InboundEvent::Callback { message, .. }
            | InboundEvent::Text { message, .. }
            | InboundEvent::Voice { message, .. } => message.chat_id,
        }
    }
}

/// The messaging platform as seen by the coordinator: a render/resolve surface.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Start receiving operator events. Push each one to `tx`.
    async fn start(&self, tx: mpsc::Sender<InboundEvent>) -> Result<()>;

    /// Send a message, with buttons if given.
    async fn send(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<ChannelMessageRef>;

    /// Replace a message's text and buttons. `None` removes the buttons.
    async fn edit(
        &self,
        message: &ChannelMessageRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()>;

    /// Acknowledge a button press, optionally with a short toast.
    async fn answer_interaction(&self, callback_id: &str, text: Option<&str>) -> Result<()>;

    /// Set (or with `None`, clear) a reaction on a message.
    async fn react(&self, message: &ChannelMessageRef, emoji: Option<&str>) -> Result<()>;

    /// Maximum characters in one message.
    fn max_message_len(&self) -> usize;
}

/// Speech-to-text for voice replies.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, file_id: &str) -> Result<String>;
}
