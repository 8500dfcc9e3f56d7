//! Conversation types shared between the stream pipeline and its front-ends.
//!
//! These types carry no UI concerns; a renderer only reads them.

use serde::{Deserialize, Serialize};

/// Who authored a message.
///
/// The server names the assistant `bot` in history entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    #[serde(rename = "bot")]
    Assistant,
}

impl Sender {
    /// Wire name used in request history.
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "bot",
        }
    }
}

/// Source citation attached to an assistant reply.
///
/// Passed through as received; only its shape is checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Retrieved passage the answer was grounded on.
    pub source_content: String,
    /// Knowledge-base topic of the passage.
    pub topic: String,
    /// Section within the topic.
    pub section: String,
}

/// A single entry of a conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
}

impl ChatMessage {
    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            citations: Vec::new(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
            citations: Vec::new(),
        }
    }

    /// Check if this message was written by the assistant.
    pub fn is_assistant(&self) -> bool {
        self.sender == Sender::Assistant
    }
}
