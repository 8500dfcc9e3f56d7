//! Frame interpretation.
//!
//! Classifies decoded frames into the closed [`StreamEvent`] set. Anything
//! that does not match a known shape degrades to [`StreamEvent::Malformed`].

use serde::Deserialize;

use crate::decoder::DecodedFrame;
use crate::types::Citation;

/// Semantic event produced from one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Full reply text generated so far (not a delta).
    Token { cumulative_text: String },
    /// Citations for the reply being streamed.
    Sources { citations: Vec<Citation> },
    /// End of the reply.
    Done,
    /// Frame that could not be interpreted.
    Malformed { raw_payload: String },
}

impl StreamEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Token { .. } => "token",
            StreamEvent::Sources { .. } => "sources",
            StreamEvent::Done => "done",
            StreamEvent::Malformed { .. } => "malformed",
        }
    }
}

/// Wire shape of a payload, discriminated by `type`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    Token {
        content: String,
        /// Sent by some endpoints on the last token; carries no extra meaning.
        #[serde(default)]
        #[allow(dead_code)]
        is_final: bool,
    },
    Sources {
        sources: Vec<WireSource>,
    },
}

#[derive(Debug, Deserialize)]
struct WireSource {
    content: String,
    #[serde(default)]
    metadata: WireSourceMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct WireSourceMetadata {
    #[serde(default)]
    topic: String,
    #[serde(default)]
    section: String,
}

impl From<WireSource> for Citation {
    fn from(source: WireSource) -> Self {
        Self {
            source_content: source.content,
            topic: source.metadata.topic,
            section: source.metadata.section,
        }
    }
}

/// Interpret one decoded frame. Never fails.
pub fn interpret(frame: DecodedFrame) -> StreamEvent {
    let frame = match frame {
        DecodedFrame::Done => return StreamEvent::Done,
        DecodedFrame::Data(frame) => frame,
    };

    match serde_json::from_str::<WireEvent>(&frame.raw_payload) {
        Ok(WireEvent::Token { content, .. }) => StreamEvent::Token {
            cumulative_text: content,
        },
        Ok(WireEvent::Sources { sources }) => StreamEvent::Sources {
            citations: sources.into_iter().map(Citation::from).collect(),
        },
        Err(e) => {
            tracing::debug!(error = %e, payload = %preview(&frame.raw_payload), "Unrecognized stream frame");
            StreamEvent::Malformed {
                raw_payload: frame.raw_payload,
            }
        }
    }
}

/// Interpret a one-shot reply as a degenerate stream: one token, then done.
pub fn reply_events(reply: String) -> [StreamEvent; 2] {
    [
        StreamEvent::Token {
            cumulative_text: reply,
        },
        StreamEvent::Done,
    ]
}

/// Bounded payload excerpt for log lines.
pub(crate) fn preview(payload: &str) -> &str {
    const MAX: usize = 120;
    if payload.len() <= MAX {
        return payload;
    }
    let mut end = MAX;
    while !payload.is_char_boundary(end) {
        end -= 1;
    }
    &payload[..end]
}
