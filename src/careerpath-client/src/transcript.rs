//! Conversation transcript and the reducer that applies stream events to it.
//!
//! Invariant: at most one message is open (still receiving events), and
//! when there is one it is the last message of the transcript.

use serde::Serialize;
use tracing::{debug, warn};

use crate::interpret::{StreamEvent, preview};
use crate::types::ChatMessage;

/// Ordered conversation log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    open: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a transcript from finished messages, e.g. a quiz result handed
    /// to a follow-up chat screen.
    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            open: false,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// The message still receiving events, if any.
    pub fn open_message(&self) -> Option<&ChatMessage> {
        if self.open { self.messages.last() } else { None }
    }

    pub fn has_open_message(&self) -> bool {
        self.open
    }

    /// Append a user message. Any open message is closed first.
    pub fn push_user(&mut self, text: impl Into<String>) {
        if self.close_open() {
            warn!("Closing an open reply before appending a user message");
        }
        self.messages.push(ChatMessage::user(text));
    }

    /// Append the empty assistant entry the next reply streams into.
    pub(crate) fn open_placeholder(&mut self) {
        self.close_open();
        self.messages.push(ChatMessage::assistant(String::new()));
        self.open = true;
    }

    fn open_mut(&mut self) -> Option<&mut ChatMessage> {
        if self.open {
            self.messages.last_mut()
        } else {
            None
        }
    }

    /// Close the open message. Returns whether one was open.
    fn close_open(&mut self) -> bool {
        std::mem::replace(&mut self.open, false)
    }
}

/// Counters for frames that did not change the transcript.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Frames dropped as malformed, protocol violations included.
    pub malformed_frames: u64,
    /// Well-formed events that arrived with no open message to apply to.
    pub protocol_violations: u64,
    /// Events that mutated the transcript.
    pub events_applied: u64,
}

/// Effect of one event on the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The open message changed.
    Updated,
    /// The open message was closed.
    Closed,
    /// Nothing changed.
    Ignored,
}

impl Applied {
    /// Whether a new snapshot should be published.
    pub fn changed(self) -> bool {
        !matches!(self, Applied::Ignored)
    }
}

/// Applies events to a transcript in arrival order.
#[derive(Debug, Default)]
pub struct TranscriptReducer {
    transcript: Transcript,
    diagnostics: Diagnostics,
    tokens_applied: u64,
}

impl TranscriptReducer {
    pub fn new(transcript: Transcript) -> Self {
        Self {
            transcript,
            diagnostics: Diagnostics::default(),
            tokens_applied: 0,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    /// Token events applied to the current open message.
    pub fn tokens_applied(&self) -> u64 {
        self.tokens_applied
    }

    /// Append the user's message and an open assistant placeholder.
    pub fn begin_reply(&mut self, user_text: impl Into<String>) {
        self.transcript.push_user(user_text);
        self.transcript.open_placeholder();
        self.tokens_applied = 0;
    }

    /// Apply one event.
    pub fn apply(&mut self, event: StreamEvent) -> Applied {
        let applied = match event {
            StreamEvent::Token { cumulative_text } => match self.transcript.open_mut() {
                Some(message) => {
                    // Cumulative protocol: every token carries the full text so far.
                    message.text = cumulative_text;
                    self.tokens_applied += 1;
                    Applied::Updated
                }
                None => self.violation("token"),
            },
            StreamEvent::Sources { citations } => match self.transcript.open_mut() {
                Some(message) => {
                    debug!(count = citations.len(), "Attaching citations");
                    message.citations = citations;
                    Applied::Updated
                }
                None => self.violation("sources"),
            },
            StreamEvent::Done => {
                if self.transcript.close_open() {
                    Applied::Closed
                } else {
                    self.violation("done")
                }
            }
            StreamEvent::Malformed { raw_payload } => {
                self.diagnostics.malformed_frames += 1;
                warn!(payload = %preview(&raw_payload), "Skipping malformed stream frame");
                Applied::Ignored
            }
        };

        if applied.changed() {
            self.diagnostics.events_applied += 1;
        }
        applied
    }

    /// Close the open message as a successful end of stream.
    pub fn close(&mut self) -> bool {
        self.transcript.close_open()
    }

    /// Replace the open reply with a user-visible failure notice and close it.
    pub fn fail(&mut self, notice: &str) {
        if let Some(message) = self.transcript.open_mut() {
            message.text = notice.to_string();
            message.citations.clear();
        } else {
            // The reply already closed; the failure still gets exactly one entry.
            self.transcript.messages.push(ChatMessage::assistant(notice));
        }
        self.transcript.close_open();
    }

    /// Stop after a cancellation, keeping what was applied. A placeholder
    /// that never received anything is dropped.
    pub fn cancel(&mut self) {
        let untouched = self
            .transcript
            .open_message()
            .is_some_and(|m| m.text.is_empty() && m.citations.is_empty());
        if untouched {
            self.transcript.messages.pop();
        }
        self.transcript.close_open();
    }

    pub fn into_parts(self) -> (Transcript, Diagnostics) {
        (self.transcript, self.diagnostics)
    }

    fn violation(&mut self, kind: &'static str) -> Applied {
        self.diagnostics.protocol_violations += 1;
        self.diagnostics.malformed_frames += 1;
        warn!(event = kind, "Stream event arrived with no open reply; ignoring");
        Applied::Ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Citation, Sender};
    use pretty_assertions::assert_eq;

    fn token(text: &str) -> StreamEvent {
        StreamEvent::Token {
            cumulative_text: text.to_string(),
        }
    }

    fn citation(topic: &str) -> Citation {
        Citation {
            source_content: format!("{topic} passage"),
            topic: topic.to_string(),
            section: "Overview".to_string(),
        }
    }

    fn streaming_reducer() -> TranscriptReducer {
        let mut reducer = TranscriptReducer::new(Transcript::new());
        reducer.begin_reply("What should I study?");
        reducer
    }

    #[test]
    fn test_begin_reply_seeds_placeholder() {
        let reducer = streaming_reducer();
        let transcript = reducer.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[0].sender, Sender::User);
        let open = transcript.open_message().expect("open placeholder");
        assert!(open.is_assistant());
        assert_eq!(open.text, "");
    }

    #[test]
    fn test_tokens_replace_not_concatenate() {
        let mut reducer = streaming_reducer();
        for text in ["Data", "Data science", "Data science is a good fit."] {
            assert_eq!(reducer.apply(token(text)), Applied::Updated);
        }
        assert_eq!(
            reducer.transcript().open_message().unwrap().text,
            "Data science is a good fit."
        );
        assert_eq!(reducer.tokens_applied(), 3);
    }

    #[test]
    fn test_text_equals_last_token_for_any_sequence() {
        let sequences: &[&[&str]] = &[
            &["a"],
            &["abc", "ab"],
            &["x", "x", "x"],
            &["long text", "", "short"],
        ];
        for seq in sequences {
            let mut reducer = streaming_reducer();
            for text in seq.iter() {
                reducer.apply(token(text));
            }
            let last = seq.last().copied().unwrap_or_default();
            assert_eq!(reducer.transcript().last().unwrap().text, last);
        }
    }

    #[test]
    fn test_sources_attach_without_closing() {
        let mut reducer = streaming_reducer();
        reducer.apply(token("Hello"));
        reducer.apply(token("Hello there"));
        assert_eq!(
            reducer.apply(StreamEvent::Sources {
                citations: vec![citation("Careers")]
            }),
            Applied::Updated
        );
        assert!(reducer.transcript().has_open_message());
        assert_eq!(reducer.apply(StreamEvent::Done), Applied::Closed);

        let last = reducer.transcript().last().unwrap();
        assert_eq!(last.text, "Hello there");
        assert_eq!(last.citations, vec![citation("Careers")]);
    }

    #[test]
    fn test_done_closes_exactly_once() {
        let mut reducer = streaming_reducer();
        reducer.apply(token("final"));
        assert_eq!(reducer.apply(StreamEvent::Done), Applied::Closed);

        assert_eq!(reducer.apply(token("late")), Applied::Ignored);
        assert_eq!(
            reducer.apply(StreamEvent::Sources {
                citations: vec![citation("Late")]
            }),
            Applied::Ignored
        );
        assert_eq!(reducer.apply(StreamEvent::Done), Applied::Ignored);

        let last = reducer.transcript().last().unwrap();
        assert_eq!(last.text, "final");
        assert!(last.citations.is_empty());
        let diagnostics = reducer.diagnostics();
        assert_eq!(diagnostics.protocol_violations, 3);
        assert_eq!(diagnostics.malformed_frames, 3);
    }

    #[test]
    fn test_malformed_between_tokens_is_noop() {
        let mut reducer = streaming_reducer();
        reducer.apply(token("Hel"));
        assert_eq!(
            reducer.apply(StreamEvent::Malformed {
                raw_payload: "{\"type\":".to_string()
            }),
            Applied::Ignored
        );
        reducer.apply(token("Hello"));
        assert_eq!(reducer.transcript().last().unwrap().text, "Hello");
        assert_eq!(reducer.diagnostics().malformed_frames, 1);
        assert_eq!(reducer.diagnostics().protocol_violations, 0);
        assert_eq!(reducer.diagnostics().events_applied, 2);
    }

    #[test]
    fn test_token_without_placeholder_is_violation() {
        let mut reducer = TranscriptReducer::new(Transcript::from_messages(vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ]));
        assert_eq!(reducer.apply(token("rogue")), Applied::Ignored);
        assert_eq!(reducer.transcript().last().unwrap().text, "hello");
        assert_eq!(reducer.diagnostics().protocol_violations, 1);
    }

    #[test]
    fn test_fail_overwrites_open_reply() {
        let mut reducer = streaming_reducer();
        reducer.apply(token("partial"));
        reducer.apply(StreamEvent::Sources {
            citations: vec![citation("Careers")],
        });
        reducer.fail("Sorry");

        let transcript = reducer.transcript();
        assert!(!transcript.has_open_message());
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.last().unwrap(), &ChatMessage::assistant("Sorry"));
    }

    #[test]
    fn test_cancel_keeps_partial_text() {
        let mut reducer = streaming_reducer();
        reducer.apply(token("Half an ans"));
        reducer.cancel();
        let transcript = reducer.transcript();
        assert!(!transcript.has_open_message());
        assert_eq!(transcript.last().unwrap().text, "Half an ans");
    }

    #[test]
    fn test_cancel_drops_untouched_placeholder() {
        let mut reducer = streaming_reducer();
        reducer.cancel();
        let transcript = reducer.transcript();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.last().unwrap().sender, Sender::User);
    }

    #[test]
    fn test_push_user_closes_open_reply() {
        let mut transcript = Transcript::new();
        transcript.push_user("one");
        transcript.open_placeholder();
        transcript.push_user("two");
        assert!(!transcript.has_open_message());
        assert_eq!(transcript.len(), 3);
    }
}
