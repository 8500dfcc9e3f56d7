//! Streaming chat client for the careerpath guidance API.
//!
//! Replies arrive as server-sent events. The pipeline is
//! bytes → [`FrameDecoder`] → [`interpret`] → [`TranscriptReducer`], driven
//! by a [`ChatSession`] that owns the request lifecycle and publishes
//! transcript [`Snapshot`]s to the front-end.

pub mod config;
pub mod decoder;
pub mod error;
pub mod interpret;
pub mod request;
pub mod session;
pub mod transcript;
pub mod transport;
pub mod types;

pub use config::ClientConfig;
pub use decoder::{DecodedFrame, FrameDecoder, StreamFrame};
pub use error::{Result, StreamError};
pub use interpret::{StreamEvent, interpret};
pub use request::{ChatRequest, CsQuizAnswers, Endpoint, FlowPayload};
pub use session::{
    ChatSession, Completion, FAILURE_NOTICE, FailureKind, SessionReport, SessionState, Snapshot,
    StreamHandle,
};
pub use transcript::{Applied, Diagnostics, Transcript, TranscriptReducer};
pub use transport::{ByteStream, HttpTransport, Transport};
pub use types::{ChatMessage, Citation, Sender};
