//! Stream session controller.
//!
//! A [`ChatSession`] is one conversation. Each [`ChatSession::send`] starts
//! a session task that owns the decoder and the reducer for the duration of
//! one reply and publishes [`Snapshot`]s through a watch channel shared by
//! every subscriber of the conversation.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::decoder::FrameDecoder;
use crate::error::{Result, StreamError};
use crate::interpret::{StreamEvent, interpret, reply_events};
use crate::request::{ChatRequest, Endpoint};
use crate::transcript::{Applied, Diagnostics, Transcript, TranscriptReducer};
use crate::transport::{HttpTransport, Transport};

/// Text shown in place of a reply that failed.
pub const FAILURE_NOTICE: &str = "Sorry, something went wrong. Please try again.";

/// How a successful session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The server sent `[DONE]`, or a one-shot reply arrived.
    Done,
    /// The body ended without `[DONE]` after at least one token.
    EndOfStream,
    /// The caller cancelled; applied text was kept.
    Cancelled,
}

/// Coarse failure category, free of transport detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Non-success HTTP status.
    Status(u16),
    /// Connect or read failure.
    Transport,
    /// The body ended before any token.
    Truncated,
    Internal,
}

impl From<&StreamError> for FailureKind {
    fn from(err: &StreamError) -> Self {
        match err {
            StreamError::Status { status, .. } => FailureKind::Status(*status),
            StreamError::Network(_) => FailureKind::Transport,
            StreamError::Truncated => FailureKind::Truncated,
            _ => FailureKind::Internal,
        }
    }
}

/// Lifecycle of one reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    /// Request issued, no response yet.
    Sending,
    /// Response body is being read.
    Streaming,
    Finalized(std::result::Result<Completion, FailureKind>),
}

impl SessionState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, SessionState::Sending | SessionState::Streaming)
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self, SessionState::Finalized(_))
    }
}

/// What collaborators render: the state and the transcript as of the last
/// applied event.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub state: SessionState,
    pub transcript: Arc<Transcript>,
}

/// Outcome of a finished session task.
#[derive(Debug)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub state: SessionState,
    pub transcript: Transcript,
    pub diagnostics: Diagnostics,
    /// The error behind a failed state, for logs and callers. Never shown
    /// to the user.
    pub error: Option<StreamError>,
}

impl SessionReport {
    pub fn completion(&self) -> Option<Completion> {
        match self.state {
            SessionState::Finalized(Ok(completion)) => Some(completion),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.state, SessionState::Finalized(Ok(_)))
    }
}

/// Handle to one in-flight reply.
#[derive(Debug)]
pub struct StreamHandle {
    session_id: Uuid,
    snapshots: watch::Receiver<Snapshot>,
    cancel: CancellationToken,
    task: JoinHandle<SessionReport>,
}

impl StreamHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Receiver that is notified after every applied event.
    pub fn snapshots(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Request cancellation. Takes effect before the next chunk is read.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the session to finalize.
    pub async fn finish(self) -> Result<SessionReport> {
        self.task
            .await
            .map_err(|e| StreamError::internal(format!("session task failed: {e}")))
    }
}

/// One conversation against the guidance server.
pub struct ChatSession<T = HttpTransport> {
    transport: Arc<T>,
    default_model: String,
    history_limit: Option<usize>,
    publisher: Arc<watch::Sender<Snapshot>>,
    cancel: Option<CancellationToken>,
}

impl ChatSession<HttpTransport> {
    /// Conversation over HTTP using `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport + 'static> ChatSession<T> {
    pub fn new(transport: T, config: &ClientConfig) -> Self {
        let (publisher, _) = watch::channel(Snapshot::default());
        Self {
            transport: Arc::new(transport),
            default_model: config.model.clone(),
            history_limit: config.history_limit,
            publisher: Arc::new(publisher),
            cancel: None,
        }
    }

    /// Continue an existing conversation.
    pub fn with_transcript(self, transcript: Transcript) -> Self {
        self.publisher.send_replace(Snapshot {
            state: SessionState::Idle,
            transcript: Arc::new(transcript),
        });
        self
    }

    /// State of the current or most recent reply.
    pub fn state(&self) -> SessionState {
        self.publisher.borrow().state
    }

    /// Latest published transcript.
    pub fn transcript(&self) -> Arc<Transcript> {
        self.publisher.borrow().transcript.clone()
    }

    /// Receiver for this conversation's snapshots, across all replies.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.publisher.subscribe()
    }

    /// Cancel the in-flight reply, if any.
    pub fn cancel(&self) {
        if let Some(token) = &self.cancel {
            token.cancel();
        }
    }

    /// Submit a message and start streaming its reply.
    ///
    /// Fails with [`StreamError::Busy`] without touching the network while a
    /// previous reply is still in flight.
    pub fn send(&mut self, request: ChatRequest) -> Result<StreamHandle> {
        if self.state().is_in_flight() {
            debug!(endpoint = %request.endpoint, "Rejecting send while a reply is in flight");
            return Err(StreamError::Busy);
        }

        let prior = self.transcript();
        let body = request.wire_body(prior.messages(), &self.default_model, self.history_limit)?;

        let mut reducer = TranscriptReducer::new((*prior).clone());
        reducer.begin_reply(request.text.as_str());
        self.publisher.send_replace(Snapshot {
            state: SessionState::Sending,
            transcript: Arc::new(reducer.transcript().clone()),
        });

        let session_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        let task = SessionTask {
            session_id,
            endpoint: request.endpoint,
            reducer,
            publisher: self.publisher.clone(),
            state: SessionState::Sending,
            cancel: cancel.clone(),
            finalized: false,
        };
        let span = tracing::info_span!(
            "chat_session",
            session_id = %session_id,
            endpoint = %request.endpoint
        );
        let transport = self.transport.clone();
        let handle = tokio::spawn(task.run(transport, body).instrument(span));

        Ok(StreamHandle {
            session_id,
            snapshots: self.publisher.subscribe(),
            cancel,
            task: handle,
        })
    }
}

/// State owned by the spawned task for one reply.
struct SessionTask {
    session_id: Uuid,
    endpoint: Endpoint,
    reducer: TranscriptReducer,
    publisher: Arc<watch::Sender<Snapshot>>,
    state: SessionState,
    cancel: CancellationToken,
    finalized: bool,
}

impl SessionTask {
    async fn run<T: Transport + ?Sized>(mut self, transport: Arc<T>, body: Value) -> SessionReport {
        info!("Session started");
        let outcome = self.drive(transport.as_ref(), &body).await;
        self.finalize(outcome)
    }

    async fn drive<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        body: &Value,
    ) -> Result<Completion> {
        if !self.endpoint.is_streaming() {
            let reply = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(Completion::Cancelled),
                reply = transport.fetch_reply(self.endpoint, body) => reply?,
            };
            self.set_state(SessionState::Streaming);
            for event in reply_events(reply) {
                self.apply(event);
            }
            return Ok(Completion::Done);
        }

        let mut chunks = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(Completion::Cancelled),
            opened = transport.open_stream(self.endpoint, body) => opened?,
        };
        self.set_state(SessionState::Streaming);

        let mut decoder = FrameDecoder::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    decoder.finish();
                    return Ok(Completion::Cancelled);
                }
                next = chunks.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            for frame in decoder.feed(&chunk?) {
                if self.apply(interpret(frame)) == Applied::Closed {
                    debug!(frames = decoder.frames_decoded(), "Stream completed");
                    return Ok(Completion::Done);
                }
            }
        }

        decoder.finish();
        if self.reducer.tokens_applied() == 0 {
            return Err(StreamError::Truncated);
        }
        Ok(Completion::EndOfStream)
    }

    fn apply(&mut self, event: StreamEvent) -> Applied {
        debug!(event = event.kind(), "Applying stream event");
        let applied = self.reducer.apply(event);
        if applied.changed() {
            self.publish();
        }
        applied
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        self.publisher.send_replace(Snapshot {
            state: self.state,
            transcript: Arc::new(self.reducer.transcript().clone()),
        });
    }

    fn finalize(&mut self, outcome: Result<Completion>) -> SessionReport {
        let (state, error) = match outcome {
            Ok(Completion::Cancelled) => {
                self.reducer.cancel();
                (SessionState::Finalized(Ok(Completion::Cancelled)), None)
            }
            Ok(completion) => {
                self.reducer.close();
                (SessionState::Finalized(Ok(completion)), None)
            }
            Err(e) => {
                error!(error = %e, "Session failed");
                self.reducer.fail(FAILURE_NOTICE);
                (SessionState::Finalized(Err(FailureKind::from(&e))), Some(e))
            }
        };

        self.finalized = true;
        self.set_state(state);

        let diagnostics = self.reducer.diagnostics();
        info!(
            state = ?state,
            malformed_frames = diagnostics.malformed_frames,
            events_applied = diagnostics.events_applied,
            "Session finished"
        );

        SessionReport {
            session_id: self.session_id,
            state,
            transcript: self.reducer.transcript().clone(),
            diagnostics,
            error,
        }
    }
}

impl Drop for SessionTask {
    /// An aborted or panicked task still leaves the conversation usable.
    fn drop(&mut self) {
        if !self.finalized {
            self.reducer.fail(FAILURE_NOTICE);
            self.state = SessionState::Finalized(Err(FailureKind::Internal));
            self.publish();
        }
    }
}
