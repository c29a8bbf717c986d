//! Stream consumers: one task per chunked connection.
//!
//! A consumer opens its endpoint, decodes messages as they arrive and forwards
//! them over an mpsc channel in arrival order. It never retries: on any
//! connection failure it reports [`StreamEvent::Failed`] once and exits.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decoder::JsonStreamDecoder;
use crate::error::StreamError;
use crate::types::{
    ActivePresentation, ActivePresentationResponse, SlideIndexEvent, SlideIndexResponse,
};

/// The two state streams the controller offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    ActivePresentation,
    SlideIndex,
}

impl StreamKind {
    pub fn path(self) -> &'static str {
        match self {
            StreamKind::ActivePresentation => "/v1/presentation/active?chunked=true",
            StreamKind::SlideIndex => "/v1/presentation/slide_index?chunked=true",
        }
    }

    /// The slide-index stream opens every connection with a message that only
    /// marks the start of the chunked response and carries no change.
    pub fn discards_first_message(self) -> bool {
        matches!(self, StreamKind::SlideIndex)
    }

    /// Decode a raw message. `None` means heartbeat: a null payload or one
    /// that does not have the expected shape.
    pub fn interpret(self, value: Value) -> Option<StreamMessage> {
        match self {
            StreamKind::ActivePresentation => {
                match serde_json::from_value::<ActivePresentationResponse>(value) {
                    Ok(response) => response.presentation.map(StreamMessage::Presentation),
                    Err(e) => {
                        debug!(stream = %self, "ignoring malformed message: {}", e);
                        None
                    }
                }
            }
            StreamKind::SlideIndex => match serde_json::from_value::<SlideIndexResponse>(value) {
                Ok(response) => response.presentation_index.map(StreamMessage::SlideIndex),
                Err(e) => {
                    debug!(stream = %self, "ignoring malformed message: {}", e);
                    None
                }
            },
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::ActivePresentation => write!(f, "active presentation"),
            StreamKind::SlideIndex => write!(f, "slide index"),
        }
    }
}

/// A decoded, non-null message
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Presentation(ActivePresentation),
    SlideIndex(SlideIndexEvent),
}

/// Events emitted by a consumer. `generation` identifies the connection
/// attempt the event belongs to so the receiver can drop stale events.
#[derive(Debug)]
pub enum StreamEvent {
    /// The controller accepted the request
    Connected { kind: StreamKind, generation: u64 },
    /// A message with a payload
    Message {
        kind: StreamKind,
        generation: u64,
        message: StreamMessage,
    },
    /// A null or malformed message
    Heartbeat { kind: StreamKind, generation: u64 },
    /// The connection is gone; the consumer has exited
    Failed {
        kind: StreamKind,
        generation: u64,
        error: StreamError,
    },
}

impl StreamEvent {
    pub fn kind(&self) -> StreamKind {
        match self {
            StreamEvent::Connected { kind, .. }
            | StreamEvent::Message { kind, .. }
            | StreamEvent::Heartbeat { kind, .. }
            | StreamEvent::Failed { kind, .. } => *kind,
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            StreamEvent::Connected { generation, .. }
            | StreamEvent::Message { generation, .. }
            | StreamEvent::Heartbeat { generation, .. }
            | StreamEvent::Failed { generation, .. } => *generation,
        }
    }
}

/// One persistent connection to one controller stream
pub struct StreamConsumer {
    client: reqwest::Client,
    url: String,
    kind: StreamKind,
    generation: u64,
    events: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
}

impl StreamConsumer {
    /// `base_url` is the controller root, e.g. `http://127.0.0.1:1256`.
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        kind: StreamKind,
        generation: u64,
        events: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), kind.path()),
            kind,
            generation,
            events,
            cancel,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Stream until the connection fails or the token is cancelled.
    pub async fn run(self) {
        let result = tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!(stream = %self.kind, generation = self.generation, "stream cancelled");
                return;
            }
            result = self.stream() => result,
        };

        if let Err(error) = result {
            let _ = self
                .events
                .send(StreamEvent::Failed {
                    kind: self.kind,
                    generation: self.generation,
                    error,
                })
                .await;
        }
    }

    /// Returns `Ok(())` only when the receiving side has gone away.
    async fn stream(&self) -> Result<(), StreamError> {
        let mut response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(StreamError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            warn!(stream = %self.kind, "Error connecting to {}: {}", self.kind, status);
            return Err(StreamError::Status(status));
        }

        info!(stream = %self.kind, generation = self.generation, "Connected to {}", self.kind);
        if !self.emit(StreamEvent::Connected {
            kind: self.kind,
            generation: self.generation,
        })
        .await
        {
            return Ok(());
        }

        let mut decoder = JsonStreamDecoder::new();
        let mut awaiting_first = self.kind.discards_first_message();

        loop {
            let Some(chunk) = response.chunk().await.map_err(StreamError::Read)? else {
                return Err(StreamError::Closed);
            };

            for frame in decoder.push(&chunk) {
                if awaiting_first {
                    awaiting_first = false;
                    debug!(stream = %self.kind, "discarding initial message");
                    continue;
                }

                let message = match frame {
                    Ok(value) => self.kind.interpret(value),
                    Err(e) => {
                        debug!(stream = %self.kind, "skipping undecodable segment: {}", e);
                        None
                    }
                };

                let event = match message {
                    Some(message) => StreamEvent::Message {
                        kind: self.kind,
                        generation: self.generation,
                        message,
                    },
                    None => StreamEvent::Heartbeat {
                        kind: self.kind,
                        generation: self.generation,
                    },
                };

                if !self.emit(event).await {
                    return Ok(());
                }
            }
        }
    }

    async fn emit(&self, event: StreamEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}
