//! ProPresenter client - typed access to the controller's chunked state streams
//!
//! ProPresenter exposes its live state over long-lived chunked HTTP responses.
//! Each response carries a sequence of JSON objects, one per state change.
//! This crate provides:
//! - Serde models for the active-presentation and slide-index payloads
//! - An incremental decoder that splits a byte stream into JSON messages
//! - A [`StreamConsumer`] task that holds one connection and forwards typed
//!   [`StreamEvent`]s over an mpsc channel
//!
//! It has no knowledge of what the state is used for. Reconnecting is left to
//! the caller: a consumer reports its failure once and exits.
//!
//! # Example
//!
//! ```no_run
//! use propresenter_client::{StreamConsumer, StreamEvent, StreamKind};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (tx, mut rx) = mpsc::channel(64);
//!     StreamConsumer::new(
//!         reqwest::Client::new(),
//!         "http://127.0.0.1:1256",
//!         StreamKind::SlideIndex,
//!         1,
//!         tx,
//!         CancellationToken::new(),
//!     )
//!     .spawn();
//!
//!     while let Some(event) = rx.recv().await {
//!         match event {
//!             StreamEvent::Message { message, .. } => println!("{message:?}"),
//!             StreamEvent::Failed { error, .. } => {
//!                 println!("stream failed: {error}");
//!                 break;
//!             }
//!             _ => {}
//!         }
//!     }
//! }
//! ```

pub mod decoder;
mod error;
pub mod stream;
pub mod types;

pub use decoder::JsonStreamDecoder;
pub use error::{DecodeError, StreamError};
pub use stream::{StreamConsumer, StreamEvent, StreamKind, StreamMessage};
pub use types::{
    ActivePresentation, ActivePresentationResponse, Color, Group, PresentationId, Size, Slide,
    SlideIndexEvent, SlideIndexResponse,
};
