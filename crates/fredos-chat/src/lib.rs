//! Streaming chat pipeline for the FRED-OS terminal.
//!
//! A send opens one server-sent-event stream against the chat backend, folds
//! `token` events into a single assistant message (hiding fenced ```` ```json ````
//! planning blocks once they close) and applies tool activity, watch-list and
//! session updates to a caller-supplied [`SessionSink`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fredos_chat::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ChatError> {
//! let config = ClientConfig::from_env()?;
//! let source = Arc::new(HttpEventSource::new(config.clone())?);
//! let session = ChatSession::new(source, InMemorySink::default(), config.locale);
//!
//! session.send("미국 실업률 추이 보여줘", Vec::new()).await;
//!
//! let sink = session.sink();
//! for message in sink.lock().unwrap().messages() {
//!     println!("{:?}: {}", message.role, message.content);
//! }
//! # Ok(())
//! # }
//! ```

/// Fence-stripping text accumulation for streamed tokens.
pub mod accumulator;
/// Per-send cancellation tokens and the `stop()` entry point.
pub mod cancel;
/// Client configuration loaded from the environment.
pub mod config;
/// Event-to-state transitions for one streaming send.
pub mod dispatcher;
/// Public error types.
pub mod errors;
/// One-time tracing subscriber setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Wire types: request payload, protocol events and chat messages.
pub mod protocol;
/// Caller-facing chat session (`send` / `stop`).
pub mod session;
/// Session State Sink contract and the in-memory implementation.
pub mod sink;
/// HTTP event stream transport and line decoding.
pub mod transport;

pub use accumulator::accumulate;
pub use cancel::{CancellationController, SendGuard};
pub use config::ClientConfig;
pub use dispatcher::{Dispatcher, Outcome};
pub use errors::{ChatError, StreamError, TransportError};
pub use protocol::{
    ChatMessage, ChatRequest, Chip, ChipKind, IndicatorCategory, IndicatorRef, Locale,
    MessageKind, PortfolioHolding, ProtocolEvent, Role, StreamingMessage,
};
pub use session::ChatSession;
pub use sink::{InMemorySink, SessionSink, WATCH_LIST_LIMIT};
pub use transport::{EventSource, EventStream, HttpEventSource};
