//! Common imports for typical chat usage.
//!
//! This module exports the types most callers need to wire a transport, a
//! sink and a session together.
pub use crate::{
    CancellationController, ChatError, ChatMessage, ChatSession, Chip, ChipKind, ClientConfig,
    EventSource, HttpEventSource, InMemorySink, Locale, MessageKind, PortfolioHolding,
    ProtocolEvent, Role, SessionSink, StreamError, TransportError,
};
