//! Applies protocol events to the session sink.
//!
//! One [`Dispatcher`] exists per send. It owns the [`StreamingMessage`] and
//! writes it back to the sink by id after every change, so the sink never
//! has to hand out a long-lived reference.
use std::sync::{Mutex, PoisonError};

use futures::StreamExt as _;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::accumulator::accumulate;
use crate::errors::StreamError;
use crate::protocol::{
    IndicatorCategory, IndicatorRef, MessageKind, ProtocolEvent, StreamingMessage,
};
use crate::sink::{SessionSink, WATCH_LIST_LIMIT};
use crate::transport::EventStream;

/// Maximum characters of a tool result kept in the activity log.
pub const TOOL_RESULT_PREVIEW_CHARS: usize = 200;
/// Maximum characters of diagnostic text appended to a transport failure.
pub const DIAGNOSTIC_MAX_CHARS: usize = 200;
/// Fallback text when the stream fails without a message.
pub const CONNECTION_INTERRUPTED: &str = "CONNECTION_INTERRUPTED";

/// How a send ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// `done` received; the message is final text.
    Completed,
    /// `error` event or transport failure; the message shows `[ERR] ...`.
    Failed,
    /// User stop; the message was removed.
    Discarded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Sending,
    Idle,
}

/// State machine for one streaming send.
pub struct Dispatcher {
    message: StreamingMessage,
    state: State,
}

impl Dispatcher {
    /// Starts a send for a placeholder already appended to the sink.
    pub fn new(message: StreamingMessage) -> Self {
        Self {
            message,
            state: State::Sending,
        }
    }

    pub fn message(&self) -> &StreamingMessage {
        &self.message
    }

    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Applies one event. Returns the outcome once a terminal event arrives.
    ///
    /// Events after the send went idle are ignored.
    pub fn apply<S: SessionSink + ?Sized>(
        &mut self,
        sink: &mut S,
        event: ProtocolEvent,
    ) -> Option<Outcome> {
        if self.is_idle() {
            warn!(message_id = %self.message.id, kind = event.kind(), "event after terminal state ignored");
            return None;
        }
        debug!(message_id = %self.message.id, kind = event.kind(), "applying event");

        match event {
            ProtocolEvent::Token { content } => {
                self.message.content = accumulate(&self.message.content, &content);
                self.write_back(sink, true);
                None
            }
            ProtocolEvent::ToolCall { tool, input } => {
                sink.append_log(tool_call_line(&tool, &input));
                None
            }
            ProtocolEvent::ToolResult { tool, result } => {
                sink.append_log(tool_result_line(&tool, &result));
                None
            }
            ProtocolEvent::FredSearchResults {
                indicators,
                keywords,
                count,
            } => {
                debug!(?keywords, ?count, hits = indicators.len(), "indicator search results");
                if !indicators.is_empty() {
                    sink.set_watch_list(watch_list_from(indicators));
                }
                None
            }
            ProtocolEvent::Done { session_id, logs } => {
                if let Some(session_id) = session_id
                    && sink.set_session_id_if_absent(session_id.clone())
                {
                    info!(%session_id, "session id adopted");
                }
                if !logs.is_empty() {
                    sink.replace_logs(logs);
                }
                self.message.kind = MessageKind::Text;
                Some(self.finalize(sink, Outcome::Completed))
            }
            ProtocolEvent::Error { message } => {
                let message = message.filter(|m| !m.trim().is_empty());
                self.message.kind = MessageKind::Error;
                self.message.content =
                    format!("[ERR] {}", message.as_deref().unwrap_or(CONNECTION_INTERRUPTED));
                Some(self.finalize(sink, Outcome::Failed))
            }
        }
    }

    /// Ends the send after a failure that was not a protocol event.
    ///
    /// A user stop removes the message without a trace; anything else is
    /// shown as a connection-interrupted error.
    pub fn fail<S: SessionSink + ?Sized>(&mut self, sink: &mut S, error: &StreamError) -> Outcome {
        if self.is_idle() {
            return Outcome::Discarded;
        }
        self.state = State::Idle;
        if error.is_cancelled() {
            sink.remove_message_by_id(&self.message.id);
            return Outcome::Discarded;
        }

        self.message.kind = MessageKind::Error;
        self.message.content = format!(
            "[ERR] {CONNECTION_INTERRUPTED} ({})",
            truncate_chars(&error.to_string(), DIAGNOSTIC_MAX_CHARS)
        );
        self.write_back(sink, false);
        Outcome::Failed
    }

    /// Consumes `events` in arrival order until a terminal event, a failure
    /// or cancellation.
    ///
    /// `sink` is locked once per event and never across an await point.
    pub async fn consume<S: SessionSink + ?Sized>(
        mut self,
        sink: &Mutex<S>,
        mut events: EventStream,
        cancel: &CancellationToken,
    ) -> Outcome {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => Some(Err(StreamError::Cancelled)),
                next = events.next() => next,
            };
            let mut guard = sink.lock().unwrap_or_else(PoisonError::into_inner);
            match next {
                Some(Ok(_)) if cancel.is_cancelled() => {
                    return self.fail(&mut *guard, &StreamError::Cancelled);
                }
                Some(Ok(event)) => {
                    if let Some(outcome) = self.apply(&mut *guard, event) {
                        return outcome;
                    }
                }
                Some(Err(err)) => {
                    // A transport error racing a stop is still a stop.
                    let err = if cancel.is_cancelled() {
                        StreamError::Cancelled
                    } else {
                        err
                    };
                    return self.fail(&mut *guard, &err);
                }
                None => return self.fail(&mut *guard, &StreamError::Incomplete),
            }
        }
    }

    fn finalize<S: SessionSink + ?Sized>(&mut self, sink: &mut S, outcome: Outcome) -> Outcome {
        self.state = State::Idle;
        self.write_back(sink, false);
        outcome
    }

    fn write_back<S: SessionSink + ?Sized>(&self, sink: &mut S, pending: bool) {
        let message = &self.message;
        let found = sink.mutate_message_by_id(&message.id, &mut |stored| {
            stored.content.clone_from(&message.content);
            stored.kind = message.kind;
            stored.pending = pending;
        });
        if !found {
            warn!(message_id = %message.id, "streaming message missing from sink");
        }
    }
}

/// Orders indicators sector, macro (and uncategorised), risk; keeps input
/// order within a rank and at most [`WATCH_LIST_LIMIT`] ids.
pub fn watch_list_from(mut indicators: Vec<IndicatorRef>) -> Vec<String> {
    indicators.sort_by_key(|indicator| IndicatorCategory::rank(indicator.category));
    indicators
        .into_iter()
        .take(WATCH_LIST_LIMIT)
        .map(|indicator| indicator.id)
        .collect()
}

fn tool_call_line(tool: &str, input: &serde_json::Value) -> String {
    let args = if input.is_null() {
        "{}".to_string()
    } else {
        input.to_string()
    };
    format!("TOOL_CALL: {tool}({args})")
}

fn tool_result_line(tool: &str, result: &str) -> String {
    format!(
        "TOOL_RESULT: {tool} -> {}",
        truncate_chars(result, TOOL_RESULT_PREVIEW_CHARS)
    )
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
