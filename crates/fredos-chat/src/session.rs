use std::sync::{Arc, Mutex, PoisonError};

use tracing::{Instrument as _, info, info_span, warn};

use crate::cancel::CancellationController;
use crate::dispatcher::{Dispatcher, Outcome};
use crate::errors::StreamError;
use crate::protocol::{ChatMessage, ChatRequest, Chip, Locale, StreamingMessage, with_chip_context};
use crate::sink::SessionSink;
use crate::transport::EventSource;

/// Caller-facing chat conversation.
///
/// `send` reports everything through the sink; `stop` cancels the send in
/// flight. Clones share the transport, the sink and the cancellation slot.
pub struct ChatSession<S> {
    source: Arc<dyn EventSource>,
    sink: Arc<Mutex<S>>,
    controller: CancellationController,
    locale: Locale,
}

impl<S> Clone for ChatSession<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            sink: self.sink.clone(),
            controller: self.controller.clone(),
            locale: self.locale,
        }
    }
}

impl<S: SessionSink + Send + 'static> ChatSession<S> {
    pub fn new(source: Arc<dyn EventSource>, sink: S, locale: Locale) -> Self {
        Self {
            source,
            sink: Arc::new(Mutex::new(sink)),
            controller: CancellationController::new(),
            locale,
        }
    }

    /// Shared handle to the sink for reading state between sends.
    pub fn sink(&self) -> Arc<Mutex<S>> {
        self.sink.clone()
    }

    /// Runs `f` with exclusive access to the sink.
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut guard = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn is_sending(&self) -> bool {
        self.controller.is_sending()
    }

    /// Stops the send in flight; its partial reply is discarded silently.
    pub fn stop(&self) {
        if !self.controller.stop() {
            info!("stop ignored: no send in flight");
        }
    }

    /// Sends `text` with `chips` as context and streams the reply into the sink.
    ///
    /// Returns once the send is finished, failed or stopped. Blank input
    /// without chips and sends while another is in flight are ignored.
    pub async fn send(&self, text: &str, chips: Vec<Chip>) {
        if text.trim().is_empty() && chips.is_empty() {
            return;
        }
        let Some(guard) = self.controller.begin() else {
            warn!("send ignored: another send is in flight");
            return;
        };
        let cancel = guard.token();

        let message = with_chip_context(text.trim(), &chips);
        let placeholder = StreamingMessage::placeholder();
        let span = info_span!("chat_send", message_id = %placeholder.id);

        let request = self.with_sink(|sink| {
            sink.append_message(ChatMessage::user(message.clone()));
            sink.append_message(placeholder.to_chat_message());
            ChatRequest {
                message,
                session_id: sink.session_id(),
                locale: self.locale,
                portfolio: sink.portfolio_context(),
            }
        });
        let mut reply = PendingReply {
            sink: &*self.sink,
            id: placeholder.id.clone(),
            settled: false,
        };
        let mut dispatcher = Dispatcher::new(placeholder);

        async {
            let outcome = match self.source.open(&request, cancel.clone()).await {
                Ok(events) => dispatcher.consume(&*self.sink, events, &cancel).await,
                Err(err) => {
                    let err = if cancel.is_cancelled() {
                        StreamError::Cancelled
                    } else {
                        err
                    };
                    self.with_sink(|sink| dispatcher.fail(sink, &err))
                }
            };
            reply.settled = true;
            match outcome {
                Outcome::Completed => info!("send completed"),
                Outcome::Failed => warn!("send failed"),
                Outcome::Discarded => info!("send stopped by user"),
            }
        }
        .instrument(span)
        .await;

        drop(guard);
    }
}

/// Removes the assistant placeholder when `send` is dropped before the
/// reply settles.
struct PendingReply<'a, S: SessionSink> {
    sink: &'a Mutex<S>,
    id: String,
    settled: bool,
}

impl<S: SessionSink> Drop for PendingReply<'_, S> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if sink.remove_message_by_id(&self.id) {
            info!(message_id = %self.id, "send dropped; placeholder removed");
        }
    }
}
