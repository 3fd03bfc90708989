//! Chat event stream transport.
//!
//! [`EventSource`] is the seam between the dispatcher and the network; the
//! HTTP implementation posts a [`ChatRequest`] and decodes the chunked
//! `data:` line stream into [`ProtocolEvent`]s.
mod decoder;

use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::errors::{ChatError, StreamError, TransportError};
use crate::protocol::{ChatRequest, ProtocolEvent};

use decoder::{LineDecoder, parse_event_line};

/// Lazy, finite sequence of decoded events for one request.
///
/// Ends with `None` when the server closes the body; yields
/// `Err(StreamError::Cancelled)` once the send's token is cancelled.
pub type EventStream =
    Pin<Box<dyn futures::Stream<Item = Result<ProtocolEvent, StreamError>> + Send + 'static>>;

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// Opens one event stream per chat request.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Sends `request` and returns its event stream.
    ///
    /// Fails before producing any event when the backend rejects the request.
    async fn open(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, StreamError>;
}

/// [`EventSource`] backed by `POST {base_url}/api/chat/stream`.
pub struct HttpEventSource {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpEventSource {
    pub fn new(config: ClientConfig) -> Result<Self, ChatError> {
        config.validate()?;
        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl EventSource for HttpEventSource {
    async fn open(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, StreamError> {
        let url = self.config.stream_url();
        debug!(%url, locale = %request.locale, holdings = request.portfolio.len(), "opening chat stream");

        let send = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            response = send => response
                .map_err(|e| TransportError::Request(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                body = response.text() => {
                    body.unwrap_or_else(|_| "<unreadable body>".to_string())
                }
            };
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let bytes_stream: ByteStream = Box::pin(response.bytes_stream());
        Ok(Box::pin(decode_event_stream(bytes_stream, cancel)))
    }
}

fn decode_event_stream(
    bytes_stream: ByteStream,
    cancel: CancellationToken,
) -> impl futures::Stream<Item = Result<ProtocolEvent, StreamError>> + Send {
    struct State {
        bytes_stream: ByteStream,
        cancel: CancellationToken,
        decoder: LineDecoder,
        pending: VecDeque<ProtocolEvent>,
        done: bool,
    }

    stream::try_unfold(
        State {
            bytes_stream,
            cancel,
            decoder: LineDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if state.cancel.is_cancelled() {
                    return Err(StreamError::Cancelled);
                }
                if let Some(event) = state.pending.pop_front() {
                    if event.is_terminal() {
                        // Nothing after `done`/`error` belongs to this send.
                        state.pending.clear();
                        state.done = true;
                    }
                    return Ok(Some((event, state)));
                }
                if state.done {
                    return Ok(None);
                }

                let next = tokio::select! {
                    biased;
                    _ = state.cancel.cancelled() => return Err(StreamError::Cancelled),
                    next = state.bytes_stream.next() => next,
                };
                match next {
                    Some(Ok(chunk)) => {
                        for line in state.decoder.push_chunk(&chunk) {
                            queue_line(&mut state.pending, &line);
                        }
                    }
                    Some(Err(e)) => {
                        return Err(TransportError::Read(e.to_string()).into());
                    }
                    None => {
                        if let Some(line) = state.decoder.finish() {
                            queue_line(&mut state.pending, &line);
                        }
                        state.done = true;
                    }
                }
            }
        },
    )
}

fn queue_line(pending: &mut VecDeque<ProtocolEvent>, line: &str) {
    match parse_event_line(line) {
        Ok(Some(event)) => pending.push_back(event),
        Ok(None) => {}
        Err(err) => warn!(error = %err, "dropping malformed event line"),
    }
}
