use tracing::warn;

use crate::errors::ProtocolParseError;
use crate::protocol::ProtocolEvent;

/// Prefix marking an event line.
pub(crate) const EVENT_PREFIX: &str = "data:";
/// Longest line kept; a longer one is dropped up to its next newline.
pub(crate) const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Splits a chunked byte stream into lines.
///
/// Bytes are held until a `\n` arrives, so a line (or a UTF-8 sequence)
/// split across chunks is carried into the next chunk instead of dropped.
#[derive(Default)]
pub(crate) struct LineDecoder {
    buf: Vec<u8>,
    /// Prefix of `buf` already searched for a newline.
    scanned: usize,
    /// Dropping the remainder of an oversized line.
    discarding: bool,
}

impl LineDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            if self.discarding {
                self.discarding = false;
            } else {
                lines.push(decode_line(&self.buf[start..end]));
            }
            start = end + 1;
            self.scanned = start;
        }
        self.buf.drain(..start);
        self.scanned = self.buf.len();

        if self.buf.len() > MAX_LINE_BYTES {
            warn!(bytes = self.buf.len(), "dropping oversized event line");
            self.buf.clear();
            self.scanned = 0;
            self.discarding = true;
        }
        lines
    }

    /// Returns the residual partial line once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) || rest.is_empty() {
            return None;
        }
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_suffix('\r').unwrap_or(&*text).to_string()
}

/// Parses one line into an event.
///
/// `Ok(None)` for lines that are not event lines (blank separators, comments,
/// other SSE fields); `Err` for event lines with a malformed payload.
pub(crate) fn parse_event_line(line: &str) -> Result<Option<ProtocolEvent>, ProtocolParseError> {
    let Some(payload) = line.strip_prefix(EVENT_PREFIX) else {
        return Ok(None);
    };
    let payload = payload.trim_start();
    serde_json::from_str(payload)
        .map(Some)
        .map_err(|e| ProtocolParseError {
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_line_is_carried_to_next_chunk() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push_chunk(b"data: {\"type\":\"token\",\"con").is_empty());
        let lines = decoder.push_chunk(b"tent\":\"hi\"}\n\ndata: {\"type\":");
        assert_eq!(lines, vec!["data: {\"type\":\"token\",\"content\":\"hi\"}", ""]);
        let lines = decoder.push_chunk(b"\"done\"}\n");
        assert_eq!(lines, vec!["data: {\"type\":\"done\"}"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn multibyte_character_split_across_chunks_survives() {
        let text = "data: {\"type\":\"token\",\"content\":\"금리\"}\n".as_bytes();
        let split = text.iter().position(|b| *b >= 0x80).expect("non-ascii") + 1;
        let mut decoder = LineDecoder::default();
        assert!(decoder.push_chunk(&text[..split]).is_empty());
        let lines = decoder.push_chunk(&text[split..]);
        assert_eq!(lines, vec!["data: {\"type\":\"token\",\"content\":\"금리\"}"]);
    }

    #[test]
    fn crlf_line_endings_are_stripped() {
        let mut decoder = LineDecoder::default();
        let lines = decoder.push_chunk(b"data: {\"type\":\"done\"}\r\n\r\n");
        assert_eq!(lines, vec!["data: {\"type\":\"done\"}", ""]);
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push_chunk(b"data: {\"type\":\"done\"}").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("data: {\"type\":\"done\"}"));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn long_line_in_many_small_chunks() {
        let content = "x".repeat(4096);
        let line = format!("data: {{\"type\":\"token\",\"content\":\"{content}\"}}\n");
        let mut decoder = LineDecoder::default();
        let mut lines = Vec::new();
        for chunk in line.as_bytes().chunks(7) {
            lines.extend(decoder.push_chunk(chunk));
        }
        assert_eq!(lines, vec![line.trim_end().to_string()]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn oversized_line_is_dropped_up_to_its_newline() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push_chunk(&vec![b'x'; MAX_LINE_BYTES + 1]).is_empty());
        assert!(decoder.buf.is_empty());
        assert!(decoder.push_chunk(b"still the same line").is_empty());
        let lines = decoder.push_chunk(b"tail\ndata: {\"type\":\"done\"}\n");
        assert_eq!(lines, vec!["data: {\"type\":\"done\"}"]);
    }

    #[test]
    fn oversized_partial_line_is_not_flushed() {
        let mut decoder = LineDecoder::default();
        decoder.push_chunk(&vec![b'x'; MAX_LINE_BYTES + 1]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn non_event_lines_are_ignored() {
        assert_eq!(parse_event_line(""), Ok(None));
        assert_eq!(parse_event_line(": keep-alive"), Ok(None));
        assert_eq!(parse_event_line("event: message"), Ok(None));
    }

    #[test]
    fn event_lines_parse_with_or_without_space() {
        assert_eq!(
            parse_event_line("data: {\"type\":\"token\",\"content\":\"a\"}"),
            Ok(Some(ProtocolEvent::Token {
                content: "a".into()
            }))
        );
        assert_eq!(
            parse_event_line("data:{\"type\":\"error\"}"),
            Ok(Some(ProtocolEvent::Error { message: None }))
        );
    }

    #[test]
    fn malformed_payload_is_a_parse_error() {
        assert!(parse_event_line("data: {not valid json").is_err());
        assert!(parse_event_line("data: {\"type\":\"unknown\"}").is_err());
    }
}
