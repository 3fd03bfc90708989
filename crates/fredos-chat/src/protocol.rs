use std::fmt;

use chrono::{DateTime, Utc};

/// One event decoded from a `data:` line of the chat stream.
///
/// `Done` and `Error` are terminal; a well-formed stream carries exactly one
/// of them as its last event.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// Text fragment to append to the assistant message.
    Token { content: String },
    /// The agent started a tool call.
    ToolCall {
        tool: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    /// A tool call finished.
    ToolResult {
        tool: String,
        #[serde(default)]
        result: String,
    },
    /// Indicator search hits used to populate the watch list.
    FredSearchResults {
        #[serde(default)]
        indicators: Vec<IndicatorRef>,
        #[serde(default)]
        keywords: Vec<String>,
        #[serde(default)]
        count: Option<u64>,
    },
    /// Successful end of the stream.
    Done {
        #[serde(default, rename = "sessionId")]
        session_id: Option<String>,
        #[serde(default)]
        logs: Vec<String>,
    },
    /// Failed end of the stream.
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

impl ProtocolEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Short tag used in traces.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::FredSearchResults { .. } => "fred_search_results",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

/// Indicator category as reported by the search tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorCategory {
    Sector,
    Macro,
    Risk,
    #[serde(other)]
    Other,
}

impl IndicatorCategory {
    /// Watch-list ordering rank; missing and unknown categories rank as macro.
    pub fn rank(category: Option<Self>) -> u8 {
        match category {
            Some(Self::Sector) => 0,
            Some(Self::Risk) => 2,
            Some(Self::Macro | Self::Other) | None => 1,
        }
    }
}

/// Reference to an economic indicator returned by `fred_search_results`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IndicatorRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<IndicatorCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Response language requested from the agent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Ko,
    En,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ko => "ko",
            Self::En => "en",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Locale {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ko" => Ok(Self::Ko),
            "en" => Ok(Self::En),
            other => Err(format!("unsupported locale `{other}` (expected ko or en)")),
        }
    }
}

/// One portfolio position sent as context with a chat request.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioHolding {
    pub ticker: String,
    pub quantity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_price: Option<f64>,
}

/// Body of `POST /api/chat/stream`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub locale: Locale,
    #[serde(default)]
    pub portfolio: Vec<PortfolioHolding>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChipKind {
    Indicator,
    Stock,
}

/// A user-attached reference to an indicator or a stock.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Chip {
    pub id: String,
    pub kind: ChipKind,
}

impl Chip {
    pub fn indicator(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ChipKind::Indicator,
        }
    }

    pub fn stock(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ChipKind::Stock,
        }
    }
}

/// Renders chips as a context line prefixed to the outgoing message.
///
/// Returns `text` unchanged when there are no chips.
pub fn with_chip_context(text: &str, chips: &[Chip]) -> String {
    if chips.is_empty() {
        return text.to_string();
    }
    let ids = |kind: ChipKind| {
        chips
            .iter()
            .filter(|chip| chip.kind == kind)
            .map(|chip| chip.id.as_str())
            .collect::<Vec<_>>()
    };
    let mut sections = Vec::new();
    let indicators = ids(ChipKind::Indicator);
    if !indicators.is_empty() {
        sections.push(format!("indicators: {}", indicators.join(", ")));
    }
    let stocks = ids(ChipKind::Stock);
    if !stocks.is_empty() {
        sections.push(format!("stocks: {}", stocks.join(", ")));
    }
    let context = format!("[Context] {}", sections.join(" | "));
    if text.trim().is_empty() {
        context
    } else {
        format!("{context}\n{text}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Error,
}

/// A message as stored by the session sink.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub kind: MessageKind,
    pub content: String,
    /// True while the assistant message is still being streamed.
    pub pending: bool,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role: Role::User,
            kind: MessageKind::Text,
            content: content.into(),
            pending: false,
            timestamp: Utc::now(),
        }
    }
}

/// The assistant message being built by one send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamingMessage {
    pub id: String,
    pub content: String,
    pub kind: MessageKind,
}

impl StreamingMessage {
    /// Empty placeholder with a fresh id.
    pub fn placeholder() -> Self {
        Self {
            id: new_message_id(),
            content: String::new(),
            kind: MessageKind::Text,
        }
    }

    /// Sink representation; still pending until the dispatcher finalizes it.
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            id: self.id.clone(),
            role: Role::Assistant,
            kind: self.kind,
            content: self.content.clone(),
            pending: true,
            timestamp: Utc::now(),
        }
    }
}

pub(crate) fn new_message_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}
