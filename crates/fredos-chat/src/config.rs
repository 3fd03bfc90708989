use std::time::Duration;

use crate::errors::ChatError;
use crate::protocol::Locale;

/// Default backend address for local development.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Configuration for the chat backend client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the chat backend (no trailing `/api`).
    pub base_url: String,
    /// Response language requested from the agent.
    pub locale: Locale,
    /// Timeout for establishing the TCP/TLS connection.
    pub connect_timeout: Duration,
    /// Optional end-to-end timeout covering the whole streamed response.
    ///
    /// Unset by default: agent replies can stream for a long time.
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            locale: Locale::default(),
            connect_timeout: Duration::from_secs(10),
            timeout: None,
        }
    }

    /// Builds a config from `FREDOS_API_URL`, `FREDOS_LOCALE` and
    /// `FREDOS_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ChatError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ChatError> {
        let base_url = lookup("FREDOS_API_URL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut config = Self::new(base_url);

        if let Some(raw) = lookup("FREDOS_LOCALE").filter(|value| !value.trim().is_empty()) {
            config.locale = raw.parse().map_err(ChatError::Config)?;
        }
        if let Some(raw) = lookup("FREDOS_TIMEOUT_SECS").filter(|value| !value.trim().is_empty()) {
            let secs: u64 = raw.trim().parse().map_err(|e| {
                ChatError::Config(format!("invalid FREDOS_TIMEOUT_SECS `{raw}`: {e}"))
            })?;
            config.timeout = Some(Duration::from_secs(secs));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Rejects base URLs that are not http(s).
    pub fn validate(&self) -> Result<(), ChatError> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ChatError::Config(format!(
                "base url must start with http:// or https://, got `{url}`"
            )));
        }
        Ok(())
    }

    pub(crate) fn stream_url(&self) -> String {
        format!("{}/api/chat/stream", self.base_url.trim().trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_env_is_empty() {
        let config = ClientConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.locale, Locale::Ko);
        assert_eq!(config.timeout, None);
        assert_eq!(config.stream_url(), "http://localhost:8080/api/chat/stream");
    }

    #[test]
    fn reads_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("FREDOS_API_URL", "https://fred.example.com/"),
            ("FREDOS_LOCALE", "en"),
            ("FREDOS_TIMEOUT_SECS", "90"),
        ]))
        .expect("config");
        assert_eq!(config.locale, Locale::En);
        assert_eq!(config.timeout, Some(Duration::from_secs(90)));
        assert_eq!(
            config.stream_url(),
            "https://fred.example.com/api/chat/stream"
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("FREDOS_LOCALE", "fr")])),
            Err(ChatError::Config(_))
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("FREDOS_TIMEOUT_SECS", "soon")])),
            Err(ChatError::Config(msg)) if msg.contains("FREDOS_TIMEOUT_SECS")
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("FREDOS_API_URL", "localhost:8080")])),
            Err(ChatError::Config(msg)) if msg.contains("http://")
        ));
    }
}
