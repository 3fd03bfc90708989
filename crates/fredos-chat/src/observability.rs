use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

/// Where log records go. stdout is never used: it carries the conversation.
#[derive(Debug, PartialEq)]
enum LogOutput {
    Stderr,
    JsonFile(PathBuf),
}

#[derive(Debug, PartialEq)]
struct LogSettings {
    enabled: bool,
    filter: Option<String>,
    output: LogOutput,
}

impl LogSettings {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("FREDOS_OBSERVABILITY_ENABLED")
            .map(|value| {
                let value = value.trim().to_ascii_lowercase();
                !matches!(value.as_str(), "0" | "false" | "off" | "no")
            })
            .unwrap_or(true);
        let filter = lookup("FREDOS_LOG_LEVEL")
            .or_else(|| lookup("RUST_LOG"))
            .filter(|value| !value.trim().is_empty());
        let output = match lookup("FREDOS_JSON_LOG_PATH").filter(|p| !p.trim().is_empty()) {
            Some(path) => LogOutput::JsonFile(PathBuf::from(path)),
            None => LogOutput::Stderr,
        };
        Self {
            enabled,
            filter,
            output,
        }
    }
}

/// Installs the global `tracing` subscriber once per process.
///
/// `FREDOS_OBSERVABILITY_ENABLED=false` turns logging off. The filter comes
/// from `FREDOS_LOG_LEVEL`, then `RUST_LOG`, then `default_level`.
/// `FREDOS_JSON_LOG_PATH` switches from compact stderr output to JSON lines
/// appended to that file.
pub fn init_observability(default_level: &str) {
    INIT.get_or_init(|| {
        let settings = LogSettings::from_lookup(|key| std::env::var(key).ok());
        if !settings.enabled {
            return;
        }
        let filter = settings
            .filter
            .and_then(|raw| EnvFilter::try_new(raw).ok())
            .unwrap_or_else(|| EnvFilter::new(default_level));

        match settings.output {
            LogOutput::JsonFile(path) => {
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("."));
                let _ = std::fs::create_dir_all(&dir);
                let file_name = path
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("fredos.logs.jsonl"));
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
            }
            LogOutput::Stderr => {
                let layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> LogSettings {
        LogSettings::from_lookup(|key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
    }

    #[test]
    fn defaults_to_stderr_without_filter() {
        assert_eq!(
            settings(&[]),
            LogSettings {
                enabled: true,
                filter: None,
                output: LogOutput::Stderr,
            }
        );
    }

    #[test]
    fn fredos_level_wins_over_rust_log() {
        let s = settings(&[("RUST_LOG", "info"), ("FREDOS_LOG_LEVEL", "fredos_chat=debug")]);
        assert_eq!(s.filter.as_deref(), Some("fredos_chat=debug"));
        assert_eq!(settings(&[("RUST_LOG", "warn")]).filter.as_deref(), Some("warn"));
    }

    #[test]
    fn json_path_and_disable_flag() {
        let s = settings(&[
            ("FREDOS_JSON_LOG_PATH", "logs/chat.jsonl"),
            ("FREDOS_OBSERVABILITY_ENABLED", " Off "),
        ]);
        assert!(!s.enabled);
        assert_eq!(s.output, LogOutput::JsonFile(PathBuf::from("logs/chat.jsonl")));
        assert!(settings(&[("FREDOS_OBSERVABILITY_ENABLED", "yes")]).enabled);
    }
}
