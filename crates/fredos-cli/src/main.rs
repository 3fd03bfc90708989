//! Interactive FRED-OS terminal.
//!
//! Reads prompts from stdin, streams the agent's reply to stdout and prints
//! tool activity to stderr. Ctrl-C stops a reply in progress; at the prompt it
//! exits.

mod commands;
mod terminal;

use std::io::Write as _;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fredos_chat::prelude::*;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::info;

use crate::commands::{Command, HELP};
use crate::terminal::TerminalSink;

type Session = ChatSession<TerminalSink<std::io::Stdout, std::io::Stderr>>;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("terminal i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("send task failed: {0}")]
    Task(String),
}

/// Chat with the FRED-OS economic data agent.
#[derive(Debug, Parser)]
#[command(name = "fredos", version, about)]
struct Args {
    /// Backend base URL (overrides FREDOS_API_URL).
    #[arg(long)]
    url: Option<String>,
    /// Reply language: ko or en (overrides FREDOS_LOCALE).
    #[arg(long)]
    locale: Option<Locale>,
    /// End-to-end timeout per reply in seconds (overrides FREDOS_TIMEOUT_SECS).
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Portfolio holding sent as context, as TICKER:QTY[@AVG]. Repeatable.
    #[arg(long = "holding", value_parser = commands::parse_holding)]
    holdings: Vec<PortfolioHolding>,
    /// Log filter used when FREDOS_LOG_LEVEL and RUST_LOG are unset.
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    fredos_chat::observability::init_observability(&args.log_level);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fredos: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Applies command-line flags on top of the environment config.
fn apply_overrides(mut config: ClientConfig, args: &Args) -> Result<ClientConfig, ChatError> {
    if let Some(url) = &args.url {
        config.base_url.clone_from(url);
        config.validate().map_err(|err| match err {
            ChatError::Config(reason) | ChatError::Validation(reason) => {
                ChatError::Validation(format!("--url: {reason}"))
            }
        })?;
    }
    if let Some(locale) = args.locale {
        config.locale = locale;
    }
    if let Some(secs) = args.timeout_secs {
        config.timeout = Some(Duration::from_secs(secs));
    }
    Ok(config)
}

async fn run(args: Args) -> Result<(), CliError> {
    let config = apply_overrides(ClientConfig::from_env()?, &args)?;
    let locale = config.locale;
    let source = Arc::new(HttpEventSource::new(config)?);
    let base_url = source.config().base_url.clone();
    let mut sink = TerminalSink::new(std::io::stdout(), std::io::stderr());
    for holding in args.holdings {
        sink.state_mut().upsert_holding(holding);
    }
    let session: Session = ChatSession::new(source, sink, locale);
    info!(url = %base_url, locale = %session.locale(), "terminal ready");
    println!("FRED-OS terminal ({base_url}, {}), :help for commands", session.locale());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut chips: Vec<Chip> = Vec::new();
    loop {
        prompt(&chips)?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            return Ok(());
        };

        match commands::parse(&line) {
            Ok(Command::Send(text)) => {
                send_until_done(&session, text, std::mem::take(&mut chips)).await?;
            }
            Ok(Command::Chip(chip)) => chips.push(chip),
            Ok(Command::Hold(holding)) => {
                println!("holding {} x{}", holding.ticker, holding.quantity);
                session.with_sink(|sink| sink.state_mut().upsert_holding(holding));
            }
            Ok(Command::Unhold(ticker)) => {
                if !session.with_sink(|sink| sink.state_mut().remove_holding(&ticker)) {
                    println!("no holding for {ticker}");
                }
            }
            Ok(Command::Watch) => {
                let ids = session.with_sink(|sink| sink.state().watch_list().to_vec());
                if ids.is_empty() {
                    println!("watch list is empty");
                } else {
                    println!("{}", ids.join("  "));
                }
            }
            Ok(Command::Logs) => {
                for line in session.with_sink(|sink| sink.state().logs().to_vec()) {
                    println!("{line}");
                }
            }
            Ok(Command::Session) => match session.with_sink(|sink| sink.session_id()) {
                Some(id) => println!("{id}"),
                None => println!("no session yet"),
            },
            Ok(Command::Help) => println!("{HELP}"),
            Ok(Command::Quit) => return Ok(()),
            Ok(Command::Empty) => {}
            Err(err) => eprintln!("{err}"),
        }
    }
}

/// Runs one send, turning Ctrl-C into `stop()` until it finishes.
async fn send_until_done(
    session: &Session,
    text: String,
    chips: Vec<Chip>,
) -> Result<(), CliError> {
    let mut task = tokio::spawn({
        let session = session.clone();
        async move { session.send(&text, chips).await }
    });
    loop {
        tokio::select! {
            joined = &mut task => {
                return joined.map_err(|e| CliError::Task(e.to_string()));
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                session.stop();
            }
        }
    }
}

fn prompt(chips: &[Chip]) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    if !chips.is_empty() {
        let ids: Vec<&str> = chips.iter().map(|chip| chip.id.as_str()).collect();
        write!(out, "[{}] ", ids.join(" "))?;
    }
    write!(out, "> ")?;
    out.flush()
}
