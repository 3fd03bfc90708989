use fredos_chat::{ChatError, Chip, PortfolioHolding};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CommandError {
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown command `:{0}` (try :help)")]
    Unknown(String),
    #[error("invalid number `{0}`")]
    Number(String),
}

/// One line of terminal input.
#[derive(Debug, PartialEq)]
pub enum Command {
    Send(String),
    Chip(Chip),
    Hold(PortfolioHolding),
    Unhold(String),
    Watch,
    Logs,
    Session,
    Help,
    Quit,
    Empty,
}

pub const HELP: &str = "\
:chip indicator <ID>      attach an indicator to the next message
:chip stock <TICKER>      attach a stock to the next message
:hold <TICKER> <QTY> [AVG] add or update a portfolio holding
:unhold <TICKER>          remove a portfolio holding
:watch                    show the watch list
:logs                     show the agent activity log
:session                  show the session id
:quit                     exit (Ctrl-C stops a reply in progress)";

pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }
    let Some(rest) = line.strip_prefix(':') else {
        return Ok(Command::Send(line.to_string()));
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();
    match (name, args.as_slice()) {
        ("chip", ["indicator", id]) => Ok(Command::Chip(Chip::indicator(*id))),
        ("chip", ["stock", ticker]) => Ok(Command::Chip(Chip::stock(ticker.to_ascii_uppercase()))),
        ("chip", _) => Err(CommandError::Usage(":chip indicator|stock <ID>")),
        ("hold", [ticker, quantity, rest @ ..]) if rest.len() <= 1 => {
            Ok(Command::Hold(PortfolioHolding {
                ticker: ticker.to_ascii_uppercase(),
                quantity: number(quantity)?,
                avg_price: rest.first().map(|avg| number(avg)).transpose()?,
            }))
        }
        ("hold", _) => Err(CommandError::Usage(":hold <TICKER> <QTY> [AVG]")),
        ("unhold", [ticker]) => Ok(Command::Unhold(ticker.to_ascii_uppercase())),
        ("unhold", _) => Err(CommandError::Usage(":unhold <TICKER>")),
        ("watch", []) => Ok(Command::Watch),
        ("logs", []) => Ok(Command::Logs),
        ("session", []) => Ok(Command::Session),
        ("help", []) => Ok(Command::Help),
        ("quit" | "exit" | "q", []) => Ok(Command::Quit),
        (other, _) => Err(CommandError::Unknown(other.to_string())),
    }
}

/// Parses `TICKER:QTY[@AVG]` as given to `--holding`.
pub fn parse_holding(raw: &str) -> Result<PortfolioHolding, ChatError> {
    let (ticker, position) = raw.split_once(':').ok_or_else(|| {
        ChatError::Validation(format!("expected TICKER:QTY[@AVG], got `{raw}`"))
    })?;
    let (quantity, avg_price) = match position.split_once('@') {
        Some((quantity, avg)) => (quantity, Some(avg)),
        None => (position, None),
    };
    if ticker.trim().is_empty() {
        return Err(ChatError::Validation(format!("missing ticker in `{raw}`")));
    }
    Ok(PortfolioHolding {
        ticker: ticker.trim().to_ascii_uppercase(),
        quantity: number(quantity).map_err(invalid)?,
        avg_price: avg_price.map(number).transpose().map_err(invalid)?,
    })
}

fn invalid(err: CommandError) -> ChatError {
    ChatError::Validation(err.to_string())
}

fn number(raw: &str) -> Result<f64, CommandError> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(CommandError::Number(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fredos_chat::ChipKind;

    #[test]
    fn plain_lines_are_messages() {
        assert_eq!(
            parse("  금리 전망 알려줘 "),
            Ok(Command::Send("금리 전망 알려줘".into()))
        );
        assert_eq!(parse("   "), Ok(Command::Empty));
    }

    #[test]
    fn chip_commands() {
        assert_eq!(
            parse(":chip stock nvda"),
            Ok(Command::Chip(Chip {
                id: "NVDA".into(),
                kind: ChipKind::Stock
            }))
        );
        assert_eq!(
            parse(":chip indicator T10Y2Y"),
            Ok(Command::Chip(Chip::indicator("T10Y2Y")))
        );
        assert!(matches!(parse(":chip bond X"), Err(CommandError::Usage(_))));
    }

    #[test]
    fn hold_commands() {
        assert_eq!(
            parse(":hold aapl 10 187.5"),
            Ok(Command::Hold(PortfolioHolding {
                ticker: "AAPL".into(),
                quantity: 10.0,
                avg_price: Some(187.5)
            }))
        );
        assert!(matches!(
            parse(":hold aapl ten"),
            Err(CommandError::Number(n)) if n == "ten"
        ));
        assert!(matches!(parse(":hold aapl"), Err(CommandError::Usage(_))));
        assert!(matches!(parse(":hold a 1 2 3"), Err(CommandError::Usage(_))));
    }

    #[test]
    fn unknown_command_is_reported() {
        assert_eq!(parse(":frobnicate"), Err(CommandError::Unknown("frobnicate".into())));
        assert_eq!(parse(":q"), Ok(Command::Quit));
    }

    #[test]
    fn holding_flag_format() {
        assert_eq!(
            parse_holding("msft:3@410.2"),
            Ok(PortfolioHolding {
                ticker: "MSFT".into(),
                quantity: 3.0,
                avg_price: Some(410.2)
            })
        );
        assert_eq!(
            parse_holding("TSLA:1.5").map(|h| h.avg_price),
            Ok(None)
        );
        assert!(matches!(parse_holding("TSLA"), Err(ChatError::Validation(_))));
        assert!(parse_holding(":3").is_err());
        assert_eq!(
            parse_holding("TSLA:-1"),
            Err(ChatError::Validation("invalid number `-1`".into()))
        );
    }
}
