use crate::protocol::{ChatMessage, PortfolioHolding};

/// Maximum number of indicator ids kept in the watch list.
pub const WATCH_LIST_LIMIT: usize = 5;

/// State store the dispatcher writes into.
///
/// Calls are synchronous and in-process; every mutation must be visible to
/// the next call made for the same send.
pub trait SessionSink {
    fn append_message(&mut self, message: ChatMessage);

    /// Applies `update` to the message with `id`. Returns `false` when no
    /// such message exists.
    fn mutate_message_by_id(&mut self, id: &str, update: &mut dyn FnMut(&mut ChatMessage)) -> bool;

    /// Removes the message with `id`. Returns `false` when no such message exists.
    fn remove_message_by_id(&mut self, id: &str) -> bool;

    fn append_log(&mut self, line: String);

    fn replace_logs(&mut self, lines: Vec<String>);

    /// Replaces the watch list; implementations keep at most
    /// [`WATCH_LIST_LIMIT`] ids.
    fn set_watch_list(&mut self, ids: Vec<String>);

    fn session_id(&self) -> Option<String>;

    /// Adopts `id` only when no session id is set yet. Returns whether it was adopted.
    fn set_session_id_if_absent(&mut self, id: String) -> bool;

    /// Portfolio snapshot sent with each request.
    fn portfolio_context(&self) -> Vec<PortfolioHolding>;
}

/// Plain in-memory sink used by the terminal and by tests.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    messages: Vec<ChatMessage>,
    logs: Vec<String>,
    watch_list: Vec<String>,
    session_id: Option<String>,
    portfolio: Vec<PortfolioHolding>,
}

impl InMemorySink {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn message(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn watch_list(&self) -> &[String] {
        &self.watch_list
    }

    /// Adds or replaces the holding for `holding.ticker`.
    pub fn upsert_holding(&mut self, holding: PortfolioHolding) {
        match self
            .portfolio
            .iter_mut()
            .find(|existing| existing.ticker.eq_ignore_ascii_case(&holding.ticker))
        {
            Some(existing) => *existing = holding,
            None => self.portfolio.push(holding),
        }
    }

    /// Removes the holding for `ticker`. Returns whether one was removed.
    pub fn remove_holding(&mut self, ticker: &str) -> bool {
        let before = self.portfolio.len();
        self.portfolio
            .retain(|holding| !holding.ticker.eq_ignore_ascii_case(ticker));
        self.portfolio.len() != before
    }
}

impl SessionSink for InMemorySink {
    fn append_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    fn mutate_message_by_id(&mut self, id: &str, update: &mut dyn FnMut(&mut ChatMessage)) -> bool {
        match self.messages.iter_mut().find(|message| message.id == id) {
            Some(message) => {
                update(message);
                true
            }
            None => false,
        }
    }

    fn remove_message_by_id(&mut self, id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|message| message.id != id);
        self.messages.len() != before
    }

    fn append_log(&mut self, line: String) {
        self.logs.push(line);
    }

    fn replace_logs(&mut self, lines: Vec<String>) {
        self.logs = lines;
    }

    fn set_watch_list(&mut self, mut ids: Vec<String>) {
        ids.truncate(WATCH_LIST_LIMIT);
        self.watch_list = ids;
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.clone()
    }

    fn set_session_id_if_absent(&mut self, id: String) -> bool {
        if self.session_id.is_some() {
            return false;
        }
        self.session_id = Some(id);
        true
    }

    fn portfolio_context(&self) -> Vec<PortfolioHolding> {
        self.portfolio.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutate_and_remove_report_missing_ids() {
        let mut sink = InMemorySink::default();
        let message = ChatMessage::user("hi");
        let id = message.id.clone();
        sink.append_message(message);

        assert!(sink.mutate_message_by_id(&id, &mut |m| m.content.push('!')));
        assert_eq!(sink.message(&id).map(|m| m.content.as_str()), Some("hi!"));
        assert!(!sink.mutate_message_by_id("missing", &mut |_| {}));

        assert!(sink.remove_message_by_id(&id));
        assert!(!sink.remove_message_by_id(&id));
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn session_id_is_never_overwritten() {
        let mut sink = InMemorySink::default();
        assert!(sink.set_session_id_if_absent("S1".into()));
        assert!(!sink.set_session_id_if_absent("S2".into()));
        assert_eq!(sink.session_id().as_deref(), Some("S1"));
    }

    #[test]
    fn watch_list_is_bounded() {
        let mut sink = InMemorySink::default();
        sink.set_watch_list((0..8).map(|i| format!("ID{i}")).collect());
        assert_eq!(sink.watch_list(), ["ID0", "ID1", "ID2", "ID3", "ID4"]);
    }

    #[test]
    fn holdings_upsert_by_ticker() {
        let mut sink = InMemorySink::default();
        sink.upsert_holding(PortfolioHolding {
            ticker: "AAPL".into(),
            quantity: 1.0,
            avg_price: None,
        });
        sink.upsert_holding(PortfolioHolding {
            ticker: "aapl".into(),
            quantity: 3.0,
            avg_price: Some(190.0),
        });
        let portfolio = sink.portfolio_context();
        assert_eq!(portfolio.len(), 1);
        assert_eq!(portfolio[0].quantity, 3.0);

        assert!(sink.remove_holding("AAPL"));
        assert!(sink.portfolio_context().is_empty());
    }
}
