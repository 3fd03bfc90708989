use std::io::Write;

use fredos_chat::{ChatMessage, InMemorySink, MessageKind, PortfolioHolding, Role, SessionSink};

/// Sink that keeps state in memory and renders assistant output as it streams.
///
/// Output goes to `out`; tool activity lines go to `log_out`.
pub struct TerminalSink<W: Write, L: Write> {
    state: InMemorySink,
    out: W,
    log_out: L,
    /// Assistant text already written for the message being streamed.
    printed: String,
}

impl<W: Write, L: Write> TerminalSink<W, L> {
    pub fn new(out: W, log_out: L) -> Self {
        Self {
            state: InMemorySink::default(),
            out,
            log_out,
            printed: String::new(),
        }
    }

    pub fn state(&self) -> &InMemorySink {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut InMemorySink {
        &mut self.state
    }

    fn render(&mut self, message: &ChatMessage) {
        if message.role != Role::Assistant {
            return;
        }
        if message.kind == MessageKind::Error {
            let _ = writeln!(self.out, "\n{}", message.content);
            self.printed.clear();
            let _ = self.out.flush();
            return;
        }
        match message.content.strip_prefix(self.printed.as_str()) {
            Some(delta) => {
                let _ = write!(self.out, "{delta}");
            }
            None => {
                // A planning block closed and vanished; repaint the reply.
                let _ = write!(self.out, "\n{}", message.content);
            }
        }
        self.printed.clone_from(&message.content);
        if !message.pending {
            let _ = writeln!(self.out);
            self.printed.clear();
        }
        let _ = self.out.flush();
    }
}

impl<W: Write, L: Write> SessionSink for TerminalSink<W, L> {
    fn append_message(&mut self, message: ChatMessage) {
        if message.role == Role::Assistant {
            self.printed.clear();
        }
        self.state.append_message(message);
    }

    fn mutate_message_by_id(&mut self, id: &str, update: &mut dyn FnMut(&mut ChatMessage)) -> bool {
        if !self.state.mutate_message_by_id(id, update) {
            return false;
        }
        if let Some(message) = self.state.message(id).cloned() {
            self.render(&message);
        }
        true
    }

    fn remove_message_by_id(&mut self, id: &str) -> bool {
        let removed = self.state.remove_message_by_id(id);
        if removed && !self.printed.is_empty() {
            let _ = writeln!(self.out, "\n^C (reply discarded)");
            let _ = self.out.flush();
        }
        self.printed.clear();
        removed
    }

    fn append_log(&mut self, line: String) {
        let _ = writeln!(self.log_out, "  · {line}");
        self.state.append_log(line);
    }

    fn replace_logs(&mut self, lines: Vec<String>) {
        self.state.replace_logs(lines);
    }

    fn set_watch_list(&mut self, ids: Vec<String>) {
        let _ = writeln!(self.log_out, "  · WATCH: {}", ids.join(", "));
        self.state.set_watch_list(ids);
    }

    fn session_id(&self) -> Option<String> {
        self.state.session_id()
    }

    fn set_session_id_if_absent(&mut self, id: String) -> bool {
        self.state.set_session_id_if_absent(id)
    }

    fn portfolio_context(&self) -> Vec<PortfolioHolding> {
        self.state.portfolio_context()
    }
}
