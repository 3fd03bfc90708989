use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Default)]
struct Slot {
    generation: u64,
    token: Option<CancellationToken>,
}

/// Owns the cancellation token of the send currently in flight.
///
/// At most one token is live at a time. Clones share the same slot, so a
/// clone held by a UI or signal handler can stop a send started elsewhere.
#[derive(Clone, Default)]
pub struct CancellationController {
    slot: Arc<Mutex<Slot>>,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new send and returns its guard.
    ///
    /// Returns `None` when a send is already in flight.
    pub fn begin(&self) -> Option<SendGuard> {
        let mut slot = self.lock();
        if slot.token.is_some() {
            return None;
        }
        slot.generation = slot.generation.wrapping_add(1);
        let token = CancellationToken::new();
        slot.token = Some(token.clone());
        Some(SendGuard {
            controller: self.clone(),
            generation: slot.generation,
            token,
        })
    }

    /// Signals the in-flight send to stop. No-op when idle.
    ///
    /// Returns whether a send was signalled.
    pub fn stop(&self) -> bool {
        let slot = self.lock();
        match &slot.token {
            Some(token) => {
                debug!(generation = slot.generation, "stop requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_sending(&self) -> bool {
        self.lock().token.is_some()
    }

    fn release(&self, generation: u64) {
        let mut slot = self.lock();
        if slot.generation == generation {
            slot.token = None;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps a send registered with its controller; releases the slot on drop.
pub struct SendGuard {
    controller: CancellationController,
    generation: u64,
    token: CancellationToken,
}

impl SendGuard {
    /// Token shared with the transport and the dispatch loop.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for SendGuard {
    fn drop(&mut self) {
        self.controller.release(self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_when_idle_is_noop() {
        let controller = CancellationController::new();
        assert!(!controller.stop());
        assert!(!controller.is_sending());
    }

    #[test]
    fn only_one_send_in_flight() {
        let controller = CancellationController::new();
        let guard = controller.begin().expect("first send");
        assert!(controller.is_sending());
        assert!(controller.begin().is_none());
        drop(guard);
        assert!(!controller.is_sending());
        assert!(controller.begin().is_some());
    }

    #[test]
    fn stop_cancels_the_live_token_only() {
        let controller = CancellationController::new();
        let first = controller.begin().expect("first send");
        let first_token = first.token();
        assert!(controller.stop());
        assert!(first_token.is_cancelled());
        drop(first);

        let second = controller.begin().expect("second send");
        assert!(!second.token().is_cancelled());
    }

    #[test]
    fn clones_share_the_slot() {
        let controller = CancellationController::new();
        let remote = controller.clone();
        let guard = controller.begin().expect("send");
        assert!(remote.stop());
        assert!(guard.token().is_cancelled());
    }
}
