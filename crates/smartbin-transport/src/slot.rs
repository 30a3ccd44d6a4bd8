//! [`ResponseSlot`] – the one-item mailbox between the receive task and the
//! caller blocked in [`Transport::send`][crate::transport::Transport::send].
//!
//! The receive task is the only writer. A response is stored only while a
//! command is pending; anything arriving outside that window is logged and
//! dropped so a late answer can never be attributed to the next command.
//! A second response for the same pending command overwrites the first.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

#[derive(Default)]
struct SlotState {
    pending: bool,
    response: Option<String>,
}

/// Single pending-response slot shared by a transport and its receive task.
#[derive(Default)]
pub struct ResponseSlot {
    state: Mutex<SlotState>,
    notify: Notify,
}

impl ResponseSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a response from the inbound topic.
    ///
    /// Returns `true` when the response was stored for the pending command,
    /// `false` when it was discarded because nothing is pending.
    pub fn offer(&self, response: impl Into<String>) -> bool {
        let response = response.into();
        {
            let mut state = self.lock();
            if !state.pending {
                debug!(%response, "discarding response with no pending command");
                return false;
            }
            state.response = Some(response);
        }
        self.notify.notify_one();
        true
    }

    /// `true` while a command is waiting for its response.
    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }

    /// Open the slot for a new command, dropping anything buffered.
    pub(crate) fn arm(&self) {
        let mut state = self.lock();
        state.pending = true;
        state.response = None;
    }

    /// Close the slot once the caller has its answer (or gave up).
    pub(crate) fn disarm(&self) {
        let mut state = self.lock();
        state.pending = false;
        state.response = None;
    }

    fn take(&self) -> Option<String> {
        self.lock().response.take()
    }

    /// Wait until a response is stored or `timeout` elapses.
    pub(crate) async fn wait(&self, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(response) = self.take() {
                return Some(response);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                // One last look: the writer may have landed right at the deadline.
                return self.take();
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn offer_without_pending_command_is_discarded() {
        let slot = ResponseSlot::new();
        assert!(!slot.offer("stale"));
        assert!(slot.take().is_none());
    }

    #[test]
    fn arm_clears_buffered_response() {
        let slot = ResponseSlot::new();
        slot.arm();
        assert!(slot.offer("old"));
        slot.arm();
        assert!(slot.take().is_none());
    }

    #[test]
    fn later_response_overwrites_earlier_one() {
        let slot = ResponseSlot::new();
        slot.arm();
        slot.offer("first");
        slot.offer("second");
        assert_eq!(slot.take().as_deref(), Some("second"));
    }

    #[test]
    fn disarm_closes_the_slot() {
        let slot = ResponseSlot::new();
        slot.arm();
        assert!(slot.is_pending());
        slot.disarm();
        assert!(!slot.is_pending());
        assert!(!slot.offer("late"));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_returns_response_offered_from_another_task() {
        let slot = Arc::new(ResponseSlot::new());
        slot.arm();

        let writer = Arc::clone(&slot);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            writer.offer("42");
        });

        let got = slot.wait(Duration::from_secs(2)).await;
        assert_eq!(got.as_deref(), Some("42"));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_gives_up_at_the_deadline() {
        let slot = ResponseSlot::new();
        slot.arm();

        let start = Instant::now();
        let got = slot.wait(Duration::from_millis(1500)).await;
        assert!(got.is_none());
        assert!(start.elapsed() >= Duration::from_millis(1500));
        assert!(start.elapsed() < Duration::from_millis(1600));
    }
}
