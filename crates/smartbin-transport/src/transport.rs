//! [`Transport`] – bounded-timeout command/response exchange.
//!
//! Every call to [`Transport::send`] opens the [`ResponseSlot`], publishes the
//! command once, then suspends until the receive task stores an answer or the
//! timeout elapses. Calls are serialised internally, so at most one command
//! is ever in flight even if several tasks share a transport.

use std::sync::Arc;
use std::time::Duration;

use smartbin_types::{BinError, DeviceCommand};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::link::CommandLink;
use crate::slot::ResponseSlot;

/// Command/response exchange over a [`CommandLink`] and a [`ResponseSlot`].
pub struct Transport {
    link: Arc<dyn CommandLink>,
    slot: Arc<ResponseSlot>,
    in_flight: Mutex<()>,
}

impl Transport {
    /// Build a transport from an outbound link and the slot its receive task
    /// writes to.
    pub fn new(link: Arc<dyn CommandLink>, slot: Arc<ResponseSlot>) -> Self {
        Self {
            link,
            slot,
            in_flight: Mutex::new(()),
        }
    }

    /// The slot fed by this transport's receive task.
    pub fn slot(&self) -> Arc<ResponseSlot> {
        Arc::clone(&self.slot)
    }

    /// Publish `command` and wait up to `timeout` for its response.
    ///
    /// Returns `Ok(None)` on timeout. No retry happens here; retry policy
    /// belongs to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`BinError::Transport`] if the command could not be published.
    pub async fn send(
        &self,
        command: &DeviceCommand,
        timeout: Duration,
    ) -> Result<Option<String>, BinError> {
        let _in_flight = self.in_flight.lock().await;
        let token = command.token();

        let deadline = Instant::now() + timeout;

        self.slot.arm();
        // The publish shares the caller's deadline with the response wait.
        let published = tokio::time::timeout_at(deadline, self.link.publish(&token))
            .await
            .unwrap_or_else(|_| Err(BinError::Transport(format!("publishing {token} timed out"))));
        if let Err(e) = published {
            self.slot.disarm();
            warn!(command = %token, error = %e, "failed to publish command");
            return Err(e);
        }
        debug!(command = %token, "sent command");

        let remaining = deadline.saturating_duration_since(Instant::now());
        let response = self.slot.wait(remaining).await;
        self.slot.disarm();

        match &response {
            Some(r) => debug!(command = %token, response = %r, "received response"),
            None => warn!(
                command = %token,
                timeout_ms = timeout.as_millis() as u64,
                "timed out waiting for response"
            ),
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Link that records every published token and optionally answers
    /// through the slot after a delay.
    struct ScriptedLink {
        slot: Arc<ResponseSlot>,
        sent: StdMutex<Vec<String>>,
        reply: Option<(&'static str, Duration)>,
        fail: bool,
    }

    #[async_trait]
    impl CommandLink for ScriptedLink {
        async fn publish(&self, command: &str) -> Result<(), BinError> {
            if self.fail {
                return Err(BinError::Transport("broker down".to_string()));
            }
            self.sent.lock().unwrap().push(command.to_string());
            if let Some((reply, delay)) = self.reply {
                let slot = Arc::clone(&self.slot);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    slot.offer(reply);
                });
            }
            Ok(())
        }
    }

    /// Link whose publish never completes, like a client stuck on a full
    /// request queue.
    struct StalledLink;

    #[async_trait]
    impl CommandLink for StalledLink {
        async fn publish(&self, _command: &str) -> Result<(), BinError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn transport_with(
        reply: Option<(&'static str, Duration)>,
        fail: bool,
    ) -> (Transport, Arc<ScriptedLink>) {
        let slot = Arc::new(ResponseSlot::new());
        let link = Arc::new(ScriptedLink {
            slot: Arc::clone(&slot),
            sent: StdMutex::new(Vec::new()),
            reply,
            fail,
        });
        let transport = Transport::new(link.clone(), slot);
        (transport, link)
    }

    #[tokio::test(start_paused = true)]
    async fn send_returns_response() {
        let (transport, link) = transport_with(Some(("37", Duration::from_millis(200))), false);
        let got = transport
            .send(&DeviceCommand::GetUltra, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(got.as_deref(), Some("37"));
        assert_eq!(link.sent.lock().unwrap().as_slice(), ["get_ultra"]);
        assert!(!transport.slot().is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn send_times_out_without_blocking_past_the_bound() {
        let (transport, _link) = transport_with(None, false);
        let start = Instant::now();
        let got = transport
            .send(&DeviceCommand::GetIr, Duration::from_millis(1500))
            .await
            .unwrap();
        assert!(got.is_none());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1500));
        assert!(elapsed < Duration::from_millis(1600), "blocked for {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn publish_failure_is_a_transport_error() {
        let (transport, _link) = transport_with(None, true);
        let err = transport
            .send(&DeviceCommand::OpenLid, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, BinError::Transport(_)));
        assert!(!transport.slot().is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn late_response_is_not_attributed_to_the_next_command() {
        // The device answers 3 s after every command, past the 2 s bound.
        let (transport, _link) = transport_with(Some(("late", Duration::from_secs(3))), false);
        let first = transport
            .send(&DeviceCommand::GetUltra, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(first.is_none());

        // Let the late answer to the first command arrive while idle.
        tokio::time::sleep(Duration::from_secs(2)).await;

        let second = transport
            .send(&DeviceCommand::GetGas, Duration::from_millis(500))
            .await
            .unwrap();
        assert!(second.is_none(), "stale response leaked into the next command");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_serialised() {
        let (transport, link) = transport_with(Some(("ok", Duration::from_millis(100))), false);
        let transport = Arc::new(transport);

        let a = {
            let t = Arc::clone(&transport);
            tokio::spawn(async move { t.send(&DeviceCommand::OpenLid, Duration::from_secs(2)).await })
        };
        let b = {
            let t = Arc::clone(&transport);
            tokio::spawn(async move { t.send(&DeviceCommand::CloseLid, Duration::from_secs(2)).await })
        };

        assert_eq!(a.await.unwrap().unwrap().as_deref(), Some("ok"));
        assert_eq!(b.await.unwrap().unwrap().as_deref(), Some("ok"));
        assert_eq!(link.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_publish_is_bounded_by_the_timeout() {
        let transport = Transport::new(Arc::new(StalledLink), Arc::new(ResponseSlot::new()));
        let start = Instant::now();
        let err = transport
            .send(&DeviceCommand::Compaction, Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, BinError::Transport(_)));
        let elapsed = start.elapsed();
        assert!(elapsed < Duration::from_millis(600), "blocked for {elapsed:?}");
        assert!(!transport.slot().is_pending());
    }
}
