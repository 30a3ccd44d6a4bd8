//! Outbound half of the command channel.
//!
//! The [`Transport`][crate::transport::Transport] never talks to a broker
//! directly. It hands the rendered command token to a [`CommandLink`], and the
//! matching receive task (spawned by whoever built the link) feeds responses
//! into the shared [`ResponseSlot`][crate::slot::ResponseSlot].

use async_trait::async_trait;
use smartbin_types::BinError;

/// Publishes command tokens on the outbound topic.
#[async_trait]
pub trait CommandLink: Send + Sync {
    /// Publish `command` exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`BinError::Transport`] when the message cannot be handed to
    /// the broker (disconnected client, full request queue, no listener).
    async fn publish(&self, command: &str) -> Result<(), BinError>;
}
