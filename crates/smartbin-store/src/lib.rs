//! `smartbin-store` – the shared-state adapter.
//!
//! The bin reconciles with a remote key-path store that doubles as its
//! configuration channel (operator intents, registration requests) and its
//! status display. Every call is an independent round trip with no atomicity
//! across paths.
//!
//! # Modules
//!
//! - [`store`] – the [`SharedStore`] trait and [`StoreError`].
//! - [`firebase`] – [`FirebaseStore`]: Realtime Database REST backend.
//! - [`memory`] – [`MemoryStore`]: in-process backend with an operation log.
//! - [`adapter`] – [`StateAdapter`]: typed, failure-absorbing accessors.
//! - [`paths`] – every key path the controller reads or writes.

pub mod adapter;
pub mod firebase;
pub mod memory;
pub mod paths;
pub mod store;

pub use adapter::StateAdapter;
pub use firebase::FirebaseStore;
pub use memory::{MemoryStore, StoreOp};
pub use store::{SharedStore, StoreError};
