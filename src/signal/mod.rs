//! Cross-process worker signals.
//!
//! Workers poll the restart signal store once per iteration; the caller's own
//! interrupt (Ctrl-C) is delivered in-process through a [`StopHandle`].

pub mod handle;
pub mod store;

pub use handle::StopHandle;
pub use store::{RESTART_REQUESTED_TIMESTAMP_KEY, RestartSignalStore, SqliteSignalStore};
