//! Message transports - where a worker's messages come from.
//!
//! Receivers are looked up by name through a [`ReceiverLocator`]. Two
//! receivers ship with the crate: an in-memory FIFO and a SQLite queue that
//! several processes can consume from.

mod envelope;
mod receiver;
mod sqlite;

pub use envelope::Envelope;
pub use receiver::{MemoryReceiver, Receiver, ReceiverLocator, ReceiverMap};
pub use sqlite::{DEFAULT_REDELIVER_TIMEOUT, MessageStatus, QueueReceiver, SqliteTransport, queue_locator};
