//! msgloop - a supervised message-consuming worker loop
//!
//! A worker polls one or more named receivers, dispatches each message to a
//! bus and keeps going until one of its stop conditions holds: a message,
//! failure, memory or time limit, a restart signal broadcast through a shared
//! store, or an interrupt from the caller.

pub mod bus;
pub mod error;
pub mod id;
pub mod options;
pub mod signal;
pub mod stop;
pub mod transport;
pub mod worker;

pub use error::{Result, WorkerError};
