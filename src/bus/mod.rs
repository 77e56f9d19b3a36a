//! Message buses - where a worker sends what it receives.
//!
//! A [`MessageBus`] dispatches one envelope to its handler. A [`RoutableBus`]
//! additionally hands out named buses so that a worker started with the `bus`
//! option can bypass routing.

mod router;

use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use thiserror::Error;

use crate::transport::Envelope;

pub use router::BusRouter;

/// A handler failed to process a message. Counted, never fatal to the loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Handling \"{message_type}\" failed: {reason}")]
pub struct HandlerError {
    pub message_type: String,
    pub reason: String,
}

impl HandlerError {
    pub fn new(message_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn dispatch(&self, envelope: Envelope) -> Result<Envelope, HandlerError>;
}

/// A bus that routes on its own and can also return a specific bus by name.
pub trait RoutableBus: MessageBus {
    fn named(&self, name: &str) -> Option<Arc<dyn MessageBus>>;

    fn bus_names(&self) -> Vec<String>;
}

/// Accepts every message and logs it.
#[derive(Debug, Clone)]
pub struct LoggingBus {
    name: String,
}

impl LoggingBus {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl MessageBus for LoggingBus {
    async fn dispatch(&self, envelope: Envelope) -> Result<Envelope, HandlerError> {
        info!(
            "[{}] {} {} from {}: {}",
            self.name,
            envelope.message_type,
            envelope.id,
            envelope.received_from.as_deref().unwrap_or("-"),
            envelope.body
        );
        Ok(envelope)
    }
}

/// Bus backed by a plain function, for embedding simple handlers.
pub struct FnBus<F>
where
    F: Fn(&Envelope) -> Result<(), HandlerError> + Send + Sync,
{
    handler: F,
}

impl<F> FnBus<F>
where
    F: Fn(&Envelope) -> Result<(), HandlerError> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> MessageBus for FnBus<F>
where
    F: Fn(&Envelope) -> Result<(), HandlerError> + Send + Sync,
{
    async fn dispatch(&self, envelope: Envelope) -> Result<Envelope, HandlerError> {
        (self.handler)(&envelope)?;
        Ok(envelope)
    }
}
