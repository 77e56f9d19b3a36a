//! Receiver and locator traits, plus an in-memory receiver.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Result, WorkerError};
use crate::transport::envelope::Envelope;

/// A source of pending messages.
#[async_trait]
pub trait Receiver: Send + Sync {
    /// Fetch pending messages. An empty batch means no work right now.
    async fn get(&self) -> Result<Vec<Envelope>>;

    /// Mark a message as handled.
    async fn ack(&self, envelope: &Envelope) -> Result<()>;

    /// Mark a message as failed.
    async fn reject(&self, envelope: &Envelope) -> Result<()>;
}

/// Resolves receiver names to receivers.
pub trait ReceiverLocator: Send + Sync {
    fn has(&self, name: &str) -> bool;

    fn get(&self, name: &str) -> Option<Arc<dyn Receiver>>;

    /// Every name this locator can resolve, for diagnostics.
    fn names(&self) -> Vec<String>;
}

/// Map-backed locator.
#[derive(Default, Clone)]
pub struct ReceiverMap {
    receivers: BTreeMap<String, Arc<dyn Receiver>>,
}

impl ReceiverMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, receiver: Arc<dyn Receiver>) -> Self {
        self.insert(name, receiver);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, receiver: Arc<dyn Receiver>) {
        self.receivers.insert(name.into(), receiver);
    }
}

impl ReceiverLocator for ReceiverMap {
    fn has(&self, name: &str) -> bool {
        self.receivers.contains_key(name)
    }

    fn get(&self, name: &str) -> Option<Arc<dyn Receiver>> {
        self.receivers.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        self.receivers.keys().cloned().collect()
    }
}

/// In-memory FIFO receiver handing out one message per fetch.
#[derive(Debug, Default)]
pub struct MemoryReceiver {
    pending: Mutex<VecDeque<Envelope>>,
    acked: Mutex<Vec<Envelope>>,
    rejected: Mutex<Vec<Envelope>>,
}

impl MemoryReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: impl IntoIterator<Item = Envelope>) -> Self {
        let receiver = Self::new();
        for message in messages {
            receiver.push(message);
        }
        receiver
    }

    pub fn push(&self, envelope: Envelope) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push_back(envelope);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn acked(&self) -> Vec<Envelope> {
        self.acked.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn rejected(&self) -> Vec<Envelope> {
        self.rejected.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Receiver for MemoryReceiver {
    async fn get(&self) -> Result<Vec<Envelope>> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| WorkerError::Receiver(e.to_string()))?;
        Ok(pending.pop_front().into_iter().collect())
    }

    async fn ack(&self, envelope: &Envelope) -> Result<()> {
        self.acked
            .lock()
            .map_err(|e| WorkerError::Receiver(e.to_string()))?
            .push(envelope.clone());
        Ok(())
    }

    async fn reject(&self, envelope: &Envelope) -> Result<()> {
        self.rejected
            .lock()
            .map_err(|e| WorkerError::Receiver(e.to_string()))?
            .push(envelope.clone());
        Ok(())
    }
}
