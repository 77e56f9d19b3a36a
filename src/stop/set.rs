//! Ordered stop condition set.
//!
//! Conditions are evaluated in a fixed order (message limit, failure limit,
//! memory limit, time limit, restart signal, interrupt) and the first one that
//! holds is the reason the run ends. The restart signal and the interrupt are
//! always present so a worker without limits can still be stopped.

use std::sync::Arc;

use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::options::WorkerOptions;
use crate::signal::RestartSignalStore;
use crate::stop::condition::{LoopState, StopCondition, StopReason};
use crate::stop::memory::MemoryProbe;

pub struct StopConditionSet {
    conditions: Vec<StopCondition>,
    signal_store: Arc<dyn RestartSignalStore>,
    memory_probe: Arc<dyn MemoryProbe>,
    interrupt: CancellationToken,
}

impl StopConditionSet {
    /// Build the set for one run from validated options.
    pub fn new(
        options: &WorkerOptions,
        signal_store: Arc<dyn RestartSignalStore>,
        memory_probe: Arc<dyn MemoryProbe>,
        interrupt: CancellationToken,
    ) -> Self {
        let mut conditions = Vec::new();

        if let Some(limit) = options.limit {
            conditions.push(StopCondition::MessageLimit(limit));
        }
        if let Some(limit) = options.failure_limit {
            conditions.push(StopCondition::FailureLimit(limit));
        }
        if let Some(memory) = &options.memory_limit {
            let bytes = memory.bytes();
            if bytes == 0 {
                warn!(
                    "Memory limit \"{}\" parses to 0 bytes; the worker will stop after its first check",
                    memory.raw()
                );
            }
            conditions.push(StopCondition::MemoryLimit {
                raw: memory.raw().to_string(),
                bytes,
            });
        }
        if let Some(secs) = options.time_limit {
            conditions.push(StopCondition::TimeLimit(secs));
        }
        conditions.push(StopCondition::RestartSignal);
        conditions.push(StopCondition::Interrupted);

        Self {
            conditions,
            signal_store,
            memory_probe,
            interrupt,
        }
    }

    pub fn conditions(&self) -> &[StopCondition] {
        &self.conditions
    }

    /// Human-readable list of every configured trigger, e.g.
    /// `processed 10 messages, reached 2 failed messages or received a stop signal`.
    pub fn describe(&self) -> String {
        let mut phrases: Vec<String> = self
            .conditions
            .iter()
            .filter_map(StopCondition::describe)
            .collect();

        match phrases.pop() {
            None => String::new(),
            Some(last) if phrases.is_empty() => last,
            Some(last) => format!("{} or {}", phrases.join(", "), last),
        }
    }

    /// First condition that holds for `state`, in precedence order.
    ///
    /// Fails only when the restart signal store cannot be read.
    pub fn should_stop(&self, state: &LoopState) -> Result<Option<StopReason>> {
        for condition in &self.conditions {
            if let Some(reason) = self.check(condition, state)? {
                info!("Worker stopping: it has {}", reason);
                return Ok(Some(reason));
            }
        }
        Ok(None)
    }

    fn check(&self, condition: &StopCondition, state: &LoopState) -> Result<Option<StopReason>> {
        let reason = match condition {
            StopCondition::MessageLimit(limit) => {
                (state.processed >= *limit).then_some(StopReason::MessageLimit(*limit))
            }
            StopCondition::FailureLimit(limit) => {
                (state.failed >= *limit).then_some(StopReason::FailureLimit(*limit))
            }
            StopCondition::MemoryLimit { raw, bytes } => {
                let usage_bytes = self.memory_probe.usage_bytes();
                (usage_bytes >= *bytes).then(|| StopReason::MemoryLimit {
                    limit: raw.clone(),
                    usage_bytes,
                })
            }
            StopCondition::TimeLimit(secs) => (state.elapsed().as_secs() >= *secs)
                .then_some(StopReason::TimeLimit(*secs)),
            StopCondition::RestartSignal => self
                .signal_store
                .last_requested_at()?
                .filter(|requested_at| *requested_at > state.started_at_micros)
                .map(|_| StopReason::RestartSignal),
            StopCondition::Interrupted => {
                self.interrupt.is_cancelled().then_some(StopReason::Interrupted)
            }
        };
        Ok(reason)
    }
}
