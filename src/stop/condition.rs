//! Stop condition variants, the loop state they inspect, and stop reasons.

use std::fmt;
use std::time::{Duration, Instant};

use crate::id::now_micros;

/// Counters and clocks for one worker run.
#[derive(Debug, Clone)]
pub struct LoopState {
    /// Monotonic start, for elapsed-time checks
    pub started_at: Instant,
    /// Wall-clock start in microseconds, compared against restart signals
    pub started_at_micros: i64,
    /// Messages handled, successful or not
    pub processed: u64,
    /// Messages whose handler failed
    pub failed: u64,
}

impl LoopState {
    pub fn start() -> Self {
        Self {
            started_at: Instant::now(),
            started_at_micros: now_micros(),
            processed: 0,
            failed: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.processed += 1;
    }

    pub fn record_failure(&mut self) {
        self.processed += 1;
        self.failed += 1;
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Why a run ended. Exactly one is reported per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    MessageLimit(u64),
    FailureLimit(u64),
    MemoryLimit { limit: String, usage_bytes: u64 },
    TimeLimit(u64),
    RestartSignal,
    Interrupted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::MessageLimit(n) => write!(f, "processed {} messages", n),
            StopReason::FailureLimit(n) => write!(f, "reached {} failed messages", n),
            StopReason::MemoryLimit { limit, .. } => write!(f, "exceeded {} of memory", limit),
            StopReason::TimeLimit(secs) => write!(f, "been running for {}s", secs),
            StopReason::RestartSignal => write!(f, "received a stop signal"),
            StopReason::Interrupted => write!(f, "been interrupted"),
        }
    }
}

/// One configured predicate. The declaration order here is the precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopCondition {
    MessageLimit(u64),
    FailureLimit(u64),
    MemoryLimit { raw: String, bytes: u64 },
    TimeLimit(u64),
    RestartSignal,
    Interrupted,
}

impl StopCondition {
    /// Banner phrase, or `None` for conditions the banner does not list.
    pub fn describe(&self) -> Option<String> {
        match self {
            StopCondition::MessageLimit(n) => Some(format!("processed {} messages", n)),
            StopCondition::FailureLimit(n) => Some(format!("reached {} failed messages", n)),
            StopCondition::MemoryLimit { raw, .. } => Some(format!("exceeded {} of memory", raw)),
            StopCondition::TimeLimit(secs) => Some(format!("been running for {}s", secs)),
            StopCondition::RestartSignal => Some("received a stop signal".to_string()),
            StopCondition::Interrupted => None,
        }
    }
}
