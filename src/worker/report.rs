//! Human-readable worker output: the startup banner, run reports and metadata.

use std::time::Duration;

use serde::Serialize;

use crate::stop::StopReason;

/// Banner printed before the poll loop starts.
///
/// ```text
/// Consuming messages from transports "async, failed".
/// The worker will automatically exit once it has processed 10 messages or received a stop signal.
/// Quit the worker with CONTROL-C.
/// ```
pub fn startup_banner(receiver_names: &[String], stops_when: &str) -> String {
    let mut banner = format!(
        "Consuming messages from transport{} \"{}\".\n",
        if receiver_names.len() > 1 { "s" } else { "" },
        receiver_names.join(", ")
    );
    if !stops_when.is_empty() {
        banner.push_str(&format!(
            "The worker will automatically exit once it has {}.\n",
            stops_when
        ));
    }
    banner.push_str("Quit the worker with CONTROL-C.\n");
    banner
}

/// Outcome of one `run`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub exit_code: i32,
    pub processed: u64,
    pub failed: u64,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn summary(&self) -> String {
        format!(
            "Worker stopped: it has {} ({} handled, {} failed, {:.1}s).",
            self.stop_reason,
            self.processed,
            self.failed,
            self.elapsed.as_secs_f64()
        )
    }
}

/// What a worker consumes and where it dispatches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerMetadata {
    /// Configured receivers, in priority order
    pub transport_names: Vec<String>,
    /// Receivers actually polled when `queues` narrows the set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_names: Option<Vec<String>>,
    /// Named bus, or `None` for type-based routing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_name: Option<String>,
}
