//! Process memory sampling for the memory-limit stop condition.

use std::sync::Mutex;

use log::{debug, warn};
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Reports how much memory this process currently uses, in bytes.
pub trait MemoryProbe: Send + Sync {
    fn usage_bytes(&self) -> u64;
}

/// Resident set size of the current process, via sysinfo.
pub struct ProcessMemoryProbe {
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl ProcessMemoryProbe {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| debug!("Cannot determine current pid: {}", e))
            .ok();
        Self {
            pid,
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for ProcessMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn usage_bytes(&self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        let mut system = self.system.lock().unwrap_or_else(|poisoned| {
            warn!("Memory probe lock was poisoned, reusing the last sampler state");
            poisoned.into_inner()
        });
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }
}

/// Fixed reading, for tests and for hosts where sampling is not wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedMemoryProbe(pub u64);

impl MemoryProbe for FixedMemoryProbe {
    fn usage_bytes(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_probe_reports_nonzero_usage() {
        let probe = ProcessMemoryProbe::new();
        assert!(probe.usage_bytes() > 0);
    }

    #[test]
    fn test_poisoned_probe_still_samples() {
        let probe = std::sync::Arc::new(ProcessMemoryProbe::new());
        let holder = probe.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.system.lock().unwrap();
            panic!("sampler panicked");
        })
        .join();

        assert!(probe.system.is_poisoned());
        assert!(probe.usage_bytes() > 0);
    }

    #[test]
    fn test_fixed_probe() {
        assert_eq!(FixedMemoryProbe(4096).usage_bytes(), 4096);
    }
}
