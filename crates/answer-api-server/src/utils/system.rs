use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use sysinfo::System;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub used_mb: u64,
    pub total_mb: u64,
    pub usage_percent: f64,
}

/// Host memory snapshot for health reporting
#[derive(Clone)]
pub struct SystemMonitor {
    system: Arc<Mutex<System>>,
}

impl SystemMonitor {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let mut sys = self.system.lock();
        sys.refresh_memory();

        let total = sys.total_memory();
        let used = sys.used_memory();
        let usage_percent = if total == 0 {
            0.0
        } else {
            (used as f64 / total as f64) * 100.0
        };

        MemoryUsage {
            used_mb: used / 1024 / 1024,
            total_mb: total / 1024 / 1024,
            usage_percent,
        }
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_usage_is_sane() {
        let usage = SystemMonitor::new().memory_usage();
        assert!(usage.used_mb <= usage.total_mb);
        assert!((0.0..=100.0).contains(&usage.usage_percent));
    }
}
