// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use std::time::Instant;

pub const TRACE_STARTUP_ENV_VAR: &str = "PLASMODIUM_TRACE_STARTUP";

/// Step timings during startup, printed when `PLASMODIUM_TRACE_STARTUP` is set
/// to anything but `0`.
pub struct StartupProfiler {
    enabled: bool,
    start: Instant,
    last: Instant,
}

impl StartupProfiler {
    pub fn new() -> Self {
        let enabled = std::env::var(TRACE_STARTUP_ENV_VAR)
            .map(|value| value != "0")
            .unwrap_or(false);
        Self::with_enabled(enabled)
    }

    pub fn with_enabled(enabled: bool) -> Self {
        let now = Instant::now();
        Self {
            enabled,
            start: now,
            last: now,
        }
    }

    /// Log the time since the previous mark. Returns the delta in milliseconds.
    pub fn mark(&mut self, label: &str) -> f64 {
        let now = Instant::now();
        let delta_ms = now.duration_since(self.last).as_secs_f64() * 1000.0;
        self.last = now;
        if self.enabled {
            let total_ms = now.duration_since(self.start).as_secs_f64() * 1000.0;
            log::info!(
                "[startup] {:>28}: +{:7.2} ms (total {:7.2} ms)",
                label,
                delta_ms,
                total_ms
            );
        }
        delta_ms
    }
}

impl Default for StartupProfiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_are_monotonic() {
        let mut profiler = StartupProfiler::with_enabled(false);
        let first = profiler.mark("a");
        let second = profiler.mark("b");
        assert!(first >= 0.0 && second >= 0.0);
    }
}
