//! Lightweight timing of named tick phases.
//!
//! `SimWorld` records into its profiler only when built with the `profile`
//! feature:
//! ```bash
//! cargo test --release --features profile
//! ```
//! Without the feature the profiler stays empty and costs nothing per tick.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

/// Collects timing data for named sections and aggregates it.
#[derive(Debug, Default)]
pub struct Profiler {
    sections: HashMap<&'static str, SectionStats>,
    tick_count: u64,
}

/// Statistics for one profiled section.
#[derive(Debug, Default, Clone, Copy)]
pub struct SectionStats {
    pub total_time: Duration,
    pub call_count: u64,
    pub min_time: Option<Duration>,
    pub max_time: Option<Duration>,
}

impl SectionStats {
    pub fn avg_time(&self) -> Duration {
        if self.call_count == 0 {
            Duration::ZERO
        } else {
            self.total_time / self.call_count as u32
        }
    }

    fn record(&mut self, elapsed: Duration) {
        self.total_time += elapsed;
        self.call_count += 1;
        self.min_time = Some(self.min_time.map_or(elapsed, |m| m.min(elapsed)));
        self.max_time = Some(self.max_time.map_or(elapsed, |m| m.max(elapsed)));
    }
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time a section using a closure.
    pub fn time_section<F, R>(&mut self, name: &'static str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        self.record(name, start.elapsed());
        result
    }

    /// Record an externally measured duration.
    pub fn record(&mut self, name: &'static str, elapsed: Duration) {
        self.sections.entry(name).or_default().record(elapsed);
    }

    pub fn tick(&mut self) {
        self.tick_count += 1;
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn get_section(&self, name: &str) -> Option<&SectionStats> {
        self.sections.get(name)
    }

    pub fn section_names(&self) -> Vec<&'static str> {
        self.sections.keys().copied().collect()
    }

    /// Table of all sections, slowest first.
    pub fn summary(&self) -> String {
        let mut sections: Vec<_> = self.sections.iter().collect();
        sections.sort_by(|a, b| b.1.total_time.cmp(&a.1.total_time));
        let total: Duration = sections.iter().map(|(_, s)| s.total_time).sum();

        let mut out = String::new();
        let _ = writeln!(out, "=== Profiler Summary ({} ticks) ===", self.tick_count);
        let _ = writeln!(
            out,
            "{:<20} {:>10} {:>10} {:>10} {:>10} {:>8}",
            "Section", "Total", "Avg", "Min", "Max", "% Time"
        );
        for (name, stats) in &sections {
            let pct = if total.as_nanos() > 0 {
                stats.total_time.as_nanos() as f64 / total.as_nanos() as f64 * 100.0
            } else {
                0.0
            };
            let _ = writeln!(
                out,
                "{:<20} {:>10.2?} {:>10.2?} {:>10.2?} {:>10.2?} {:>7.1}%",
                name,
                stats.total_time,
                stats.avg_time(),
                stats.min_time.unwrap_or(Duration::ZERO),
                stats.max_time.unwrap_or(Duration::ZERO),
                pct
            );
        }
        if self.tick_count > 0 {
            let avg_tick = total / self.tick_count as u32;
            let _ = writeln!(out, "{:<20} {:>10.2?}", "Avg per tick", avg_tick);
        }
        out
    }

    pub fn reset(&mut self) {
        self.sections.clear();
        self.tick_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_profiler_basic() {
        let mut profiler = Profiler::new();

        let value = profiler.time_section("test_section", || {
            sleep(Duration::from_millis(10));
            7
        });
        profiler.tick();

        assert_eq!(value, 7);
        let stats = profiler.get_section("test_section").unwrap();
        assert!(stats.total_time >= Duration::from_millis(10));
        assert_eq!(stats.call_count, 1);
    }

    #[test]
    fn test_profiler_multiple_sections() {
        let mut profiler = Profiler::new();

        for _ in 0..5 {
            profiler.time_section("fast", || sleep(Duration::from_millis(1)));
            profiler.time_section("slow", || sleep(Duration::from_millis(5)));
            profiler.tick();
        }

        assert_eq!(profiler.tick_count(), 5);
        let fast = profiler.get_section("fast").unwrap();
        let slow = profiler.get_section("slow").unwrap();
        assert_eq!(fast.call_count, 5);
        assert!(slow.total_time > fast.total_time);

        let summary = profiler.summary();
        let slow_line = summary.find("slow").unwrap();
        let fast_line = summary.find("fast").unwrap();
        assert!(slow_line < fast_line, "slowest section listed first");
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut profiler = Profiler::new();
        profiler.record("tick", Duration::from_micros(50));
        profiler.tick();
        profiler.reset();
        assert_eq!(profiler.tick_count(), 0);
        assert!(profiler.section_names().is_empty());
    }
}
