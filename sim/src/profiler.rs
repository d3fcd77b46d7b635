//! Per-phase tick timing.
//!
//! `SimWorld` times its flight and battlefield phases into a [`Profiler`]
//! when built with the `profile` feature:
//! ```bash
//! cargo run --release --example basic_demo --features profile
//! ```
//!
//! Each tick's phase times are summed and compared against the tick budget
//! (the fixed timestep), so the summary shows how often the simulation
//! would have fallen behind real time.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

#[derive(Debug, Default, Clone)]
pub struct PhaseStats {
    pub total: Duration,
    pub calls: u64,
    pub fastest: Option<Duration>,
    pub slowest: Option<Duration>,
}

impl PhaseStats {
    pub fn mean(&self) -> Duration {
        match self.calls {
            0 => Duration::ZERO,
            n => self.total.div_f64(n as f64),
        }
    }

    fn record(&mut self, elapsed: Duration) {
        self.total += elapsed;
        self.calls += 1;
        self.fastest = Some(self.fastest.map_or(elapsed, |d| d.min(elapsed)));
        self.slowest = Some(self.slowest.map_or(elapsed, |d| d.max(elapsed)));
    }
}

#[derive(Debug, Default)]
pub struct Profiler {
    phases: BTreeMap<&'static str, PhaseStats>,
    /// Wall time allowed for one tick. Zero disables overrun counting.
    budget: Duration,
    /// Phase time accumulated since the last `tick`.
    current_tick: Duration,
    ticks: u64,
    overruns: u64,
    worst_tick: Duration,
}

impl Profiler {
    pub fn new(budget: Duration) -> Self {
        Self { budget, ..Default::default() }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Run `f` and charge its wall time to `phase`.
    pub fn time_section<F, R>(&mut self, phase: &'static str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();
        self.phases.entry(phase).or_default().record(elapsed);
        self.current_tick += elapsed;
        result
    }

    /// Close the current tick.
    pub fn tick(&mut self) {
        let spent = std::mem::take(&mut self.current_tick);
        self.ticks += 1;
        self.worst_tick = self.worst_tick.max(spent);
        if !self.budget.is_zero() && spent > self.budget {
            self.overruns += 1;
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Ticks whose phases together took longer than the budget.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn worst_tick(&self) -> Duration {
        self.worst_tick
    }

    pub fn phase(&self, name: &str) -> Option<&PhaseStats> {
        self.phases.get(name)
    }

    pub fn phases(&self) -> impl Iterator<Item = (&'static str, &PhaseStats)> {
        self.phases.iter().map(|(name, stats)| (*name, stats))
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        let total: Duration = self.phases.values().map(|s| s.total).sum();
        let _ = writeln!(out, "=== Tick profile: {} ticks, budget {:.2?} ===", self.ticks, self.budget);
        let _ = writeln!(out, "{:<14} {:>11} {:>11} {:>11} {:>11} {:>7}", "phase", "total", "mean", "fastest", "slowest", "share");
        for (name, stats) in &self.phases {
            let share = if total.is_zero() { 0.0 } else { stats.total.as_secs_f64() / total.as_secs_f64() * 100.0 };
            let _ = writeln!(
                out,
                "{:<14} {:>11.2?} {:>11.2?} {:>11.2?} {:>11.2?} {:>6.1}%",
                name,
                stats.total,
                stats.mean(),
                stats.fastest.unwrap_or_default(),
                stats.slowest.unwrap_or_default(),
                share
            );
        }
        if self.ticks > 0 {
            let mean_tick = total.div_f64(self.ticks as f64);
            let load = if self.budget.is_zero() { 0.0 } else { mean_tick.as_secs_f64() / self.budget.as_secs_f64() * 100.0 };
            let _ = writeln!(out, "mean tick {mean_tick:.2?} ({load:.1}% of budget), worst {:.2?}", self.worst_tick);
            let _ = writeln!(out, "{} of {} ticks over budget", self.overruns, self.ticks);
        }
        out
    }

    pub fn print_summary(&self) {
        println!("\n{}", self.summary());
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.budget);
    }
}
