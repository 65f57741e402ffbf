//! Self-observation statistics for the port manager.
//!
//! Tracks scan cycle performance, publication fan-out, termination outcomes
//! and HTTP traffic. Everything here is lock-light: counters are atomics and
//! running statistics sit behind short-lived mutexes.

use std::collections::VecDeque;
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock as StdRwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Point-in-time copy of a `Stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatSummary {
    pub last: f64,
    pub avg: f64,
    pub max: f64,
    pub min: f64,
    pub count: u64,
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    pub fn summary(&self) -> StatSummary {
        match self.inner.lock() {
            Ok(s) => StatSummary {
                last: s.last,
                avg: s.avg(),
                max: s.max,
                min: s.min,
                count: s.count,
            },
            Err(_) => StatSummary::default(),
        }
    }
}

/// Sliding window of HTTP request instants, pruned to ten minutes.
pub struct RequestTimestamps {
    inner: Mutex<VecDeque<Instant>>,
}

impl Default for RequestTimestamps {
    fn default() -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(256)),
        }
    }
}

impl RequestTimestamps {
    const RETENTION: Duration = Duration::from_secs(600);

    pub fn record(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            let now = Instant::now();
            guard.push_back(now);
            while guard
                .front()
                .is_some_and(|&t| now.duration_since(t) > Self::RETENTION)
            {
                guard.pop_front();
            }
        }
    }

    pub fn count_last_minute(&self) -> u64 {
        match self.inner.lock() {
            Ok(guard) => guard
                .iter()
                .filter(|t| t.elapsed() <= Duration::from_secs(60))
                .count() as u64,
            Err(_) => 0,
        }
    }
}

/// Health statistics shared by the scan loop, the hub and the HTTP layer.
pub struct HealthStats {
    // Scan cycles
    pub scan_duration_seconds: Stat,
    pub user_bindings: Stat,
    pub system_bindings: Stat,
    pub scan_cycles: AtomicU64,
    pub scan_failures: AtomicU64,
    pub skipped_ticks: AtomicU64,
    pub discarded_late_cycles: AtomicU64,

    // Publication
    pub publishes: AtomicU64,
    pub suppressed_publishes: AtomicU64,
    pub refresh_requests: AtomicU64,
    pub observer_drops: AtomicU64,

    // Termination
    pub terminations_ok: AtomicU64,
    pub terminations_partial: AtomicU64,
    pub terminations_failed: AtomicU64,
    pub terminations_already_gone: AtomicU64,

    // HTTP server
    pub http_request_timestamps: RequestTimestamps,
    pub request_duration_ms: Stat,
    pub ports_endpoint_calls: AtomicU64,

    pub start_time: Instant,
    last_success: StdRwLock<Option<(Instant, DateTime<Utc>)>>,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            scan_duration_seconds: Stat::default(),
            user_bindings: Stat::default(),
            system_bindings: Stat::default(),
            scan_cycles: AtomicU64::new(0),
            scan_failures: AtomicU64::new(0),
            skipped_ticks: AtomicU64::new(0),
            discarded_late_cycles: AtomicU64::new(0),
            publishes: AtomicU64::new(0),
            suppressed_publishes: AtomicU64::new(0),
            refresh_requests: AtomicU64::new(0),
            observer_drops: AtomicU64::new(0),
            terminations_ok: AtomicU64::new(0),
            terminations_partial: AtomicU64::new(0),
            terminations_failed: AtomicU64::new(0),
            terminations_already_gone: AtomicU64::new(0),
            http_request_timestamps: RequestTimestamps::default(),
            request_duration_ms: Stat::default(),
            ports_endpoint_calls: AtomicU64::new(0),
            start_time: Instant::now(),
            last_success: StdRwLock::new(None),
        }
    }
}

/// Outcome bucket of one termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    Terminated,
    AlreadyGone,
    Partial,
    Failed,
}

impl TerminationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationOutcome::Terminated => "terminated",
            TerminationOutcome::AlreadyGone => "already_gone",
            TerminationOutcome::Partial => "partial",
            TerminationOutcome::Failed => "failed",
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    /// Records a completed cycle and marks it as the latest success.
    pub fn record_scan(&self, user: usize, system: usize, duration_seconds: f64) {
        self.scan_duration_seconds.add_sample(duration_seconds);
        self.user_bindings.add_sample(user as f64);
        self.system_bindings.add_sample(system as f64);
        self.scan_cycles.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_success.write() {
            *guard = Some((Instant::now(), Utc::now()));
        }
    }

    pub fn record_scan_failure(&self) {
        self.scan_cycles.fetch_add(1, Ordering::Relaxed);
        self.scan_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_tick(&self) {
        self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded_cycle(&self) {
        self.discarded_late_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish(&self, published: bool) {
        if published {
            self.publishes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.suppressed_publishes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_refresh_request(&self) {
        self.refresh_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_observer_drops(&self, count: usize) {
        self.observer_drops.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_termination(&self, outcome: TerminationOutcome) {
        let counter = match outcome {
            TerminationOutcome::Terminated => &self.terminations_ok,
            TerminationOutcome::AlreadyGone => &self.terminations_already_gone,
            TerminationOutcome::Partial => &self.terminations_partial,
            TerminationOutcome::Failed => &self.terminations_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_http_request(&self) {
        self.http_request_timestamps.record();
    }

    pub fn record_request_duration(&self, duration_ms: f64) {
        self.request_duration_ms.add_sample(duration_ms);
    }

    pub fn record_ports_endpoint_call(&self) {
        self.ports_endpoint_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the last successful cycle, `None` before the first one.
    pub fn last_success_age(&self) -> Option<Duration> {
        self.last_success
            .read()
            .ok()
            .and_then(|guard| guard.map(|(at, _)| at.elapsed()))
    }

    pub fn get_last_scan_time_str(&self) -> String {
        match self.last_success.read() {
            Ok(guard) => guard
                .map(|(_, wall)| wall.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            Err(_) => "N/A".to_string(),
        }
    }

    pub fn get_scan_success_rate(&self) -> f64 {
        let total = self.scan_cycles.load(Ordering::Relaxed);
        let failures = self.scan_failures.load(Ordering::Relaxed);
        if total == 0 {
            100.0
        } else {
            (total.saturating_sub(failures) as f64 / total as f64) * 100.0
        }
    }

    pub fn get_uptime_hours(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64() / 3600.0
    }

    pub fn render_table(&self) -> String {
        const LEFT: usize = 28;
        const COL: usize = 12;

        fn stat_row(out: &mut String, label: &str, s: StatSummary, precision: usize) {
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                label,
                format!("{:.p$}", s.last, p = precision),
                format!("{:.p$}", s.avg, p = precision.max(1)),
                format!("{:.p$}", s.max, p = precision),
                format!("{:.p$}", s.min, p = precision),
                left = LEFT,
                col = COL
            )
            .ok();
        }

        fn value_row(out: &mut String, label: &str, value: String) {
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                label,
                value,
                "N/A",
                "N/A",
                "N/A",
                left = LEFT,
                col = COL
            )
            .ok();
        }

        fn section(out: &mut String, title: &str) {
            writeln!(out).ok();
            writeln!(out, "{}", title).ok();
            writeln!(out, "{}", "-".repeat(title.len())).ok();
        }

        let load = |c: &AtomicU64| c.load(Ordering::Relaxed).to_string();
        let mut out = String::new();

        writeln!(out, "HEALTH ENDPOINT - PORT MANAGER INTERNAL STATS").ok();
        writeln!(out, "==============================================").ok();
        writeln!(out).ok();
        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = LEFT,
            col = COL
        )
        .ok();

        section(&mut out, "SCAN CYCLES");
        stat_row(&mut out, "scan_duration (s)", self.scan_duration_seconds.summary(), 3);
        stat_row(&mut out, "user_bindings", self.user_bindings.summary(), 0);
        stat_row(&mut out, "system_bindings", self.system_bindings.summary(), 0);
        value_row(&mut out, "scan_cycles_total", load(&self.scan_cycles));
        value_row(&mut out, "scan_failures_total", load(&self.scan_failures));
        value_row(
            &mut out,
            "scan_success_rate (%)",
            format!("{:.1}", self.get_scan_success_rate()),
        );
        value_row(&mut out, "skipped_ticks_total", load(&self.skipped_ticks));
        value_row(
            &mut out,
            "discarded_late_cycles",
            load(&self.discarded_late_cycles),
        );

        section(&mut out, "PUBLICATION");
        value_row(&mut out, "publishes_total", load(&self.publishes));
        value_row(
            &mut out,
            "suppressed_unchanged",
            load(&self.suppressed_publishes),
        );
        value_row(&mut out, "refresh_requests", load(&self.refresh_requests));
        value_row(&mut out, "observer_drops", load(&self.observer_drops));

        section(&mut out, "TERMINATION");
        value_row(&mut out, "terminated", load(&self.terminations_ok));
        value_row(
            &mut out,
            "already_gone",
            load(&self.terminations_already_gone),
        );
        value_row(&mut out, "partial", load(&self.terminations_partial));
        value_row(&mut out, "failed", load(&self.terminations_failed));

        section(&mut out, "HTTP SERVER");
        value_row(
            &mut out,
            "http_requests_last_minute",
            self.http_request_timestamps.count_last_minute().to_string(),
        );
        stat_row(
            &mut out,
            "request_duration (ms)",
            self.request_duration_ms.summary(),
            1,
        );
        value_row(&mut out, "ports_endpoint_calls", load(&self.ports_endpoint_calls));

        writeln!(out).ok();
        writeln!(out, "uptime: {:.2} h", self.get_uptime_hours()).ok();
        writeln!(out, "last successful scan: {}", self.get_last_scan_time_str()).ok();

        out
    }
}
