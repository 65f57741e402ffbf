//! Prometheus metrics definitions for herakles-port-manager.
//!
//! The scan loop and the hub keep their own counters in `HealthStats`;
//! these Prometheus collectors are synced from them at scrape time so the
//! pipeline never touches the registry.

use ahash::AHashMap as HashMap;
use herakles_port_manager::process::ALL_APP_TYPES;
use herakles_port_manager::{HealthStats, PublicationHub, TerminationOutcome};
use prometheus::{Gauge, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone)]
pub struct PortMetrics {
    pub bindings: IntGaugeVec,          // labels: group
    pub bindings_by_app_type: IntGaugeVec, // labels: app_type
    pub scan_duration_seconds: Gauge,
    pub scan_cycles_total: IntCounter,
    pub scan_failures_total: IntCounter,
    pub skipped_ticks_total: IntCounter,
    pub publishes_total: IntCounter,
    pub observers: IntGauge,
    pub privileged: IntGauge,
    pub terminations_total: IntCounterVec, // labels: outcome
    pub scrape_duration_seconds: Gauge,
}

impl PortMetrics {
    /// Creates and registers all Prometheus metrics with the registry.
    pub fn new(registry: &Registry) -> Result<Self, Box<dyn std::error::Error>> {
        let bindings = IntGaugeVec::new(
            Opts::new(
                "herakles_port_bindings",
                "Port bindings in the current snapshot by group",
            ),
            &["group"],
        )?;
        let bindings_by_app_type = IntGaugeVec::new(
            Opts::new(
                "herakles_port_bindings_by_app_type",
                "Port bindings in the current snapshot by classified app type",
            ),
            &["app_type"],
        )?;
        let scan_duration_seconds = Gauge::new(
            "herakles_port_scan_duration_seconds",
            "Duration of the last successful scan cycle",
        )?;
        let scan_cycles_total = IntCounter::new(
            "herakles_port_scan_cycles_total",
            "Scan cycles run, failed ones included",
        )?;
        let scan_failures_total = IntCounter::new(
            "herakles_port_scan_failures_total",
            "Scan cycles that failed or overran their timeout",
        )?;
        let skipped_ticks_total = IntCounter::new(
            "herakles_port_skipped_ticks_total",
            "Ticks skipped because the previous cycle was still running",
        )?;
        let publishes_total = IntCounter::new(
            "herakles_port_publishes_total",
            "Snapshots handed to observers after a detected change",
        )?;
        let observers = IntGauge::new(
            "herakles_port_observers",
            "Currently subscribed push observers",
        )?;
        let privileged = IntGauge::new(
            "herakles_port_privileged",
            "Whether the scanner runs with elevated rights (1) or not (0)",
        )?;
        let terminations_total = IntCounterVec::new(
            Opts::new(
                "herakles_port_terminations_total",
                "Termination requests by outcome",
            ),
            &["outcome"],
        )?;
        let scrape_duration_seconds = Gauge::new(
            "herakles_port_scrape_duration_seconds",
            "Time spent serving the /metrics request",
        )?;

        registry.register(Box::new(bindings.clone()))?;
        registry.register(Box::new(bindings_by_app_type.clone()))?;
        registry.register(Box::new(scan_duration_seconds.clone()))?;
        registry.register(Box::new(scan_cycles_total.clone()))?;
        registry.register(Box::new(scan_failures_total.clone()))?;
        registry.register(Box::new(skipped_ticks_total.clone()))?;
        registry.register(Box::new(publishes_total.clone()))?;
        registry.register(Box::new(observers.clone()))?;
        registry.register(Box::new(privileged.clone()))?;
        registry.register(Box::new(terminations_total.clone()))?;
        registry.register(Box::new(scrape_duration_seconds.clone()))?;

        Ok(Self {
            bindings,
            bindings_by_app_type,
            scan_duration_seconds,
            scan_cycles_total,
            scan_failures_total,
            skipped_ticks_total,
            publishes_total,
            observers,
            privileged,
            terminations_total,
            scrape_duration_seconds,
        })
    }

    /// Copies the current pipeline state into the collectors.
    pub fn refresh(&self, stats: &HealthStats, hub: &PublicationHub) {
        sync_counter(&self.scan_cycles_total, &stats.scan_cycles);
        sync_counter(&self.scan_failures_total, &stats.scan_failures);
        sync_counter(&self.skipped_ticks_total, &stats.skipped_ticks);
        sync_counter(&self.publishes_total, &stats.publishes);

        for (outcome, counter) in [
            (TerminationOutcome::Terminated, &stats.terminations_ok),
            (TerminationOutcome::AlreadyGone, &stats.terminations_already_gone),
            (TerminationOutcome::Partial, &stats.terminations_partial),
            (TerminationOutcome::Failed, &stats.terminations_failed),
        ] {
            sync_counter(
                &self.terminations_total.with_label_values(&[outcome.as_str()]),
                counter,
            );
        }

        self.scan_duration_seconds
            .set(stats.scan_duration_seconds.summary().last);
        self.observers.set(hub.observer_count() as i64);

        let Some(snapshot) = hub.current_snapshot() else {
            return;
        };

        let counts = snapshot.counts();
        self.bindings
            .with_label_values(&["user"])
            .set(counts.user as i64);
        self.bindings
            .with_label_values(&["system"])
            .set(counts.system as i64);
        self.privileged
            .set(i64::from(snapshot.is_privileged_observer()));

        let mut per_type: HashMap<&'static str, i64> = HashMap::new();
        for binding in snapshot.iter() {
            *per_type.entry(binding.app_type.as_str()).or_insert(0) += 1;
        }
        for app_type in ALL_APP_TYPES {
            let tag = app_type.as_str();
            self.bindings_by_app_type
                .with_label_values(&[tag])
                .set(per_type.get(tag).copied().unwrap_or(0));
        }
    }
}

/// Advances a monotonic Prometheus counter to the value of an atomic.
fn sync_counter(counter: &IntCounter, source: &AtomicU64) {
    let target = source.load(Ordering::Relaxed);
    let current = counter.get();
    if target > current {
        counter.inc_by(target - current);
    }
}
