//! Periodic scan → classify → diff → publish loop.
//!
//! The loop owns the "current snapshot + previous fingerprint" pair and
//! threads it through each cycle explicitly. A cycle runs on the blocking
//! pool under a soft timeout; if it overruns, the loop stops waiting, the
//! cycle finishes in the background and its result is dropped. Ticks that
//! fire while such a late cycle is still running are skipped, so cycles
//! never overlap.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::change_detector::should_publish;
use crate::error::ScanError;
use crate::health_stats::HealthStats;
use crate::hub::PublicationHub;
use crate::process::{classify_bindings, join_bindings, JoinOptions, ProcessSource, SocketSource};
use crate::snapshot::{is_privileged_observer, Fingerprint, Snapshot};

/// Product of one successful cycle.
#[derive(Debug, Clone)]
pub struct CycleOutput {
    pub snapshot: Arc<Snapshot>,
    /// Verdict of the change detector against the fingerprint passed in.
    pub publish: bool,
}

/// Runs the pipeline stages against injected OS sources.
pub struct Scanner {
    sockets: Arc<dyn SocketSource>,
    processes: Arc<dyn ProcessSource>,
    options: JoinOptions,
    privilege_check: fn() -> bool,
}

impl Scanner {
    pub fn new(
        sockets: Arc<dyn SocketSource>,
        processes: Arc<dyn ProcessSource>,
        options: JoinOptions,
    ) -> Self {
        Self {
            sockets,
            processes,
            options,
            privilege_check: is_privileged_observer,
        }
    }

    pub fn with_privilege_check(mut self, check: fn() -> bool) -> Self {
        self.privilege_check = check;
        self
    }

    /// One synchronous cycle. Blocks on OS calls.
    #[instrument(skip(self))]
    pub fn run_cycle(&self, previous: Option<Fingerprint>) -> Result<CycleOutput, ScanError> {
        let raw = self.sockets.enumerate()?;
        let table = self.processes.snapshot();

        let mut bindings = join_bindings(&raw, &table, &self.options);
        classify_bindings(&mut bindings, &table);

        let snapshot = Snapshot::build(bindings, (self.privilege_check)(), Utc::now());
        let publish = should_publish(previous, &snapshot);
        debug!(
            "Cycle built snapshot {} (user: {}, system: {}, publish: {})",
            snapshot.fingerprint(),
            snapshot.counts().user,
            snapshot.counts().system,
            publish
        );

        Ok(CycleOutput {
            snapshot: Arc::new(snapshot),
            publish,
        })
    }
}

/// State carried from one cycle to the next.
#[derive(Debug, Clone, Default)]
pub struct ScanState {
    current: Option<Arc<Snapshot>>,
    previous_fingerprint: Option<Fingerprint>,
}

impl ScanState {
    pub fn current(&self) -> Option<&Arc<Snapshot>> {
        self.current.as_ref()
    }

    pub fn previous_fingerprint(&self) -> Option<Fingerprint> {
        self.previous_fingerprint
    }

    /// Adopts a cycle's output; only a published snapshot moves the
    /// previous fingerprint.
    pub fn apply(&mut self, output: &CycleOutput) {
        self.current = Some(Arc::clone(&output.snapshot));
        if output.publish {
            self.previous_fingerprint = Some(output.snapshot.fingerprint());
        }
    }
}

/// IDLE/SCANNING flag shared with the blocking cycle.
#[derive(Debug, Clone, Default)]
pub struct ScanPhase(Arc<AtomicBool>);

impl ScanPhase {
    pub fn is_scanning(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Marks SCANNING until the returned guard drops, or `None` if a cycle
    /// is already running.
    fn enter(&self) -> Option<PhaseGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PhaseGuard(Arc::clone(&self.0)))
    }
}

struct PhaseGuard(Arc<AtomicBool>);

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScanLoopConfig {
    pub interval: Duration,
    pub cycle_timeout: Duration,
}

impl Default for ScanLoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            cycle_timeout: Duration::from_millis(1500),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Published,
    Unchanged,
    /// Previous cycle still running.
    Skipped,
    Failed,
    /// Cycle overran the soft timeout; its result will be discarded.
    TimedOut,
}

pub struct ScanLoop {
    scanner: Arc<Scanner>,
    hub: Arc<PublicationHub>,
    stats: Arc<HealthStats>,
    config: ScanLoopConfig,
    phase: ScanPhase,
    state: ScanState,
}

impl ScanLoop {
    pub fn new(
        scanner: Scanner,
        hub: Arc<PublicationHub>,
        stats: Arc<HealthStats>,
        config: ScanLoopConfig,
    ) -> Self {
        Self {
            scanner: Arc::new(scanner),
            hub,
            stats,
            config,
            phase: ScanPhase::default(),
            state: ScanState::default(),
        }
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn phase(&self) -> &ScanPhase {
        &self.phase
    }

    /// Runs one cycle unless the previous one is still in flight.
    pub async fn tick(&mut self) -> TickOutcome {
        let Some(guard) = self.phase.enter() else {
            debug!("Previous scan cycle still running, skipping tick");
            self.stats.record_skipped_tick();
            return TickOutcome::Skipped;
        };

        let scanner = Arc::clone(&self.scanner);
        let previous = self.state.previous_fingerprint();
        let start = Instant::now();
        let task = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            scanner.run_cycle(previous)
        });

        let result = match tokio::time::timeout(self.config.cycle_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ScanError::CycleAborted(join_err.to_string())),
            Err(_) => {
                warn!(
                    "Scan cycle exceeded {:?}, keeping previous snapshot",
                    self.config.cycle_timeout
                );
                self.stats.record_scan_failure();
                self.stats.record_discarded_cycle();
                return TickOutcome::TimedOut;
            }
        };

        match result {
            Ok(output) => self.commit(output, start.elapsed()),
            Err(e) => {
                error!("Scan cycle failed: {}", e);
                self.stats.record_scan_failure();
                TickOutcome::Failed
            }
        }
    }

    fn commit(&mut self, output: CycleOutput, elapsed: Duration) -> TickOutcome {
        let counts = output.snapshot.counts();
        self.stats
            .record_scan(counts.user, counts.system, elapsed.as_secs_f64());
        self.stats.record_publish(output.publish);
        self.state.apply(&output);

        if !output.publish {
            return TickOutcome::Unchanged;
        }

        let report = self.hub.publish(output.snapshot);
        if report.dropped > 0 {
            self.stats.record_observer_drops(report.dropped);
        }
        TickOutcome::Published
    }

    /// Ticks every interval until `shutdown` flips to true or its sender
    /// goes away.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "Scan loop started (interval: {:?}, cycle timeout: {:?})",
            self.config.interval, self.config.cycle_timeout
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Scan loop stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
