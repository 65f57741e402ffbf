//! Integration tests for the scan pipeline and the scan loop.
//!
//! The OS is replaced by in-memory socket and process tables so every
//! cycle is deterministic.

mod common;

use common::{tcp_listen, FakeProcesses, FakeSockets};
use herakles_port_manager::{
    AppType, HealthStats, JoinOptions, ProcessMeta, PublicationHub, ScanLoop, ScanLoopConfig,
    Scanner, TickOutcome, UNKNOWN_PROCESS,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn dev_processes() -> FakeProcesses {
    FakeProcesses::new(vec![
        ProcessMeta::new(111, "node")
            .with_cmdline("node server.js")
            .with_user(1000, "dev"),
        ProcessMeta::new(222, "postgres")
            .with_cmdline("/usr/lib/postgresql/16/bin/postgres -D /var/lib/postgresql")
            .with_user(112, "postgres"),
    ])
}

fn scanner(sockets: Arc<FakeSockets>, processes: Arc<FakeProcesses>) -> Scanner {
    Scanner::new(sockets, processes, JoinOptions::default()).with_privilege_check(|| false)
}

#[test]
fn test_node_and_postgres_scenario() {
    let sockets = Arc::new(FakeSockets::new(vec![tcp_listen(3000, 111), tcp_listen(5432, 222)]));
    let scanner = scanner(sockets, Arc::new(dev_processes()));

    let first = scanner.run_cycle(None).expect("cycle succeeds");
    assert!(first.publish, "first cycle always publishes");

    let snapshot = &first.snapshot;
    assert_eq!(snapshot.counts().user, 1);
    assert_eq!(snapshot.counts().system, 1);
    assert_eq!(snapshot.user_bindings().len(), snapshot.counts().user);
    assert_eq!(snapshot.system_bindings().len(), snapshot.counts().system);

    let node = &snapshot.user_bindings()[0];
    assert_eq!(node.pid, 111);
    assert_eq!(node.port, 3000);
    assert_eq!(node.app_type, AppType::Node);
    assert!(!node.has_parent_controller);

    let postgres = &snapshot.system_bindings()[0];
    assert_eq!(postgres.pid, 222);
    assert_eq!(postgres.app_type, AppType::Postgres);

    let second = scanner
        .run_cycle(Some(snapshot.fingerprint()))
        .expect("cycle succeeds");
    assert_eq!(second.snapshot.fingerprint(), snapshot.fingerprint());
    assert!(!second.publish, "unchanged scan must not publish");
}

#[test]
fn test_enumeration_order_does_not_change_fingerprint() {
    let processes = Arc::new(dev_processes());
    let a = scanner(
        Arc::new(FakeSockets::new(vec![tcp_listen(3000, 111), tcp_listen(5432, 222)])),
        processes.clone(),
    );
    let b = scanner(
        Arc::new(FakeSockets::new(vec![tcp_listen(5432, 222), tcp_listen(3000, 111)])),
        processes,
    );

    let fa = a.run_cycle(None).expect("cycle a").snapshot.fingerprint();
    let fb = b.run_cycle(None).expect("cycle b").snapshot.fingerprint();
    assert_eq!(fa, fb);
}

#[test]
fn test_new_binding_triggers_publish() {
    let sockets = Arc::new(FakeSockets::new(vec![tcp_listen(3000, 111)]));
    let scanner = scanner(sockets.clone(), Arc::new(dev_processes()));

    let first = scanner.run_cycle(None).expect("first cycle");
    sockets.set(vec![tcp_listen(3000, 111), tcp_listen(5432, 222)]);
    let second = scanner
        .run_cycle(Some(first.snapshot.fingerprint()))
        .expect("second cycle");

    assert!(second.publish);
    assert_ne!(second.snapshot.fingerprint(), first.snapshot.fingerprint());
}

#[test]
fn test_unresolved_pid_is_kept_with_placeholder() {
    let sockets = Arc::new(FakeSockets::new(vec![tcp_listen(8081, 0), tcp_listen(8082, 999)]));
    let scanner = scanner(sockets, Arc::new(FakeProcesses::default()));

    let output = scanner.run_cycle(None).expect("cycle succeeds");
    assert_eq!(output.snapshot.total(), 2);

    for binding in output.snapshot.iter() {
        assert_eq!(binding.process_name, UNKNOWN_PROCESS);
        assert_eq!(binding.app_type, AppType::Other);
    }
    assert!(output.snapshot.iter().any(|b| b.pid == 0));
}

#[test]
fn test_parent_controller_is_attached() {
    let processes = Arc::new(FakeProcesses::new(vec![
        ProcessMeta::new(111, "php")
            .with_parent(50)
            .with_cmdline("php -S 127.0.0.1:8000 server.php")
            .with_user(1000, "dev"),
        ProcessMeta::new(50, "artisan")
            .with_cmdline("php artisan serve")
            .with_user(1000, "dev"),
    ]));
    let scanner = scanner(Arc::new(FakeSockets::new(vec![tcp_listen(8000, 111)])), processes);

    let output = scanner.run_cycle(None).expect("cycle succeeds");
    let binding = &output.snapshot.user_bindings()[0];

    assert!(binding.has_parent_controller);
    let parent = binding.parent.as_ref().expect("parent link");
    assert_eq!(parent.parent_pid, 50);
    assert_eq!(parent.parent_name, "artisan");
}

#[test]
fn test_enumeration_failure_is_an_error() {
    let sockets = Arc::new(FakeSockets::new(vec![tcp_listen(3000, 111)]));
    sockets.set_failing(true);
    let scanner = scanner(sockets, Arc::new(dev_processes()));

    assert!(scanner.run_cycle(None).is_err());
}

// -------------------------------------------------------------------------
// Scan loop
// -------------------------------------------------------------------------

fn scan_loop(
    sockets: Arc<FakeSockets>,
    config: ScanLoopConfig,
) -> (ScanLoop, Arc<PublicationHub>, Arc<HealthStats>) {
    let hub = Arc::new(PublicationHub::new(8));
    let stats = Arc::new(HealthStats::new());
    let scan_loop = ScanLoop::new(
        scanner(sockets, Arc::new(dev_processes())),
        hub.clone(),
        stats.clone(),
        config,
    );
    (scan_loop, hub, stats)
}

#[tokio::test]
async fn test_loop_publishes_only_on_change() {
    let sockets = Arc::new(FakeSockets::new(vec![tcp_listen(3000, 111)]));
    let (mut scan_loop, hub, stats) = scan_loop(sockets.clone(), ScanLoopConfig::default());
    let mut subscription = hub.subscribe();

    assert_eq!(scan_loop.tick().await, TickOutcome::Published);
    assert_eq!(scan_loop.tick().await, TickOutcome::Unchanged);

    sockets.set(vec![tcp_listen(3000, 111), tcp_listen(5432, 222)]);
    assert_eq!(scan_loop.tick().await, TickOutcome::Published);

    let first = subscription.try_recv().expect("first publish");
    let second = subscription.try_recv().expect("second publish");
    assert!(subscription.try_recv().is_none(), "unchanged cycle was pushed");
    assert_eq!(first.total(), 1);
    assert_eq!(second.total(), 2);

    assert_eq!(stats.scan_cycles.load(Ordering::Relaxed), 3);
    assert_eq!(stats.publishes.load(Ordering::Relaxed), 2);
    assert_eq!(stats.suppressed_publishes.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_failed_cycle_keeps_previous_snapshot() {
    let sockets = Arc::new(FakeSockets::new(vec![tcp_listen(3000, 111)]));
    let (mut scan_loop, hub, stats) = scan_loop(sockets.clone(), ScanLoopConfig::default());

    assert_eq!(scan_loop.tick().await, TickOutcome::Published);
    let before = hub.current_snapshot().expect("snapshot").fingerprint();

    sockets.set_failing(true);
    assert_eq!(scan_loop.tick().await, TickOutcome::Failed);
    assert_eq!(hub.current_snapshot().expect("snapshot").fingerprint(), before);
    assert_eq!(stats.scan_failures.load(Ordering::Relaxed), 1);

    sockets.set_failing(false);
    assert_eq!(scan_loop.tick().await, TickOutcome::Unchanged);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_cycle_times_out_and_next_tick_skips() {
    let sockets = Arc::new(FakeSockets::new(vec![tcp_listen(3000, 111)]));
    sockets.set_delay(Duration::from_millis(300));
    let config = ScanLoopConfig {
        interval: Duration::from_millis(100),
        cycle_timeout: Duration::from_millis(50),
    };
    let (mut scan_loop, hub, stats) = scan_loop(sockets.clone(), config);

    assert_eq!(scan_loop.tick().await, TickOutcome::TimedOut);
    assert!(scan_loop.phase().is_scanning());
    assert_eq!(scan_loop.tick().await, TickOutcome::Skipped);
    assert!(hub.current_snapshot().is_none(), "late result must be discarded");

    sockets.set_delay(Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!scan_loop.phase().is_scanning());
    assert_eq!(scan_loop.tick().await, TickOutcome::Published);

    assert_eq!(stats.skipped_ticks.load(Ordering::Relaxed), 1);
    assert_eq!(stats.discarded_late_cycles.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let sockets = Arc::new(FakeSockets::new(vec![tcp_listen(3000, 111)]));
    let config = ScanLoopConfig {
        interval: Duration::from_millis(20),
        cycle_timeout: Duration::from_millis(500),
    };
    let (scan_loop, hub, _stats) = scan_loop(sockets, config);
    let (tx, rx) = tokio::sync::watch::channel(false);

    let handle = scan_loop.spawn(rx);
    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(true).expect("loop still listening");

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("loop stops in time")
        .expect("loop task does not panic");
    assert!(hub.current_snapshot().is_some());
}
