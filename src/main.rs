//! herakles-port-manager - version 0.1.0
//!
//! Live port-to-process monitor with tracing logging.
//! This is the main entry point that initializes the server and handles subcommands.

mod cli;
mod commands;
mod config;
mod handlers;
mod metrics;
mod startup_checks;
mod state;

use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use herakles_port_manager::{
    HealthStats, NetstatSocketSource, PublicationHub, ScanLoop, Scanner, SignalProcessControl,
    SysinfoProcessSource, TerminationOrchestrator,
};
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::{net::TcpListener, signal, sync::watch};
use tracing::{debug, error, info, warn, Level};

use cli::{Args, Commands, LogLevel};
use commands::{command_app_types, command_check, command_config, command_kill, command_test};
use config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_BIND_ADDR, DEFAULT_PORT,
};
use handlers::{
    app_types_handler, config_handler, health_handler, kill_handler, kill_tree_handler,
    metrics_handler, ports_handler, root_handler, ws_handler,
};
use metrics::PortMetrics;
use state::AppState;

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => Level::ERROR,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    info!("Logging initialized with level: {:?}", args.log_level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.show_user_config || args.check_config {
        let config = resolve_config(&args)?;
        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }
        if args.show_config {
            return show_config(&config, args.config_format.clone(), false);
        }
        if args.show_user_config {
            return show_config(&config, args.config_format.clone(), true);
        }
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        if let Commands::Config {
            output,
            format,
            commented,
        } = command
        {
            return command_config(output.clone(), format.clone(), *commented);
        }
        if let Commands::AppTypes { verbose } = command {
            return command_app_types(*verbose);
        }

        let config = load_validated_config(&args)?;
        return match command {
            Commands::Check {
                sockets,
                processes,
                all,
            } => command_check(*sockets, *processes, *all, &config),
            Commands::Test {
                iterations,
                verbose,
                format,
            } => command_test(*iterations, *verbose, format.clone(), &config),
            Commands::Kill { pid, tree } => {
                setup_logging(&args);
                command_kill(*pid, *tree, &config).await
            }
            Commands::Config { .. } | Commands::AppTypes { .. } => Ok(()),
        };
    }

    // Load configuration for main server mode
    let config = load_validated_config(&args)?;

    setup_logging(&args);
    info!("Starting herakles-port-manager");

    match startup_checks::validate_requirements() {
        Ok(report) => debug!("Requirement report: {:?}", report),
        Err(e) => {
            error!("❌ Startup validation failed: {:#}", e);
            error!("   The service will start but scan cycles will keep failing!");
        }
    }

    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let port = config.port.unwrap_or(DEFAULT_PORT);

    // Configure parallel processing
    if let Some(threads) = config.parallelism {
        if threads > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
                .unwrap_or_else(|e| error!("Failed to set rayon thread pool: {}", e));
            debug!("Rayon thread pool configured with {} threads", threads);
        }
    }

    // Initialize Prometheus metrics registry
    let registry = Registry::new();
    let metrics = PortMetrics::new(&registry)?;
    debug!("All metrics registered successfully");

    let health_stats = Arc::new(HealthStats::new());
    let hub = Arc::new(PublicationHub::new(config.queue_capacity()));
    let processes = Arc::new(SysinfoProcessSource::new());

    let scanner = Scanner::new(
        Arc::new(NetstatSocketSource),
        processes.clone(),
        config.join_options(),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scan_loop = ScanLoop::new(
        scanner,
        hub.clone(),
        health_stats.clone(),
        config.scan_loop_config(),
    )
    .spawn(shutdown_rx);

    let orchestrator = TerminationOrchestrator::new(
        processes,
        Arc::new(SignalProcessControl),
        config.termination_config(),
    );

    let state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        hub: hub.clone(),
        orchestrator,
        health_stats,
        registry,
        metrics,
        start_time: Instant::now(),
    });

    // Configure HTTP server routes
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;
    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/api/kill/{pid}", post(kill_handler))
        .route("/api/kill-tree/{pid}", post(kill_tree_handler))
        .route("/config", get(config_handler))
        .route("/app-types", get(app_types_handler));

    if config.enable_pull.unwrap_or(true) {
        app = app.route("/api/ports", get(ports_handler));
    }
    if config.enable_push.unwrap_or(true) {
        app = app.route("/ws", get(ws_handler));
    } else {
        debug!("Push channel disabled, /ws not served");
    }
    if config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    }
    if config.enable_telemetry.unwrap_or(true) {
        app = app.route("/metrics", get(metrics_handler));
    }

    let app = app.with_state(state);

    if !addr.ip().is_loopback() {
        warn!(
            "⚠️  Listening on {} - the kill endpoints are reachable without authentication",
            addr.ip()
        );
    }

    let listener = TcpListener::bind(addr).await?;
    info!(
        "herakles-port-manager listening on http://{}:{}",
        bind_ip_str, port
    );

    // Stop the scan loop and close observer queues first so open
    // WebSocket connections end and the server can drain.
    let shutdown_hub = hub.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
        shutdown_hub.close_all();
    });

    if let Err(e) = server.await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    if let Err(e) = scan_loop.await {
        warn!("Scan loop task ended abnormally: {}", e);
    }

    info!("herakles-port-manager stopped gracefully");
    Ok(())
}
