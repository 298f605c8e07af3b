//! bbs-discovery
//!
//! Keeps an in-memory copy of the Cloud Foundry BBS state and serves the
//! auto-discovery config templates found in the apps' environment.

use axum::{routing::get, Router};
use bbs_discovery::CacheRegistry;
use clap::Parser;
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};

mod cli;
mod commands;
mod config;
mod handlers;
mod metrics;
mod state;

use cli::{Args, Commands, LogLevel};
use commands::{command_collect, command_config, command_generate_fixture, show_config};
use config::{
    configure_cache, resolve_config, validate_effective_config, Config, DEFAULT_BIND_ADDR,
    DEFAULT_PORT,
};
use handlers::{doc_handler, health_handler, metrics_handler, templates_handler};
use metrics::CacheMetrics;
use state::AppState;

/// Initializes tracing logging subsystem with configured log level
fn setup_logging(config: &Config, args: &Args) {
    // the CLI default is info, so a config file level only applies when the flag was left alone
    let level_name = match (&args.log_level, config.log_level.as_deref()) {
        (LogLevel::Info, Some(from_config)) => from_config.to_ascii_lowercase(),
        (level, _) => format!("{level:?}").to_ascii_lowercase(),
    };
    let log_level = match level_name.as_str() {
        "off" | "error" => Level::ERROR,
        "warn" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
        return;
    }

    info!("Logging initialized with level: {}", level_name);
}

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

/// -------------------------------------------------------------------
/// MAIN APPLICATION ENTRY POINT
/// -------------------------------------------------------------------
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format.clone());
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        return match command {
            Commands::Config {
                output,
                format,
                commented,
            } => command_config(output.clone(), format.clone(), *commented),
            Commands::GenerateFixture {
                output,
                apps,
                instances_per_app,
                seed,
            } => command_generate_fixture(output.clone(), *apps, *instances_per_app, *seed),
            Commands::Collect { format, errors } => {
                let config = resolve_config(&args)?;
                if let Err(e) = validate_effective_config(&config) {
                    eprintln!("❌ Configuration invalid: {}", e);
                    std::process::exit(1);
                }
                setup_logging(&config, &args);
                command_collect(&config, format.clone(), *errors).await
            }
        };
    }

    // Load configuration for main server mode
    let config = resolve_config(&args)?;

    // Validate config before starting
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    setup_logging(&config, &args);

    info!("Starting bbs-discovery");

    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let port = config.port.unwrap_or(DEFAULT_PORT);

    // Configure the thread pool projecting LRP records
    if let Some(threads) = config.parallelism {
        if threads > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
                .unwrap_or_else(|e| error!("Failed to set rayon thread pool: {}", e));
            debug!("Rayon thread pool configured with {} threads", threads);
        }
    }

    // Configure the process-wide BBS cache and start refreshing
    let caches = CacheRegistry::new();
    let cache = configure_cache(&caches, &config)?;
    let cancel = CancellationToken::new();
    let refresh_task = cache.start(cancel.child_token());
    if refresh_task.is_none() {
        warn!("BBS refresh task was already running");
    }

    // Initialize Prometheus metrics registry
    let registry = Registry::new();
    let metrics = CacheMetrics::new(&registry)?;
    debug!("All metrics registered successfully");

    let state = Arc::new(AppState::new(registry, metrics, cache, config.clone()));

    // Configure HTTP server routes and start listening
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    let mut app = Router::new().route("/doc", get(doc_handler));

    if config.enable_telemetry.unwrap_or(true) {
        app = app.route("/metrics", get(metrics_handler));
    }
    if config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    }
    if config.enable_templates.unwrap_or(true) {
        app = app.route("/templates", get(templates_handler));
    }

    let app = app.with_state(state);

    let listener = TcpListener::bind(addr).await?;
    info!("bbs-discovery listening on http://{}:{}", bind_ip_str, port);

    let server = axum::serve(listener, app);

    let result = tokio::select! {
        result = server => result,
        _ = shutdown_signal() => {
            info!("Shutdown signal received, exiting...");
            Ok(())
        }
    };

    // Stop the refresh loop before exit
    cancel.cancel();
    if let Some(task) = refresh_task {
        if let Err(e) = task.await {
            error!("BBS refresh task ended abnormally: {}", e);
        }
    }

    if let Err(e) = result {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("bbs-discovery stopped gracefully");
    Ok(())
}
