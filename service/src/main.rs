// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # VEGA Payment Service
//!
//! Entry point for the `vega-service` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the ledger database, and serves
//! the HTTP API with a background sweep for recurring payments.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — start the payment service
//! - `init`    — initialize a data directory and provision starter accounts
//! - `status`  — query a running service's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use vega_ledger::account::AccountStore;
use vega_ledger::config;
use vega_ledger::journal::Journal;
use vega_ledger::recurring::RecurringScheduler;
use vega_ledger::savings::GoalStore;
use vega_ledger::storage::db::VegaDB;
use vega_ledger::transfer::LedgerEngine;

use cli::{Commands, VegaServiceCli};
use logging::LogFormat;
use metrics::ServiceMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = VegaServiceCli::parse();

    match cli.command {
        Commands::Run(args) => run_service(args).await,
        Commands::Init(args) => init_service(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the full payment service: API server, metrics endpoint, and
/// the recurring-payment sweep loop.
async fn run_service(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "vega_service=info,vega_ledger=info,tower_http=debug",
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        http_port = args.http_port,
        metrics_port = args.metrics_port,
        sweep_interval_secs = args.sweep_interval_secs,
        data_dir = %args.data_dir.display(),
        "starting vega-service"
    );

    // --- Persistent storage ---
    let db_path = args.data_dir.join("ledger");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;

    let db = VegaDB::open(&db_path)
        .with_context(|| format!("failed to open ledger database at {}", db_path.display()))?;
    tracing::info!(
        path = %db_path.display(),
        accounts = db.account_count(),
        "ledger database opened"
    );

    // --- Domain stores ---
    let accounts = Arc::new(AccountStore::new(&db));
    let journal = Arc::new(Journal::new(&db));
    let engine = LedgerEngine::new(Arc::clone(&accounts), Arc::clone(&journal));
    let scheduler = Arc::new(RecurringScheduler::new(
        &db,
        Arc::clone(&accounts),
        engine.clone(),
    ));
    let goals = GoalStore::new(&db, Arc::clone(&accounts));

    // --- Metrics ---
    let service_metrics = Arc::new(ServiceMetrics::new());
    service_metrics
        .recurring_instructions_active
        .set(scheduler.instruction_count() as i64);
    if let Ok(total) = accounts.total_balance() {
        service_metrics
            .total_balance_minor_units
            .set(total.min(i64::MAX as u128) as i64);
    }

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (ledger {})",
            env!("CARGO_PKG_VERSION"),
            config::LEDGER_VERSION,
        ),
        started_at: chrono::Utc::now(),
        accounts: Arc::clone(&accounts),
        journal: Arc::clone(&journal),
        engine,
        scheduler: Arc::clone(&scheduler),
        goals,
        metrics: Arc::clone(&service_metrics),
        db: db.clone(),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.http_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&service_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Recurring payment sweep ---
    // tokio's interval fires its first tick immediately, which doubles as
    // the catch-up sweep for payments that came due while the service was
    // down.
    let sweep_scheduler = Arc::clone(&scheduler);
    let sweep_metrics = Arc::clone(&service_metrics);
    let sweep_accounts = Arc::clone(&accounts);
    let sweep_interval = std::time::Duration::from_secs(args.sweep_interval_secs.max(1));
    let sweep_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            match sweep_scheduler.run_due(chrono::Utc::now()) {
                Ok(report) => {
                    sweep_metrics.sweeps_total.inc();
                    sweep_metrics
                        .recurring_executed_total
                        .inc_by(report.executed as u64);
                    sweep_metrics
                        .recurring_failed_total
                        .inc_by(report.failed as u64);
                    sweep_metrics
                        .recurring_instructions_active
                        .set(sweep_scheduler.instruction_count() as i64);
                    if let Ok(total) = sweep_accounts.total_balance() {
                        sweep_metrics
                            .total_balance_minor_units
                            .set(total.min(i64::MAX as u128) as i64);
                    }
                    if report.executed > 0 || report.failed > 0 {
                        tracing::info!(
                            examined = report.examined,
                            executed = report.executed,
                            failed = report.failed,
                            "sweep finished"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!("sweep failed: {}", e);
                }
            }
        }
    });

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    sweep_loop.abort();
    db.flush()
        .context("failed to flush ledger database on shutdown")?;
    tracing::info!("vega-service stopped");
    Ok(())
}

/// Initializes a data directory and provisions a few starter accounts.
fn init_service(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("vega_service=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(
        data_dir = %data_dir.display(),
        accounts = args.accounts,
        "initializing service"
    );

    let db_path = data_dir.join("ledger");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create data directory: {}", db_path.display()))?;

    let db = VegaDB::open(&db_path)
        .with_context(|| format!("failed to open ledger database at {}", db_path.display()))?;
    let accounts = AccountStore::new(&db);

    let mut provisioned = Vec::with_capacity(args.accounts);
    for _ in 0..args.accounts {
        let account = accounts
            .create(None)
            .context("failed to provision starter account")?;
        provisioned.push(account);
    }
    db.flush().context("failed to flush ledger database")?;

    println!("Service initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Ledger         : {}", db_path.display());
    println!("  Accounts       : {}", accounts.count());
    for account in &provisioned {
        println!(
            "    {}  {}  (balance {} minor units)",
            account.account_id, account.address, account.balance
        );
    }

    Ok(())
}

/// Queries a running service's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let (host, port) = parse_endpoint(&args.url)?;
    let addr = format!("{}:{}", host, port);
    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    // Raw HTTP/1.1 over a tokio TCP stream; not worth an HTTP client
    // dependency for a single GET.
    let request = format!(
        "GET /status HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        host,
    );

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    // Everything after the first blank line is the body.
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_else(|| response.to_string());

    println!("{}", body.trim());
    Ok(())
}

/// Pulls host and port out of an `http://host:port` endpoint string.
/// Just enough parsing for the status subcommand, not a URL library.
fn parse_endpoint(url: &str) -> Result<(String, u16)> {
    let rest = url
        .strip_prefix("http://")
        .unwrap_or(url)
        .trim_end_matches('/');

    match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|e| anyhow::anyhow!("bad port in {:?}: {}", url, e))?;
            Ok((host.to_string(), port))
        }
        None => Ok((rest.to_string(), 80)),
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("vega-service {}", env!("CARGO_PKG_VERSION"));
    println!("ledger       {}", config::LEDGER_VERSION);
    println!("rustc        {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
