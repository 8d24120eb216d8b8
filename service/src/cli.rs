//! # CLI Interface
//!
//! Defines the command-line argument structure for `vega-service` using
//! `clap` derive. Supports four subcommands: `run`, `init`, `status`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use vega_ledger::config;

/// VEGA custodial payment service.
///
/// Hosts the balance ledger for the VEGA payment network: provisions
/// wallet accounts, executes peer-to-peer transfers, sweeps recurring
/// payment instructions on a timer, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "vega-service",
    about = "VEGA custodial payment service",
    version,
    propagate_version = true
)]
pub struct VegaServiceCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the VEGA service binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the payment service.
    Run(RunArgs),
    /// Initialize a new data directory and provision a few starter
    /// accounts to play with.
    Init(InitArgs),
    /// Query the status of a running service via its HTTP endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the service data directory where the ledger database lives.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "VEGA_DATA_DIR", default_value = "~/.vega")]
    pub data_dir: PathBuf,

    /// Port for the REST API.
    #[arg(long, env = "VEGA_HTTP_PORT", default_value_t = config::DEFAULT_HTTP_PORT)]
    pub http_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "VEGA_METRICS_PORT", default_value_t = config::DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Seconds between recurring-payment sweeps.
    #[arg(
        long,
        env = "VEGA_SWEEP_INTERVAL",
        default_value_t = config::DEFAULT_SWEEP_INTERVAL_SECS
    )]
    pub sweep_interval_secs: u64,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "VEGA_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "VEGA_DATA_DIR", default_value = "~/.vega")]
    pub data_dir: PathBuf,

    /// Number of starter accounts to provision, each funded with the
    /// standard opening balance.
    #[arg(long, default_value_t = 2)]
    pub accounts: usize,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// HTTP endpoint of the running service.
    #[arg(long, default_value = "http://127.0.0.1:8686")]
    pub url: String,
}
