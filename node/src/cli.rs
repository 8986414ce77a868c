//! # CLI Interface
//!
//! Defines the command-line argument structure for `ghost-node` using
//! `clap` derive. Supports five subcommands: `run`, `init`, `hash`, `sign`
//! and `version`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use ghost_protocol::config;

use crate::logging::LogFormat;

/// Ghost Agent node.
///
/// Hosts the intent ledger behind an HTTP/WebSocket API, runs the verifying
/// service that audits and settles declared intents, and exposes Prometheus
/// metrics.
#[derive(Parser, Debug)]
#[command(
    name = "ghost-node",
    about = "Ghost Agent intent ledger node",
    version,
    propagate_version = true
)]
pub struct GhostNodeCli {
    /// Log output format.
    #[arg(long, global = true, env = "GHOST_LOG_FORMAT", value_enum, default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Top-level subcommands for the Ghost node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node: API server, metrics endpoint and verifying service.
    Run(RunArgs),
    /// Generate a secp256k1 key file.
    Init(InitArgs),
    /// Print the canonical intent hash of a payload JSON file.
    Hash(HashArgs),
    /// Sign an intent hash with a key file.
    Sign(SignArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory for the sled database holding intents and the treasury.
    ///
    /// When omitted, all ledger state is kept in memory and lost on exit.
    #[arg(long, short = 'd', env = "GHOST_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Port for the REST and WebSocket API.
    #[arg(long, env = "GHOST_RPC_PORT", default_value_t = config::DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "GHOST_METRICS_PORT", default_value_t = config::DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Key file of the verifying service.
    ///
    /// When omitted the verifying service is not started.
    #[arg(long, env = "GHOST_ORACLE_KEY")]
    pub oracle_key: Option<PathBuf>,

    /// Held balance the treasury starts with.
    ///
    /// With a data directory this only applies the first time it is used.
    #[arg(long, env = "GHOST_INITIAL_BALANCE", default_value_t = 0)]
    pub initial_balance: u64,

    /// Origin countries the audit accepts (ISO alpha-2, comma separated).
    #[arg(
        long,
        env = "GHOST_ALLOWED_COUNTRIES",
        value_delimiter = ',',
        default_values_t = config::DEFAULT_ALLOWED_COUNTRIES.iter().map(|c| c.to_string())
    )]
    pub allowed_countries: Vec<String>,

    /// Largest amount, in wei, the audit accepts.
    #[arg(long, env = "GHOST_MAX_AMOUNT_WEI", default_value_t = config::DEFAULT_MAX_AMOUNT_WEI)]
    pub max_amount_wei: u64,

    /// Oldest payload timestamp the audit accepts, in seconds before now.
    #[arg(long, env = "GHOST_AUDIT_WINDOW_SECS", default_value_t = config::DEFAULT_AUDIT_TIME_WINDOW.as_secs())]
    pub audit_window_secs: u64,

    /// How often the verifying service re-reads the event log, in seconds.
    #[arg(long, env = "GHOST_ORACLE_POLL_SECS", default_value_t = config::ORACLE_POLL_INTERVAL.as_secs())]
    pub oracle_poll_secs: u64,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Where to write the hex-encoded secret key.
    #[arg(long, short = 'o', env = "GHOST_KEY_FILE", default_value = "ghost.key")]
    pub output: PathBuf,

    /// Overwrite an existing key file.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `hash` subcommand.
#[derive(Parser, Debug)]
pub struct HashArgs {
    /// Payload JSON file (`amountWei`, `originCountry`, `timestamp`, `metadata`).
    pub payload: PathBuf,
}

/// Arguments for the `sign` subcommand.
#[derive(Parser, Debug)]
pub struct SignArgs {
    /// Key file written by `init`.
    #[arg(long, short = 'k', env = "GHOST_KEY_FILE", default_value = "ghost.key")]
    pub key: PathBuf,

    /// 0x-prefixed intent hash.
    pub intent_hash: String,
}
