// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Ghost Agent Node
//!
//! Entry point for the `ghost-node` binary. Parses CLI arguments, initializes
//! logging and metrics, hosts the intent ledger behind the HTTP/WS API and
//! runs the verifying service.
//!
//! The binary supports five subcommands:
//!
//! - `run`: start the node
//! - `init`: generate a secp256k1 key file
//! - `hash`: canonical intent hash of a payload file
//! - `sign`: sign an intent hash with a key file
//! - `version`: print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod oracle;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;

use ghost_contracts::{IntentLedger, IntentStore, MemoryIntentStore, SettlementExecutor, SledIntentStore, Treasury};
use ghost_protocol::crypto::keys::AgentKeypair;
use ghost_protocol::crypto::signatures::sign_intent_hash;
use ghost_protocol::intent::{AuditPolicy, IntentHash, IntentPayload, NoRiskScorer};

use cli::{Commands, GhostNodeCli};
use metrics::NodeMetrics;
use oracle::{PayloadBook, VerifyingService};

/// Broadcast channel capacity for live event streaming.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = GhostNodeCli::parse();
    logging::init_logging(logging::DEFAULT_FILTER, cli.log_format.into());

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_key(args),
        Commands::Hash(args) => hash_payload(args),
        Commands::Sign(args) => sign_hash(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: API server, metrics endpoint and verifying service.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        data_dir = ?args.data_dir,
        "starting ghost-node"
    );

    // --- Ledger state ---
    let (store, treasury): (Box<dyn IntentStore>, Treasury) = match &args.data_dir {
        Some(dir) => {
            let db_path = dir.join("ledger");
            std::fs::create_dir_all(&db_path).with_context(|| {
                format!("failed to create database directory: {}", db_path.display())
            })?;
            let store = SledIntentStore::open(&db_path)
                .with_context(|| format!("failed to open ledger database at {}", db_path.display()))?;
            let treasury = Treasury::open(store.db(), args.initial_balance)
                .context("failed to load treasury state")?;
            tracing::info!(
                path = %db_path.display(),
                intents = store.len(),
                held = treasury.held_balance(),
                "ledger database opened"
            );
            let store: Box<dyn IntentStore> = Box::new(store);
            (store, treasury)
        }
        None => {
            tracing::warn!("no data directory configured, ledger state is kept in memory only");
            let store: Box<dyn IntentStore> = Box::new(MemoryIntentStore::new());
            (store, Treasury::with_balance(args.initial_balance))
        }
    };

    // --- Ledger ---
    let ledger = Arc::new(IntentLedger::new(store, treasury));

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to create metrics registry")?);
    node_metrics.set_treasury_balance(ledger.executor().held_balance());
    ledger.events().subscribe(node_metrics.clone());

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    ledger
        .events()
        .subscribe(Arc::new(api::BroadcastSink::new(event_tx.clone())));

    let payloads = Arc::new(PayloadBook::new());

    // --- Verifying service ---
    let mut oracle_address = None;
    let oracle_task = match &args.oracle_key {
        Some(key_path) => {
            let keypair = load_keypair(key_path)?;
            let policy = AuditPolicy {
                allowed_countries: args
                    .allowed_countries
                    .iter()
                    .map(|c| c.trim().to_uppercase())
                    .collect::<BTreeSet<_>>(),
                max_amount_wei: args.max_amount_wei,
                time_window: Duration::from_secs(args.audit_window_secs),
                ..AuditPolicy::default()
            };
            let service = Arc::new(VerifyingService::new(
                Arc::clone(&ledger),
                Arc::clone(&payloads),
                keypair,
                policy,
                Arc::new(NoRiskScorer),
                Arc::clone(&node_metrics),
            ));
            oracle_address = Some(service.address());
            let poll = Duration::from_secs(args.oracle_poll_secs.max(1));
            Some(tokio::spawn(service.run(event_tx.subscribe(), poll)))
        }
        None => {
            tracing::info!("no oracle key configured, verifying service disabled");
            None
        }
    };

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            ghost_protocol::config::PROTOCOL_VERSION,
        ),
        ledger: Arc::clone(&ledger),
        payloads,
        event_tx,
        metrics: Arc::clone(&node_metrics),
        oracle: oracle_address,
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

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

    if let Some(task) = oracle_task {
        task.abort();
    }
    tracing::info!(intents = ledger.intent_count(), "ghost-node stopped");
    Ok(())
}

/// Reads a hex-encoded secret key file.
fn load_keypair(path: &Path) -> Result<AgentKeypair> {
    let hex_key = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read key file {}", path.display()))?;
    AgentKeypair::from_hex(hex_key.trim())
        .with_context(|| format!("invalid key in {}", path.display()))
}

/// Generates a keypair and writes its secret key to a file.
fn init_key(args: cli::InitArgs) -> Result<()> {
    let key_path = &args.output;
    if key_path.exists() && !args.force {
        bail!(
            "{} already exists, pass --force to overwrite",
            key_path.display()
        );
    }
    if let Some(parent) = key_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    let keypair = AgentKeypair::generate();
    std::fs::write(key_path, keypair.secret_key_hex())
        .with_context(|| format!("failed to write key to {}", key_path.display()))?;

    // Restrict permissions on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!(
        address = %keypair.address(),
        key_path = %key_path.display(),
        "keypair generated"
    );

    println!("Key file : {}", key_path.display());
    println!("Address  : {}", keypair.address());
    Ok(())
}

/// Prints the canonical intent hash of a payload file.
fn hash_payload(args: cli::HashArgs) -> Result<()> {
    let bytes = std::fs::read(&args.payload)
        .with_context(|| format!("failed to read payload {}", args.payload.display()))?;
    let payload = IntentPayload::from_json(&bytes)
        .with_context(|| format!("invalid payload in {}", args.payload.display()))?;
    let intent_hash = payload
        .intent_hash()
        .context("failed to hash payload")?;
    println!("{}", intent_hash);
    Ok(())
}

/// Signs an intent hash and prints the 65-byte signature.
fn sign_hash(args: cli::SignArgs) -> Result<()> {
    let keypair = load_keypair(&args.key)?;
    let intent_hash: IntentHash = args
        .intent_hash
        .parse()
        .with_context(|| format!("invalid intent hash {}", args.intent_hash))?;
    let signature = sign_intent_hash(&keypair, intent_hash.as_bytes());

    tracing::debug!(signer = %keypair.address(), intent_hash = %intent_hash, "intent hash signed");
    println!("{}", signature.to_hex());
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("ghost-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {}", ghost_protocol::config::PROTOCOL_VERSION);
    println!("signing    {}", ghost_protocol::config::SIGNING_ALGORITHM);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
