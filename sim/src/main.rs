// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # lstBTC Vault Simulator
//!
//! Entry point for the `lstvault-sim` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the encrypted store, and drives a
//! vault provider for a single wallet address.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — connect, optionally deposit, report totals until interrupted
//! - `show`    — print a wallet's stored records as JSON
//! - `close`   — close one position and exit
//! - `version` — print build version information

mod cli;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use lstvault_core::config::{ProviderConfig, DEFAULT_STCORE_BALANCE, DEFAULT_WBTC_BALANCE};
use lstvault_core::storage::{get_secure_item, StorageKey, VaultDB};
use lstvault_core::vault::{AccrualOutcome, EarningsHistory, NewPosition, UserBalances, VaultPosition};
use lstvault_core::wallet::{normalize_address, WalletConnection};
use lstvault_core::{VaultHandle, VaultProvider};

use cli::{Commands, LstVaultCli};
use logging::{LogFormat, DEFAULT_DIRECTIVE};
use metrics::SimMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = LstVaultCli::parse();

    match cli.command {
        Commands::Run(args) => run_vault(args).await,
        Commands::Show(args) => show_records(args),
        Commands::Close(args) => close_position(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Opens (creating if needed) the vault database under `data_dir`.
fn open_store(data_dir: &Path) -> Result<VaultDB> {
    let db_path = data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;

    let db = VaultDB::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");
    Ok(db)
}

/// A provider over `db` with `address` already connected and loaded.
async fn connect(
    db: &VaultDB,
    address: &str,
    config: ProviderConfig,
) -> (WalletConnection, VaultProvider, VaultHandle) {
    let wallet = WalletConnection::new();
    let provider = VaultProvider::spawn(
        wallet.subscribe(),
        Arc::new(db.clone()),
        Arc::new(db.clone()),
        config,
    );
    let vault = provider.handle();

    wallet.connect(address);
    vault.wait_until_loaded().await;
    (wallet, provider, vault)
}

/// Flushes, disconnects, and stops the provider.
async fn disconnect(
    db: &VaultDB,
    wallet: WalletConnection,
    provider: VaultProvider,
    vault: &VaultHandle,
) -> Result<()> {
    vault.flush();
    wallet.disconnect();
    provider.shutdown().await;
    db.flush().context("failed to flush database")?;
    Ok(())
}

/// Runs the vault for one wallet until Ctrl+C / SIGTERM.
async fn run_vault(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(DEFAULT_DIRECTIVE, args.log_format);

    tracing::info!(
        address = %args.store.address,
        data_dir = %args.store.data_dir.display(),
        metrics_port = ?args.metrics_port,
        "starting lstvault-sim"
    );

    let db = open_store(&args.store.data_dir)?;
    let (wallet, provider, vault) =
        connect(&db, &args.store.address, args.provider_config()).await;

    // --- Demo deposit ---
    if args.wants_deposit() {
        let request = NewPosition::quoted(
            args.vault_name.clone(),
            args.deposit_wbtc.unwrap_or(0.0),
            args.deposit_stcore.unwrap_or(0.0),
            args.apy.clone(),
            args.wbtc_price,
        );
        match vault.deposit(request) {
            Ok(position) => tracing::info!(
                id = %position.id,
                value = position.current_value,
                lstbtc = position.lstbtc_generated,
                "deposit accepted"
            ),
            Err(e) => tracing::warn!(error = %e, "deposit rejected"),
        }
    }

    // --- Metrics ---
    let sim_metrics = Arc::new(SimMetrics::new().context("failed to register metrics")?);
    sim_metrics.observe(&vault);

    let metrics_server = match args.metrics_port {
        Some(port) => {
            let addr = format!("0.0.0.0:{port}");
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind metrics listener on {addr}"))?;
            tracing::info!("metrics server listening on {}", addr);

            let router = metrics::router(Arc::clone(&sim_metrics));
            Some(tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, router).await {
                    tracing::error!(error = %e, "metrics server error");
                }
            }))
        }
        None => None,
    };

    // --- Report loop ---
    let mut report = tokio::time::interval(Duration::from_secs(args.report_secs.max(1)));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = report.tick() => {
                sim_metrics.observe(&vault);
                sim_metrics.report_ticks_total.inc();
                let balances = vault.user_balances();
                tracing::info!(
                    positions = vault.positions().len(),
                    deposited = vault.total_deposited(),
                    value = vault.total_value(),
                    earnings = vault.total_earnings(),
                    wbtc_earnings = vault.total_wbtc_earnings(),
                    stcore_earnings = vault.total_stcore_earnings(),
                    wbtc = balances.wbtc,
                    stcore = balances.stcore,
                    "vault totals"
                );
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received, flushing vault");
                break;
            }
        }
    }

    if let Some(server) = metrics_server {
        server.abort();
    }
    disconnect(&db, wallet, provider, &vault).await?;
    tracing::info!("lstvault-sim stopped");
    Ok(())
}

/// Prints a wallet's stored records without starting a session.
fn show_records(args: cli::StoreArgs) -> Result<()> {
    logging::init_logging("warn", LogFormat::Pretty);

    let db = open_store(&args.data_dir)?;
    let address = normalize_address(&args.address);

    let positions: Vec<VaultPosition> =
        get_secure_item(&db, &address, StorageKey::VaultPositions, Vec::new());
    let balances = get_secure_item(
        &db,
        &address,
        StorageKey::UserBalances,
        UserBalances::new(DEFAULT_WBTC_BALANCE, DEFAULT_STCORE_BALANCE),
    );
    let history: Vec<EarningsHistory> =
        get_secure_item(&db, &address, StorageKey::EarningsHistory, Vec::new());

    let out = serde_json::json!({
        "address": address,
        "vaultPositions": positions,
        "userBalances": balances,
        "earningsHistory": history,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Closes one position, persists the result, and prints the history entry.
async fn close_position(args: cli::CloseArgs) -> Result<()> {
    logging::init_logging(DEFAULT_DIRECTIVE, LogFormat::Pretty);

    let db = open_store(&args.store.data_dir)?;
    let Some(entry) = close_in_store(&db, &args.store.address, &args.id).await? else {
        bail!("no open position with id {}", args.id);
    };
    println!("{}", serde_json::to_string_pretty(&entry)?);
    Ok(())
}

/// Brings earnings up to date, then closes `id` and persists all three
/// collections. `None` when the wallet has no such position.
async fn close_in_store(
    db: &VaultDB,
    address: &str,
    id: &str,
) -> Result<Option<EarningsHistory>> {
    let (wallet, provider, vault) = connect(db, address, ProviderConfig::default()).await;

    match vault.update_earnings() {
        AccrualOutcome::Completed { updated } => {
            tracing::debug!(updated, "earnings accrued before close")
        }
        AccrualOutcome::Skipped(skip) => tracing::warn!(?skip, "accrual skipped before close"),
    }
    let closed = vault.close_vault(id);
    disconnect(db, wallet, provider, &vault).await?;
    Ok(closed)
}

/// Prints version information to stdout.
fn print_version() {
    println!("lstvault-sim {}", env!("CARGO_PKG_VERSION"));
    println!("rustc        {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler can't be
/// installed, that branch never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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
