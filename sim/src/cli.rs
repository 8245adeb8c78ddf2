//! # CLI Interface
//!
//! Defines the command-line argument structure for `lstvault-sim` using
//! `clap` derive. Supports four subcommands: `run`, `show`, `close`, and
//! `version`. Every flag can also come from an `LSTVAULT_*` variable.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use lstvault_core::config::{
    ProviderConfig, ACCRUAL_COOLDOWN, ACCRUAL_INITIAL_DELAY, ACCRUAL_INTERVAL, PERSIST_DEBOUNCE,
    WBTC_PRICE,
};

use crate::logging::LogFormat;

/// lstBTC vault simulator.
///
/// Runs the vault engine against an encrypted local store for one wallet
/// address: deposit, accrue, close, inspect.
#[derive(Parser, Debug)]
#[command(
    name = "lstvault-sim",
    about = "lstBTC vault simulator",
    version,
    propagate_version = true
)]
pub struct LstVaultCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect a wallet and keep the vault running until interrupted.
    Run(RunArgs),
    /// Print the stored records of a wallet as JSON.
    Show(StoreArgs),
    /// Close one position and exit.
    Close(CloseArgs),
    /// Print version information and exit.
    Version,
}

/// Where the store lives and whose records to touch.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Directory holding the encrypted vault database.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "LSTVAULT_DATA_DIR", default_value = ".lstvault")]
    pub data_dir: PathBuf,

    /// Wallet address whose records to use.
    #[arg(long, short = 'a', env = "LSTVAULT_ADDRESS")]
    pub address: String,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// wBTC to deposit into a new position after connecting.
    #[arg(long, env = "LSTVAULT_DEPOSIT_WBTC")]
    pub deposit_wbtc: Option<f64>,

    /// stCORE to deposit into a new position after connecting.
    #[arg(long, env = "LSTVAULT_DEPOSIT_STCORE")]
    pub deposit_stcore: Option<f64>,

    /// APY label for the demo deposit.
    #[arg(long, env = "LSTVAULT_APY", default_value = "8.5%")]
    pub apy: String,

    /// Vault name for the demo deposit.
    #[arg(long, env = "LSTVAULT_VAULT_NAME", default_value = "lstBTC Vault")]
    pub vault_name: String,

    /// Seconds between totals reports in the log.
    #[arg(long, env = "LSTVAULT_REPORT_SECS", default_value_t = 30)]
    pub report_secs: u64,

    /// Serve Prometheus metrics on this port.
    #[arg(long, env = "LSTVAULT_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Price used to value wBTC.
    #[arg(long, env = "LSTVAULT_WBTC_PRICE", default_value_t = WBTC_PRICE)]
    pub wbtc_price: f64,

    /// Seconds between scheduled accrual passes.
    #[arg(long, env = "LSTVAULT_ACCRUAL_INTERVAL_SECS", default_value_t = ACCRUAL_INTERVAL.as_secs())]
    pub accrual_interval_secs: u64,

    #[arg(long, env = "LSTVAULT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl RunArgs {
    /// Whether a demo deposit was requested.
    pub fn wants_deposit(&self) -> bool {
        self.deposit_wbtc.is_some() || self.deposit_stcore.is_some()
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            wbtc_price: self.wbtc_price,
            persist_debounce: PERSIST_DEBOUNCE,
            accrual_cooldown: ACCRUAL_COOLDOWN,
            accrual_initial_delay: ACCRUAL_INITIAL_DELAY,
            accrual_interval: Duration::from_secs(self.accrual_interval_secs.max(1)),
        }
    }
}

/// Arguments for the `close` subcommand.
#[derive(Args, Debug)]
pub struct CloseArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Id of the position to close.
    #[arg(long)]
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        LstVaultCli::command().debug_assert();
    }

    #[test]
    fn run_args_map_onto_provider_config() {
        let cli = LstVaultCli::parse_from([
            "lstvault-sim",
            "run",
            "--address",
            "0xabc",
            "--deposit-wbtc",
            "0.5",
            "--accrual-interval-secs",
            "60",
            "--log-format",
            "json",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };

        assert!(args.wants_deposit());
        assert_eq!(args.log_format, LogFormat::Json);
        let config = args.provider_config();
        assert_eq!(config.accrual_interval, Duration::from_secs(60));
        assert_eq!(config.wbtc_price, WBTC_PRICE);
        assert_eq!(config.persist_debounce, PERSIST_DEBOUNCE);
    }

    #[test]
    fn close_requires_id() {
        let result = LstVaultCli::try_parse_from(["lstvault-sim", "close", "--address", "0xabc"]);
        assert!(result.is_err());
    }
}
