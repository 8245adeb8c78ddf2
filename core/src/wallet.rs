//! # Wallet Connection Signal
//!
//! The vault doesn't talk to wallets. It watches a [`WalletStatus`] that
//! something else (a browser extension bridge, the simulator CLI, a test)
//! publishes through a [`WalletConnection`]. The provider reacts to every
//! change of that status: a new session loads data, anything else tears the
//! current session down.

use tokio::sync::watch;
use tracing::info;

/// Byte length of an EVM account address.
const EVM_ADDRESS_BYTES: usize = 20;

/// What the wallet collaborator currently reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletStatus {
    pub connected: bool,
    pub address: Option<String>,
}

impl WalletStatus {
    /// A connected status for `address`.
    pub fn connected(address: impl Into<String>) -> Self {
        Self {
            connected: true,
            address: Some(address.into()),
        }
    }

    /// The address of the active session, if there is one.
    ///
    /// A session needs both the connected flag and a non-empty address.
    pub fn session(&self) -> Option<&str> {
        match (&self.address, self.connected) {
            (Some(address), true) if !address.is_empty() => Some(address),
            _ => None,
        }
    }

    pub fn is_session(&self) -> bool {
        self.session().is_some()
    }
}

/// Canonical form of a wallet address.
///
/// `0x`-prefixed 20-byte hex addresses are lower-cased, so checksummed and
/// plain spellings of one account share a storage namespace. Anything else
/// is only trimmed.
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"));

    match body {
        Some(hex_part) if is_evm_hex(hex_part) => format!("0x{}", hex_part.to_ascii_lowercase()),
        _ => trimmed.to_string(),
    }
}

fn is_evm_hex(s: &str) -> bool {
    hex::decode(s).map_or(false, |bytes| bytes.len() == EVM_ADDRESS_BYTES)
}

/// Publisher side of the wallet signal.
#[derive(Debug)]
pub struct WalletConnection {
    tx: watch::Sender<WalletStatus>,
}

impl WalletConnection {
    /// Starts disconnected.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(WalletStatus::default());
        Self { tx }
    }

    /// Reports `address` as connected. Switching accounts is just another
    /// `connect`.
    pub fn connect(&self, address: &str) {
        let address = normalize_address(address);
        info!(%address, "wallet connected");
        self.tx.send_replace(WalletStatus::connected(address));
    }

    pub fn disconnect(&self) {
        info!("wallet disconnected");
        self.tx.send_replace(WalletStatus::default());
    }

    pub fn subscribe(&self) -> watch::Receiver<WalletStatus> {
        self.tx.subscribe()
    }

    pub fn status(&self) -> WalletStatus {
        self.tx.borrow().clone()
    }
}

impl Default for WalletConnection {
    fn default() -> Self {
        Self::new()
    }
}
