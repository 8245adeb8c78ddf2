//! # VaultProvider — Session Lifecycle, Write-Back & Scheduled Accrual
//!
//! The provider is the one piece of the engine with a clock. It owns a
//! [`VaultState`] behind a mutex and runs three kinds of task around it:
//!
//! ```text
//!   wallet watch ──→ driver ──┬─ session start: migrate, load, mark ready
//!                             │      ├─ persister  (debounced write-back)
//!                             │      └─ accrual    (2s, then every 15min)
//!                             └─ session end: abort both, clear state
//! ```
//!
//! Consumers get a [`VaultHandle`]: a cheap, cloneable view onto the state
//! with the full read/mutate contract. Every mutator completes
//! synchronously; persistence follows on its own schedule.
//!
//! ## Write-back
//!
//! A change to a collection arms a per-collection deadline
//! `persist_debounce` in the future. A further change before the deadline
//! re-arms it, so a burst produces one write carrying the final value. A
//! positions write that falls due while an accrual pass is in flight is held
//! back; the pass re-schedules it when it completes.
//!
//! Ending a session drops whatever is still pending. Callers that need the
//! latest state on disk call [`VaultHandle::flush`] first.
//!
//! ## Locking
//!
//! The state mutex is never held across an `.await`, and store I/O happens
//! on snapshots taken under the lock and written after it is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{ProviderConfig, DEFAULT_STCORE_BALANCE, DEFAULT_WBTC_BALANCE};
use crate::storage::{
    get_secure_item, migrate_legacy, set_secure_item, LegacyStorage, SecureStorage, StorageKey,
};
use crate::vault::{
    Accrual, AccrualOutcome, EarningsHistory, LoadedVault, NewPosition, UserBalances, VaultError,
    VaultPosition, VaultState,
};
use crate::wallet::{normalize_address, WalletStatus};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything the driver, the session tasks and the handles share.
struct Shared {
    state: Mutex<VaultState>,
    secure: Arc<dyn SecureStorage>,
    legacy: Arc<dyn LegacyStorage>,
    config: ProviderConfig,
    loaded_tx: watch::Sender<bool>,
    /// Change notifications for the current session's persister.
    persist_tx: Mutex<Option<mpsc::UnboundedSender<StorageKey>>>,
    session_tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Set when a positions write was held back by an in-flight accrual.
    positions_deferred: AtomicBool,
}

/// A point-in-time copy of one collection, ready to be written.
enum Snapshot {
    Positions(Vec<VaultPosition>),
    Balances(UserBalances),
    History(Vec<EarningsHistory>),
}

impl Snapshot {
    fn take(state: &VaultState, key: StorageKey) -> Self {
        match key {
            StorageKey::VaultPositions => Snapshot::Positions(state.positions().to_vec()),
            StorageKey::UserBalances => Snapshot::Balances(state.user_balances()),
            StorageKey::EarningsHistory => Snapshot::History(state.earnings_history().to_vec()),
        }
    }

    fn write(&self, store: &dyn SecureStorage, address: &str) {
        match self {
            Snapshot::Positions(v) => set_secure_item(store, address, StorageKey::VaultPositions, v),
            Snapshot::Balances(v) => set_secure_item(store, address, StorageKey::UserBalances, v),
            Snapshot::History(v) => set_secure_item(store, address, StorageKey::EarningsHistory, v),
        }
    }
}

impl Shared {
    /// Queues write-back of `keys`. Must be called with the state lock held
    /// so notifications follow mutation order.
    fn notify(&self, keys: &[StorageKey]) {
        if let Some(tx) = self.persist_tx.lock().as_ref() {
            for key in keys {
                let _ = tx.send(*key);
            }
        }
    }

    // -- Session lifecycle --------------------------------------------------

    fn start_session(self: &Arc<Self>, address: String) {
        let report = migrate_legacy(&*self.legacy, &*self.secure, &address);
        if !report.is_noop() {
            info!(
                %address,
                migrated = report.migrated.len(),
                failed = report.failed.len(),
                "legacy migration finished"
            );
        }

        let store = &*self.secure;
        let loaded = LoadedVault {
            positions: get_secure_item(store, &address, StorageKey::VaultPositions, Vec::new()),
            user_balances: get_secure_item(
                store,
                &address,
                StorageKey::UserBalances,
                UserBalances::new(DEFAULT_WBTC_BALANCE, DEFAULT_STCORE_BALANCE),
            ),
            earnings_history: get_secure_item(
                store,
                &address,
                StorageKey::EarningsHistory,
                Vec::new(),
            ),
        };
        let (positions, history) = (loaded.positions.len(), loaded.earnings_history.len());

        let (tx, rx) = mpsc::unbounded_channel();
        *self.persist_tx.lock() = Some(tx);
        self.positions_deferred.store(false, Ordering::SeqCst);
        self.state.lock().load(&address, loaded);
        self.loaded_tx.send_replace(true);

        info!(%address, positions, history, "vault session started");

        let persister = tokio::spawn(persist_loop(Arc::clone(self), address, rx));
        let accrual = tokio::spawn(accrual_loop(Arc::clone(self)));
        self.session_tasks.lock().extend([persister, accrual]);
    }

    fn end_session(&self) {
        self.persist_tx.lock().take();
        for task in self.session_tasks.lock().drain(..) {
            task.abort();
        }

        let address = {
            let mut state = self.state.lock();
            let address = state.address().map(str::to_string);
            state.clear();
            address
        };
        self.loaded_tx.send_replace(false);

        if let Some(address) = address {
            info!(%address, "vault session ended");
        }
    }

    // -- Persistence --------------------------------------------------------

    fn write_back(&self, address: &str, key: StorageKey) {
        let snapshot = {
            let state = self.state.lock();
            if state.address() != Some(address) || !state.is_data_loaded() {
                return;
            }
            if key == StorageKey::VaultPositions && state.is_accrual_in_flight() {
                self.positions_deferred.store(true, Ordering::SeqCst);
                debug!("positions write held back during accrual");
                return;
            }
            Snapshot::take(&state, key)
        };

        snapshot.write(&*self.secure, address);
        debug!(%key, "collection persisted");
    }

    fn flush(&self) -> bool {
        let (address, snapshots) = {
            let state = self.state.lock();
            let Some(address) = state.address().filter(|_| state.is_data_loaded()) else {
                return false;
            };
            let snapshots: Vec<Snapshot> = StorageKey::ALL
                .into_iter()
                .map(|key| Snapshot::take(&state, key))
                .collect();
            (address.to_string(), snapshots)
        };

        for snapshot in &snapshots {
            snapshot.write(&*self.secure, &address);
        }
        debug!(%address, "all collections flushed");
        true
    }

    // -- Accrual ------------------------------------------------------------

    /// One accrual pass. The computation runs with the lock released; the
    /// in-flight flag keeps overlapping passes out meanwhile.
    fn run_accrual(&self) -> AccrualOutcome {
        let now = Utc::now();
        let (snapshot, price) = {
            let mut state = self.state.lock();
            match state.begin_accrual(now) {
                Ok(snapshot) => (snapshot, state.wbtc_price()),
                Err(skip) => {
                    debug!(?skip, "accrual pass skipped");
                    return AccrualOutcome::Skipped(skip);
                }
            }
        };

        let accruals = VaultState::compute_accruals(&snapshot, now, price);
        let updated = self.complete_accrual(&accruals, now);
        debug!(positions = snapshot.len(), updated, "accrual pass complete");
        AccrualOutcome::Completed { updated }
    }

    /// Closes an open pass and re-queues any positions write it held back.
    fn complete_accrual(&self, accruals: &[Accrual], now: DateTime<Utc>) -> usize {
        let mut state = self.state.lock();
        let updated = state.finish_accrual(accruals, now);
        let deferred = self.positions_deferred.swap(false, Ordering::SeqCst);
        if updated > 0 || deferred {
            self.notify(&[StorageKey::VaultPositions]);
        }
        updated
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn drive(
    shared: Arc<Shared>,
    mut wallet: watch::Receiver<WalletStatus>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut current: Option<String> = None;

    loop {
        let wanted = wallet.borrow_and_update().session().map(normalize_address);

        if wanted != current {
            if current.take().is_some() {
                shared.end_session();
            }
            if let Some(address) = wanted {
                shared.start_session(address.clone());
                current = Some(address);
            }
        }

        tokio::select! {
            changed = wallet.changed() => {
                if changed.is_err() {
                    warn!("wallet signal closed, ending session");
                    break;
                }
            }
            _ = shutdown.changed() => {
                debug!("provider driver received shutdown signal");
                break;
            }
        }
    }

    if current.is_some() {
        shared.end_session();
    }
}

async fn persist_loop(
    shared: Arc<Shared>,
    address: String,
    mut changes: mpsc::UnboundedReceiver<StorageKey>,
) {
    let debounce = shared.config.persist_debounce;
    let mut due: HashMap<StorageKey, Instant> = HashMap::new();

    loop {
        let next = due.values().min().copied();
        let deadline = async move {
            match next {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            change = changes.recv() => match change {
                Some(key) => {
                    due.insert(key, Instant::now() + debounce);
                }
                None => break,
            },
            _ = deadline => {
                let now = Instant::now();
                let fired: Vec<StorageKey> = due
                    .iter()
                    .filter(|(_, at)| **at <= now)
                    .map(|(key, _)| *key)
                    .collect();
                for key in fired {
                    due.remove(&key);
                    shared.write_back(&address, key);
                }
            }
        }
    }

    if !due.is_empty() {
        debug!(pending = due.len(), "session ended with unwritten changes");
    }
}

async fn accrual_loop(shared: Arc<Shared>) {
    let start = Instant::now() + shared.config.accrual_initial_delay;
    let mut ticker = tokio::time::interval_at(start, shared.config.accrual_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        shared.run_accrual();
    }
}

// ---------------------------------------------------------------------------
// VaultProvider
// ---------------------------------------------------------------------------

/// Owns the driver task. Dropping the provider aborts every task it
/// started; [`VaultProvider::shutdown`] ends the session cleanly first.
pub struct VaultProvider {
    handle: VaultHandle,
    shutdown_tx: watch::Sender<bool>,
    driver: Option<JoinHandle<()>>,
}

impl VaultProvider {
    /// Starts the provider on the current tokio runtime.
    ///
    /// The wallet receiver's current value is acted on immediately, so a
    /// provider built against an already-connected wallet loads at once.
    pub fn spawn(
        wallet: watch::Receiver<WalletStatus>,
        secure: Arc<dyn SecureStorage>,
        legacy: Arc<dyn LegacyStorage>,
        config: ProviderConfig,
    ) -> Self {
        let (loaded_tx, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            state: Mutex::new(VaultState::new(config.wbtc_price, config.accrual_cooldown)),
            secure,
            legacy,
            config,
            loaded_tx,
            persist_tx: Mutex::new(None),
            session_tasks: Mutex::new(Vec::new()),
            positions_deferred: AtomicBool::new(false),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let driver = tokio::spawn(drive(Arc::clone(&shared), wallet, shutdown_rx));

        Self {
            handle: VaultHandle { shared },
            shutdown_tx,
            driver: Some(driver),
        }
    }

    pub fn handle(&self) -> VaultHandle {
        self.handle.clone()
    }

    /// Ends the current session and waits for the driver to exit.
    ///
    /// Pending debounced writes are dropped, as on disconnect.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                warn!(error = %e, "provider driver did not exit cleanly");
            }
        }
        info!("vault provider stopped");
    }
}

impl Drop for VaultProvider {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        for task in self.handle.shared.session_tasks.lock().drain(..) {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// VaultHandle
// ---------------------------------------------------------------------------

/// The state-access contract consumers program against.
///
/// Reads return owned snapshots. Mutators are no-ops (with a warning) until
/// the connected wallet's data has loaded.
#[derive(Clone)]
pub struct VaultHandle {
    shared: Arc<Shared>,
}

impl VaultHandle {
    // -- Reads --------------------------------------------------------------

    pub fn positions(&self) -> Vec<VaultPosition> {
        self.shared.state.lock().positions().to_vec()
    }

    pub fn earnings_history(&self) -> Vec<EarningsHistory> {
        self.shared.state.lock().earnings_history().to_vec()
    }

    pub fn user_balances(&self) -> UserBalances {
        self.shared.state.lock().user_balances()
    }

    pub fn address(&self) -> Option<String> {
        self.shared.state.lock().address().map(str::to_string)
    }

    pub fn is_wallet_connected(&self) -> bool {
        self.shared.state.lock().is_wallet_connected()
    }

    pub fn is_data_loaded(&self) -> bool {
        self.shared.state.lock().is_data_loaded()
    }

    /// Readiness as a watch channel. `true` from the moment a session's data
    /// is installed until the session ends.
    pub fn data_loaded(&self) -> watch::Receiver<bool> {
        self.shared.loaded_tx.subscribe()
    }

    /// Resolves once a session's data is loaded.
    pub async fn wait_until_loaded(&self) {
        let mut rx = self.data_loaded();
        // The sender lives in `shared`, which we hold; this cannot close.
        let _ = rx.wait_for(|loaded| *loaded).await;
    }

    // -- Mutators -----------------------------------------------------------

    pub fn set_user_balances(&self, balances: UserBalances) -> bool {
        let mut state = self.shared.state.lock();
        let applied = state.set_user_balances(balances);
        if applied {
            self.shared.notify(&[StorageKey::UserBalances]);
        }
        applied
    }

    /// Appends a position built from `request`. Balances are not debited.
    pub fn add_position(&self, request: NewPosition) -> Option<VaultPosition> {
        let mut state = self.shared.state.lock();
        let position = state.add_position(request, Utc::now())?;
        self.shared.notify(&[StorageKey::VaultPositions]);
        Some(position)
    }

    /// Debits the free balances and opens the position.
    ///
    /// # Errors
    ///
    /// See [`VaultError`]; nothing changes on error.
    pub fn deposit(&self, request: NewPosition) -> Result<VaultPosition, VaultError> {
        let mut state = self.shared.state.lock();
        let position = state.deposit(request, Utc::now())?;
        self.shared
            .notify(&[StorageKey::VaultPositions, StorageKey::UserBalances]);
        Ok(position)
    }

    pub fn close_vault(&self, id: &str) -> Option<EarningsHistory> {
        let mut state = self.shared.state.lock();
        let entry = state.close_vault(id, Utc::now())?;
        self.shared.notify(&StorageKey::ALL);
        Some(entry)
    }

    /// Runs an accrual pass now, subject to the same gates as the
    /// scheduled one.
    pub fn update_earnings(&self) -> AccrualOutcome {
        self.shared.run_accrual()
    }

    /// Writes all three collections immediately. Returns `false` when no
    /// session is loaded.
    pub fn flush(&self) -> bool {
        self.shared.flush()
    }

    // -- Aggregates ---------------------------------------------------------

    pub fn total_deposited(&self) -> f64 {
        self.shared.state.lock().total_deposited()
    }

    pub fn total_earnings(&self) -> f64 {
        self.shared.state.lock().total_earnings()
    }

    pub fn total_value(&self) -> f64 {
        self.shared.state.lock().total_value()
    }

    pub fn total_wbtc_earnings(&self) -> f64 {
        self.shared.state.lock().total_wbtc_earnings()
    }

    pub fn total_stcore_earnings(&self) -> f64 {
        self.shared.state.lock().total_stcore_earnings()
    }
}

impl std::fmt::Debug for VaultHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("VaultHandle")
            .field("address", &state.address())
            .field("data_loaded", &state.is_data_loaded())
            .field("positions", &state.positions().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StoreResult, VaultDB};
    use crate::vault::AccrualSkip;
    use crate::wallet::WalletConnection;
    use serde_json::Value;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const ALICE: &str = "0xa11ce00000000000000000000000000000000001";

    fn harness(config: ProviderConfig) -> (WalletConnection, VaultProvider, VaultDB) {
        let db = VaultDB::open_temporary().unwrap();
        let wallet = WalletConnection::new();
        let provider = VaultProvider::spawn(
            wallet.subscribe(),
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            config,
        );
        (wallet, provider, db)
    }

    fn quiet() -> ProviderConfig {
        ProviderConfig {
            accrual_initial_delay: Duration::from_secs(3600),
            ..ProviderConfig::default()
        }
    }

    fn request() -> NewPosition {
        NewPosition::quoted("lstBTC Vault", 0.1, 1_000.0, "8.5%", 43_000.0)
    }

    /// Stores a 1 wBTC position at 36.5% opened ten days ago.
    fn seed_aged_position(db: &VaultDB) {
        let opened = Utc::now() - chrono::Duration::days(10);
        let position = VaultPosition::open(
            NewPosition::quoted("Aged Vault", 1.0, 0.0, "36.5%", 43_000.0),
            opened,
            43_000.0,
        );
        set_secure_item(db, ALICE, StorageKey::VaultPositions, &vec![position]);
    }

    struct CountingDb {
        db: VaultDB,
        position_writes: AtomicUsize,
    }

    impl CountingDb {
        fn position_writes(&self) -> usize {
            self.position_writes.load(Ordering::SeqCst)
        }
    }

    impl SecureStorage for CountingDb {
        fn get_secure_raw(&self, address: &str, key: StorageKey) -> StoreResult<Option<Value>> {
            self.db.get_secure_raw(address, key)
        }

        fn set_secure_raw(&self, address: &str, key: StorageKey, value: &Value) -> StoreResult<()> {
            if key == StorageKey::VaultPositions {
                self.position_writes.fetch_add(1, Ordering::SeqCst);
            }
            self.db.set_secure_raw(address, key, value)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn not_ready_before_connect() {
        let (_wallet, provider, _db) = harness(quiet());
        let handle = provider.handle();

        tokio::task::yield_now().await;
        assert!(!handle.is_wallet_connected());
        assert!(!handle.is_data_loaded());
        assert!(handle.add_position(request()).is_none());
        assert!(handle.positions().is_empty());
        assert_eq!(handle.total_value(), 0.0);
        assert!(!handle.flush());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_loads_default_balances() {
        let (wallet, provider, _db) = harness(quiet());
        let handle = provider.handle();

        wallet.connect(ALICE);
        handle.wait_until_loaded().await;

        assert!(handle.is_wallet_connected());
        assert_eq!(handle.address().as_deref(), Some(ALICE));
        assert_eq!(handle.user_balances(), UserBalances::new(1.0, 10_000.0));
        assert!(handle.positions().is_empty());
        assert!(handle.earnings_history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn mutation_is_written_after_debounce() {
        let (wallet, provider, db) = harness(quiet());
        let handle = provider.handle();
        wallet.connect(ALICE);
        handle.wait_until_loaded().await;

        handle.set_user_balances(UserBalances::new(0.25, 99.0));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(db
            .get_secure_raw(ALICE, StorageKey::UserBalances)
            .unwrap()
            .is_none());

        tokio::time::sleep(Duration::from_millis(600)).await;
        let stored: UserBalances =
            get_secure_item(&db, ALICE, StorageKey::UserBalances, UserBalances::default());
        assert_eq!(stored, UserBalances::new(0.25, 99.0));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_clears_state() {
        let (wallet, provider, _db) = harness(quiet());
        let handle = provider.handle();
        wallet.connect(ALICE);
        handle.wait_until_loaded().await;
        handle.deposit(request()).unwrap();

        let mut loaded = handle.data_loaded();
        wallet.disconnect();
        loaded.wait_for(|v| !*v).await.unwrap();

        assert!(handle.positions().is_empty());
        assert!(handle.earnings_history().is_empty());
        assert_eq!(handle.user_balances(), UserBalances::default());
        assert!(!handle.is_wallet_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_accrual_respects_cooldown() {
        let (wallet, provider, _db) = harness(quiet());
        let handle = provider.handle();
        wallet.connect(ALICE);
        handle.wait_until_loaded().await;
        handle.add_position(request()).unwrap();

        assert_eq!(handle.update_earnings(), AccrualOutcome::Completed { updated: 0 });
        assert_eq!(
            handle.update_earnings(),
            AccrualOutcome::Skipped(AccrualSkip::CoolingDown)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn positions_write_waits_for_in_flight_accrual() {
        let db = VaultDB::open_temporary().unwrap();
        let store = Arc::new(CountingDb {
            db: db.clone(),
            position_writes: AtomicUsize::new(0),
        });
        let wallet = WalletConnection::new();
        let provider = VaultProvider::spawn(wallet.subscribe(), store.clone(), Arc::new(db), quiet());
        let handle = provider.handle();
        let shared = Arc::clone(&handle.shared);
        wallet.connect(ALICE);
        handle.wait_until_loaded().await;

        handle.add_position(request()).unwrap();
        let now = Utc::now();
        let snapshot = shared.state.lock().begin_accrual(now).unwrap();

        // The debounce elapses while the pass is open.
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(store.position_writes(), 0);
        assert!(shared.positions_deferred.load(Ordering::SeqCst));

        shared.write_back(ALICE, StorageKey::VaultPositions);
        assert_eq!(store.position_writes(), 0);

        let accruals = VaultState::compute_accruals(&snapshot, now, 43_000.0);
        assert_eq!(shared.complete_accrual(&accruals, now), 0);
        assert!(!shared.positions_deferred.load(Ordering::SeqCst));
        assert!(!shared.state.lock().is_accrual_in_flight());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(store.position_writes(), 0);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(store.position_writes(), 1);

        let stored: Vec<VaultPosition> =
            get_secure_item(&store.db, ALICE, StorageKey::VaultPositions, Vec::new());
        assert_eq!(stored, handle.positions());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_accrual_repeats_every_interval() {
        let config = ProviderConfig {
            accrual_cooldown: Duration::ZERO,
            ..ProviderConfig::default()
        };
        let (wallet, provider, db) = harness(config.clone());
        seed_aged_position(&db);
        let handle = provider.handle();
        let shared = Arc::clone(&handle.shared);
        wallet.connect(ALICE);
        handle.wait_until_loaded().await;
        assert!(shared.state.lock().last_accrual().is_none());

        tokio::time::sleep(config.accrual_initial_delay + Duration::from_millis(100)).await;
        let first = shared.state.lock().last_accrual().expect("first pass ran");
        assert_eq!(handle.total_earnings(), 430.0);

        tokio::time::sleep(config.accrual_interval - Duration::from_secs(1)).await;
        assert_eq!(shared.state.lock().last_accrual(), Some(first));

        tokio::time::sleep(Duration::from_secs(2)).await;
        let second = shared.state.lock().last_accrual().expect("second pass ran");
        assert!(second > first);
        assert_eq!(handle.total_earnings(), 430.0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_accrual() {
        let (wallet, provider, db) = harness(ProviderConfig::default());
        seed_aged_position(&db);
        let handle = provider.handle();
        let shared = Arc::clone(&handle.shared);
        wallet.connect(ALICE);
        handle.wait_until_loaded().await;

        tokio::time::sleep(Duration::from_secs(1)).await;
        let mut loaded = handle.data_loaded();
        wallet.disconnect();
        loaded.wait_for(|v| !*v).await.unwrap();
        assert!(shared.session_tasks.lock().is_empty());

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(shared.state.lock().last_accrual().is_none());
        assert_eq!(handle.total_earnings(), 0.0);
        let stored: Vec<VaultPosition> =
            get_secure_item(&db, ALICE, StorageKey::VaultPositions, Vec::new());
        assert_eq!(stored[0].earnings, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_ends_session() {
        let (wallet, provider, _db) = harness(quiet());
        let handle = provider.handle();
        wallet.connect(ALICE);
        handle.wait_until_loaded().await;

        provider.shutdown().await;
        assert!(!handle.is_data_loaded());
        assert!(!*handle.data_loaded().borrow());
    }
}
