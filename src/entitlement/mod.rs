use fs_err as fs;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

use crate::errors::{ShopError, ShopResult};

/// A credit balance per account. `try_spend` is the single atomic
/// check-and-decrement: either the full cost is taken or nothing changes.
pub trait BalanceStore: Send + Sync {
    fn balance(&self, account: &str) -> ShopResult<u64>;
    fn try_spend(&self, account: &str, cost: u64) -> ShopResult<bool>;
    fn credit(&self, account: &str, amount: u64) -> ShopResult<u64>;
}

fn spend(balances: &mut BTreeMap<String, u64>, opening: u64, account: &str, cost: u64) -> bool {
    let bal = balances.entry(account.to_string()).or_insert(opening);
    match bal.checked_sub(cost) {
        Some(rest) => {
            *bal = rest;
            true
        }
        None => false,
    }
}

fn add(balances: &mut BTreeMap<String, u64>, opening: u64, account: &str, amount: u64) -> u64 {
    let bal = balances.entry(account.to_string()).or_insert(opening);
    *bal = bal.saturating_add(amount);
    *bal
}

pub struct InMemoryBalanceStore {
    opening: u64,
    balances: Mutex<BTreeMap<String, u64>>,
}

impl InMemoryBalanceStore {
    /// Accounts seen for the first time start with `opening` credits.
    pub fn new(opening: u64) -> Self {
        Self { opening, balances: Mutex::new(BTreeMap::new()) }
    }
}

impl BalanceStore for InMemoryBalanceStore {
    fn balance(&self, account: &str) -> ShopResult<u64> {
        Ok(self.balances.lock().get(account).copied().unwrap_or(self.opening))
    }

    fn try_spend(&self, account: &str, cost: u64) -> ShopResult<bool> {
        Ok(spend(&mut self.balances.lock(), self.opening, account, cost))
    }

    fn credit(&self, account: &str, amount: u64) -> ShopResult<u64> {
        Ok(add(&mut self.balances.lock(), self.opening, account, amount))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Ledger {
    accounts: BTreeMap<String, u64>,
}

/// JSON ledger on disk. Every change is written to a temp file in the same
/// directory and renamed over the ledger while the lock is held.
pub struct FileBalanceStore {
    path: PathBuf,
    opening: u64,
    lock: Mutex<()>,
}

impl FileBalanceStore {
    pub fn new(path: impl Into<PathBuf>, opening: u64) -> Self {
        Self { path: path.into(), opening, lock: Mutex::new(()) }
    }

    fn read(&self) -> ShopResult<Ledger> {
        if !self.path.exists() {
            return Ok(Ledger::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        serde_json::from_str(&raw)
            .map_err(|e| ShopError::Storage(format!("ledger {} is corrupt: {e}", self.path.display())))
    }

    fn write(&self, ledger: &Ledger) -> ShopResult<()> {
        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(serde_json::to_string_pretty(ledger)?.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| ShopError::Storage(format!("ledger write failed: {e}")))?;
        Ok(())
    }

    fn update<T>(&self, f: impl FnOnce(&mut BTreeMap<String, u64>) -> T) -> ShopResult<T> {
        let _guard = self.lock.lock();
        let mut ledger = self.read()?;
        let out = f(&mut ledger.accounts);
        self.write(&ledger)?;
        Ok(out)
    }
}

impl BalanceStore for FileBalanceStore {
    fn balance(&self, account: &str) -> ShopResult<u64> {
        let _guard = self.lock.lock();
        Ok(self.read()?.accounts.get(account).copied().unwrap_or(self.opening))
    }

    fn try_spend(&self, account: &str, cost: u64) -> ShopResult<bool> {
        self.update(|accounts| spend(accounts, self.opening, account, cost))
    }

    fn credit(&self, account: &str, amount: u64) -> ShopResult<u64> {
        self.update(|accounts| add(accounts, self.opening, account, amount))
    }
}

/// Pre-flight check for costed actions. Store calls run on the blocking
/// pool since the file ledger reads, writes and syncs on every change.
#[derive(Clone)]
pub struct EntitlementGate {
    store: Arc<dyn BalanceStore>,
}

impl EntitlementGate {
    pub fn new(store: Arc<dyn BalanceStore>) -> Self {
        Self { store }
    }

    async fn with_store<T, F>(&self, f: F) -> ShopResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn BalanceStore) -> ShopResult<T> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| ShopError::Storage(format!("balance store task failed: {e}")))?
    }

    /// True when `cost` was taken from the account's balance. No account, or
    /// too little balance, leaves everything untouched and returns false.
    pub async fn authorize(&self, account: Option<&str>, cost: u64) -> ShopResult<bool> {
        let Some(account) = account else {
            log::info!("costed action refused: no signed-in account");
            return Ok(false);
        };
        if cost == 0 {
            return Ok(true);
        }
        let acct = account.to_string();
        let ok = self.with_store(move |s| s.try_spend(&acct, cost)).await?;
        if ok {
            log::info!("spent {cost} credits for {account}");
        } else {
            log::info!("refused {cost} credits for {account}: balance too low");
        }
        Ok(ok)
    }

    /// `authorize`, turned into `InsufficientEntitlement` on refusal.
    pub async fn require(&self, account: Option<&str>, cost: u64) -> ShopResult<()> {
        if self.authorize(account, cost).await? {
            Ok(())
        } else {
            Err(ShopError::InsufficientEntitlement { cost })
        }
    }

    pub async fn balance(&self, account: &str) -> ShopResult<u64> {
        let acct = account.to_string();
        self.with_store(move |s| s.balance(&acct)).await
    }

    /// Credit an account. Used to hand back the cost of a failed action.
    pub async fn top_up(&self, account: &str, amount: u64) -> ShopResult<u64> {
        let acct = account.to_string();
        self.with_store(move |s| s.credit(&acct, amount)).await
    }
}
