//! Shared harness for desk-level integration tests.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use propdesk_core::clock::FixedClock;
use propdesk_core::domain::{AccountKey, Challenge, UserId, Wallet};
use propdesk_core::feed::{PriceCell, PriceSource};
use propdesk_core::store::{paths, Collections, DocumentStore, MemoryStore, StoreError, WriteBatch};
use propdesk_core::{DeskConfig, TradingDesk};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Memory store whose commits can be made to fail on demand.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn fail_commits(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Collections {
        self.inner.snapshot()
    }

    pub fn count(&self, collection: &str) -> usize {
        self.snapshot().get(collection).map_or(0, |docs| docs.len())
    }
}

impl DocumentStore for FlakyStore {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(collection, id)
    }

    fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError> {
        self.inner.list(collection)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        self.inner.commit(batch)
    }
}

/// Price source that counts reads.
pub struct CountingPrice {
    cell: PriceCell,
    reads: AtomicUsize,
}

impl CountingPrice {
    pub fn at(price: f64) -> Self {
        Self { cell: PriceCell::with_price(price), reads: AtomicUsize::new(0) }
    }

    pub fn set(&self, price: f64) {
        self.cell.set(price);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl PriceSource for CountingPrice {
    fn current_price(&self) -> Option<f64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.cell.get()
    }
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap()
}

pub struct Harness {
    pub desk: TradingDesk,
    pub store: Arc<FlakyStore>,
    pub prices: Arc<CountingPrice>,
    pub clock: Arc<FixedClock>,
    pub challenge: Challenge,
}

impl Harness {
    pub fn new(config: DeskConfig) -> Self {
        let store = Arc::new(FlakyStore::default());
        let prices = Arc::new(CountingPrice::at(20_000.0));
        let clock = Arc::new(FixedClock::new(start()));
        let desk = TradingDesk::new(config, store.clone(), prices.clone()).with_clock(clock.clone());
        let challenge = desk.create_challenge("NQ 100K", None).unwrap();
        Self { desk, store, prices, clock, challenge }
    }

    pub fn token(&self) -> &str {
        &self.desk.config().tokens.governance
    }

    pub fn wallet_with(&self, user: &str, tokens: f64) -> Wallet {
        self.desk
            .create_wallet(&UserId::new(user), "main", [(self.token().to_string(), tokens)])
            .unwrap()
    }

    /// Join the harness challenge holding `tokens` after the entry fee.
    pub fn join(&self, user: &str, tokens: f64) -> (AccountKey, Wallet) {
        let fee = self.challenge.entry_fee;
        let wallet = self.wallet_with(user, tokens + fee);
        let account = self
            .desk
            .join_challenge(&wallet.owner, &wallet.id, &self.challenge.id)
            .unwrap();
        let wallet = self.desk.wallet(&wallet.owner, &wallet.id).unwrap();
        (account.key(), wallet)
    }

    /// Overwrite a wallet's governance balance directly in the store.
    pub fn set_tokens(&self, wallet: &Wallet, tokens: f64) {
        let mut current = self.desk.wallet(&wallet.owner, &wallet.id).unwrap();
        current.balances.insert(self.token().to_string(), tokens);
        let mut batch = WriteBatch::new();
        batch
            .put(paths::wallets(wallet.owner.as_str()), wallet.id.as_str(), &current)
            .unwrap();
        self.store.commit(batch).unwrap();
    }

    pub fn tokens(&self, wallet: &Wallet) -> f64 {
        self.desk
            .wallet(&wallet.owner, &wallet.id)
            .unwrap()
            .balance(self.token())
    }
}
