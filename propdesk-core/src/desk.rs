//! Trading desk service: the store-backed entry point for every account
//! operation.
//!
//! Each operation takes the account's lock, loads the account and its wallet,
//! runs the daily reset, applies one ledger/governor/lifecycle transition,
//! reads the current price at most once, and commits every changed document
//! in a single batch. A failed commit is returned to the caller.

use crate::clock::{Clock, SystemClock};
use crate::config::DeskConfig;
use crate::domain::{
    new_document_id, Account, AccountKey, Challenge, ChallengeId, LiquidationRecord, OrderKind,
    Side, Trade, TriggerFlags, UserId, Wallet, WalletId,
};
use crate::error::{DeskError, LifecycleError, TradeError};
use crate::feed::PriceSource;
use crate::ledger::{
    AccountSummary, CloseOutcome, ClosePreview, OpenPreview, OrderRequest, PositionLedger,
    PositionView,
};
use crate::lifecycle::{self, EodReport, JoinPreview};
use crate::risk::{LiquidationOutcome, RiskGauge, RiskGovernor, SettlementReport};
use crate::slots::SlotStatus;
use crate::store::{self, get_as, list_as, DocumentStore, WriteBatch};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, info, warn};

type LockTable<K> = Mutex<HashMap<K, Arc<Mutex<()>>>>;

fn lock_for<K: Eq + Hash + Clone>(table: &LockTable<K>, key: &K) -> Arc<Mutex<()>> {
    Arc::clone(table.lock().entry(key.clone()).or_default())
}

/// Working copy of one account and its wallet during an operation.
struct Session {
    account: Account,
    wallet: Wallet,
    loaded_account: Account,
    loaded_wallet: Wallet,
    liquidations: Vec<LiquidationRecord>,
}

impl Session {
    fn new(account: Account, wallet: Wallet) -> Self {
        Self {
            loaded_account: account.clone(),
            loaded_wallet: wallet.clone(),
            account,
            wallet,
            liquidations: Vec::new(),
        }
    }

    fn record(&mut self, settlement: &SettlementReport) {
        if let Some(record) = settlement.liquidation() {
            self.liquidations.push(record.clone());
        }
    }

    fn into_batch(self) -> Result<WriteBatch, DeskError> {
        let mut batch = WriteBatch::new();
        if self.account != self.loaded_account {
            batch.put(
                store::paths::participants(self.account.challenge_id.as_str()),
                self.account.participant_id.as_str(),
                &self.account,
            )?;
        }
        if self.wallet != self.loaded_wallet {
            batch.put(
                store::paths::wallets(self.wallet.owner.as_str()),
                self.wallet.id.as_str(),
                &self.wallet,
            )?;
        }
        for record in &self.liquidations {
            batch.put(
                store::paths::LIQUIDATION_LOG,
                new_document_id("liquidation_log"),
                record,
            )?;
        }
        Ok(batch)
    }
}

/// Result of a successful order entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenReceipt {
    pub index: usize,
    pub trade: Trade,
}

/// Dashboard snapshot for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeskStatus {
    pub key: AccountKey,
    pub summary: AccountSummary,
    pub gauge: RiskGauge,
    pub slots: SlotStatus,
    pub price: Option<f64>,
    /// Gross unrealized P&L of open positions at `price`.
    pub unrealized_pnl: Option<f64>,
}

/// What one price tick did to an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub price: f64,
    pub triggers: Vec<(usize, TriggerFlags)>,
    /// Closes executed because SL/TP was hit (auto-close only).
    pub auto_closed: Vec<CloseOutcome>,
}

/// Store-backed service for every wallet, challenge and account operation.
pub struct TradingDesk {
    config: DeskConfig,
    ledger: PositionLedger,
    store: Arc<dyn DocumentStore>,
    prices: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    account_locks: LockTable<AccountKey>,
    wallet_locks: LockTable<(UserId, WalletId)>,
    /// Serializes joins and challenge creation (challenge counters).
    admin_lock: Mutex<()>,
}

impl TradingDesk {
    /// Desk over `store`, pricing market orders from `prices`, on the system clock.
    pub fn new(
        config: DeskConfig,
        store: Arc<dyn DocumentStore>,
        prices: Arc<dyn PriceSource>,
    ) -> Self {
        let governor = RiskGovernor::new(config.risk.clone(), config.tokens.governance.clone());
        let ledger = PositionLedger::new(config.instrument_table(), governor);
        Self {
            config,
            ledger,
            store,
            prices,
            clock: Arc::new(SystemClock),
            account_locks: Mutex::new(HashMap::new()),
            wallet_locks: Mutex::new(HashMap::new()),
            admin_lock: Mutex::new(()),
        }
    }

    /// Replace the system clock, e.g. with a fixed one in tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Configuration the desk was built from.
    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    /// Ledger and, through it, the risk governor.
    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    fn governance_token(&self) -> &str {
        &self.config.tokens.governance
    }

    // ── Loading ──

    fn load_account(&self, key: &AccountKey) -> Result<Account, DeskError> {
        get_as::<Account>(
            self.store.as_ref(),
            &store::paths::participants(key.challenge_id.as_str()),
            key.participant_id.as_str(),
        )?
        .ok_or_else(|| DeskError::AccountNotFound(key.to_string()))
    }

    fn load_wallet(&self, user: &UserId, wallet_id: &WalletId) -> Result<Wallet, DeskError> {
        get_as::<Wallet>(
            self.store.as_ref(),
            &store::paths::wallets(user.as_str()),
            wallet_id.as_str(),
        )?
        .ok_or_else(|| DeskError::WalletNotFound(format!("{user}/{wallet_id}")))
    }

    fn load_challenge(&self, id: &ChallengeId) -> Result<Challenge, DeskError> {
        get_as::<Challenge>(self.store.as_ref(), store::paths::CHALLENGES, id.as_str())?
            .ok_or_else(|| LifecycleError::ChallengeNotFound(id.to_string()).into())
    }

    // ── Transactions ──

    /// Run `op` against a locked working copy and commit what changed.
    ///
    /// Errors from `op` discard the working copy.
    fn transact<R>(
        &self,
        key: &AccountKey,
        op: impl FnOnce(&mut Session) -> Result<R, DeskError>,
    ) -> Result<R, DeskError> {
        let account_lock = lock_for(&self.account_locks, key);
        let _account_guard = account_lock.lock();

        let account = self.load_account(key)?;
        let wallet_key = (account.user_id.clone(), account.wallet_id.clone());
        let wallet_lock = lock_for(&self.wallet_locks, &wallet_key);
        let _wallet_guard = wallet_lock.lock();
        let wallet = self.load_wallet(&account.user_id, &account.wallet_id)?;

        let mut session = Session::new(account, wallet);
        self.ledger
            .governor()
            .check_daily_reset(&mut session.account, self.clock.today());

        let result = op(&mut session)?;

        let batch = session.into_batch()?;
        if !batch.is_empty() {
            let ops = batch.len();
            self.store.commit(batch).map_err(|e| {
                warn!(account = %key, error = %e, "commit failed");
                DeskError::from(e)
            })?;
            debug!(account = %key, ops, "account committed");
        }
        Ok(result)
    }

    /// Locked read without commit.
    fn inspect<R>(
        &self,
        key: &AccountKey,
        op: impl FnOnce(&Account, &Wallet) -> Result<R, DeskError>,
    ) -> Result<R, DeskError> {
        let account_lock = lock_for(&self.account_locks, key);
        let _guard = account_lock.lock();
        let mut account = self.load_account(key)?;
        let wallet = self.load_wallet(&account.user_id, &account.wallet_id)?;
        self.ledger
            .governor()
            .check_daily_reset(&mut account, self.clock.today());
        op(&account, &wallet)
    }

    // ── Wallets and challenges ──

    /// New wallet for `user` seeded with `balances`.
    pub fn create_wallet(
        &self,
        user: &UserId,
        name: &str,
        balances: impl IntoIterator<Item = (String, f64)>,
    ) -> Result<Wallet, DeskError> {
        let mut wallet = Wallet::new(WalletId::new(new_document_id("wallets")), user.clone(), name);
        wallet.balances.extend(balances);
        let mut batch = WriteBatch::new();
        batch.put(store::paths::wallets(user.as_str()), wallet.id.as_str(), &wallet)?;
        self.store.commit(batch)?;
        info!(user = %user, wallet = %wallet.id, "wallet created");
        Ok(wallet)
    }

    pub fn wallet(&self, user: &UserId, wallet_id: &WalletId) -> Result<Wallet, DeskError> {
        self.load_wallet(user, wallet_id)
    }

    pub fn wallets(&self, user: &UserId) -> Result<Vec<Wallet>, DeskError> {
        Ok(list_as::<Wallet>(self.store.as_ref(), &store::paths::wallets(user.as_str()))?
            .into_iter()
            .map(|(_, w)| w)
            .collect())
    }

    /// New active challenge stamped with the configured defaults.
    pub fn create_challenge(&self, name: &str, description: Option<&str>) -> Result<Challenge, DeskError> {
        let _admin = self.admin_lock.lock();
        let challenge =
            lifecycle::new_challenge(&self.config.challenge, name, description, self.clock.now());
        let mut batch = WriteBatch::new();
        batch.put(store::paths::CHALLENGES, challenge.id.as_str(), &challenge)?;
        self.store.commit(batch)?;
        info!(challenge = %challenge.id, name, "challenge created");
        Ok(challenge)
    }

    pub fn challenge(&self, id: &ChallengeId) -> Result<Challenge, DeskError> {
        self.load_challenge(id)
    }

    /// Challenges still accepting participants.
    pub fn list_active_challenges(&self) -> Result<Vec<Challenge>, DeskError> {
        let mut challenges: Vec<Challenge> =
            list_as::<Challenge>(self.store.as_ref(), store::paths::CHALLENGES)?
                .into_iter()
                .map(|(_, c)| c)
                .filter(Challenge::is_active)
                .collect();
        challenges.sort_by_key(|c| c.created_at);
        Ok(challenges)
    }

    /// Entry fee and starting account a join would produce. Nothing is written.
    pub fn preview_join(
        &self,
        user: &UserId,
        wallet_id: &WalletId,
        challenge_id: &ChallengeId,
    ) -> Result<JoinPreview, DeskError> {
        let challenge = self.load_challenge(challenge_id)?;
        let wallet = self.load_wallet(user, wallet_id)?;
        let token = self.governance_token();
        Ok(JoinPreview::of(&challenge, token, wallet.balance(token)))
    }

    /// Pay the entry fee and create the participation account, all in one commit.
    pub fn join_challenge(
        &self,
        user: &UserId,
        wallet_id: &WalletId,
        challenge_id: &ChallengeId,
    ) -> Result<Account, DeskError> {
        let _admin = self.admin_lock.lock();
        let wallet_lock = lock_for(&self.wallet_locks, &(user.clone(), wallet_id.clone()));
        let _wallet_guard = wallet_lock.lock();

        let mut challenge = self.load_challenge(challenge_id)?;
        let mut wallet = self.load_wallet(user, wallet_id)?;
        let pool_id = self.config.tokens.pool_wallet.as_str();
        let mut pool = get_as::<Wallet>(self.store.as_ref(), store::paths::SYSTEM_WALLETS, pool_id)?
            .unwrap_or_else(|| lifecycle::new_pool_wallet(&self.config.tokens));

        let enrollment = lifecycle::enroll(
            &mut challenge,
            &mut wallet,
            &mut pool,
            &self.config.tokens.governance,
            self.clock.now(),
        )?;

        let account = enrollment.account;
        let mut batch = WriteBatch::new();
        batch.put(store::paths::CHALLENGES, challenge.id.as_str(), &challenge)?;
        batch.put(store::paths::wallets(user.as_str()), wallet.id.as_str(), &wallet)?;
        batch.put(store::paths::SYSTEM_WALLETS, pool_id, &pool)?;
        batch.put(
            store::paths::participants(challenge.id.as_str()),
            account.participant_id.as_str(),
            &account,
        )?;
        batch.put(
            store::paths::TRANSACTIONS,
            new_document_id("transactions"),
            &enrollment.transaction,
        )?;
        self.store.commit(batch)?;
        Ok(account)
    }

    /// First active participation of `user` across active challenges.
    pub fn find_participation(&self, user: &UserId) -> Result<Option<Account>, DeskError> {
        for challenge in self.list_active_challenges()? {
            let accounts: Vec<Account> = list_as::<Account>(
                self.store.as_ref(),
                &store::paths::participants(challenge.id.as_str()),
            )?
            .into_iter()
            .map(|(_, a)| a)
            .collect();
            if let Some(account) = lifecycle::pick_participation(&accounts, user) {
                return Ok(Some(account.clone()));
            }
        }
        Ok(None)
    }

    /// Current account document. Read-only.
    pub fn account(&self, key: &AccountKey) -> Result<Account, DeskError> {
        self.inspect(key, |account, _| Ok(account.clone()))
    }

    // ── Trading ──

    /// Live price for MARKET entries. Resting orders are priced by their own
    /// levels, so the feed is not read for them.
    fn entry_quote(&self, request: &OrderRequest) -> Option<f64> {
        match request.kind {
            OrderKind::Market => self.prices.current_price(),
            OrderKind::Limit | OrderKind::Stop | OrderKind::StopLimit => None,
        }
    }

    /// Dry run of `open_trade`: same checks, nothing written.
    pub fn preview_open(&self, key: &AccountKey, request: &OrderRequest) -> Result<OpenPreview, DeskError> {
        let price = self.entry_quote(request);
        self.inspect(key, |account, wallet| {
            let tokens = wallet.balance(self.governance_token());
            Ok(self
                .ledger
                .preview_open(account, tokens, request, price, self.clock.now())?)
        })
    }

    /// Enter an order sized by the wallet's current slot count.
    pub fn open_trade(&self, key: &AccountKey, request: &OrderRequest) -> Result<OpenReceipt, DeskError> {
        self.transact(key, |s| {
            let price = self.entry_quote(request);
            let tokens = s.wallet.balance(self.governance_token());
            let index =
                self.ledger
                    .open_trade(&mut s.account, tokens, request, price, self.clock.now())?;
            Ok(OpenReceipt { index, trade: s.account.trades[index].clone() })
        })
    }

    /// One-click market order with the default bracket.
    pub fn quick_trade(&self, key: &AccountKey, side: Side, instrument: &str) -> Result<OpenReceipt, DeskError> {
        let request = OrderRequest::quick(side, instrument, &self.config.triggers);
        self.open_trade(key, &request)
    }

    fn require_price(&self) -> Result<f64, TradeError> {
        self.prices.current_price().ok_or(TradeError::PriceUnavailable)
    }

    /// P&L a close at the current price would realize.
    pub fn preview_close(&self, key: &AccountKey, index: usize) -> Result<ClosePreview, DeskError> {
        self.inspect(key, |account, _| {
            let price = self.require_price()?;
            Ok(self.ledger.preview_close(account, index, price)?)
        })
    }

    /// Close one open trade at the current price and settle it.
    pub fn close_position(&self, key: &AccountKey, index: usize) -> Result<CloseOutcome, DeskError> {
        self.transact(key, |s| {
            let price = self.require_price()?;
            let outcome = self.ledger.close_position(
                &mut s.account,
                &mut s.wallet,
                index,
                price,
                self.clock.now(),
            )?;
            s.record(&outcome.settlement);
            Ok(outcome)
        })
    }

    /// Close every open trade at one price with a single settlement pass.
    pub fn close_all_open_positions(&self, key: &AccountKey) -> Result<CloseOutcome, DeskError> {
        self.transact(key, |s| {
            let price = self.require_price()?;
            let outcome = self.ledger.close_all_open_positions(
                &mut s.account,
                &mut s.wallet,
                price,
                self.clock.now(),
            )?;
            s.record(&outcome.settlement);
            Ok(outcome)
        })
    }

    /// Replace the SL/TP levels of an open trade.
    pub fn modify_position(
        &self,
        key: &AccountKey,
        index: usize,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<(), DeskError> {
        self.transact(key, |s| {
            Ok(self
                .ledger
                .modify_position(&mut s.account, index, stop_loss, take_profit)?)
        })
    }

    /// Withdraw a pending order and release its margin.
    pub fn cancel_order(&self, key: &AccountKey, index: usize) -> Result<f64, DeskError> {
        self.transact(key, |s| Ok(self.ledger.cancel_order(&mut s.account, index, self.clock.now())?))
    }

    /// Open positions marked at the current price.
    pub fn positions(&self, key: &AccountKey) -> Result<Vec<PositionView>, DeskError> {
        self.inspect(key, |account, _| {
            let price = self.require_price()?;
            Ok(self.ledger.positions(account, price))
        })
    }

    /// Closed trades, newest first.
    pub fn history(&self, key: &AccountKey) -> Result<Vec<Trade>, DeskError> {
        self.inspect(key, |account, _| Ok(account.history().into_iter().cloned().collect()))
    }

    /// Dashboard refresh. Persists a pending daily reset.
    pub fn status(&self, key: &AccountKey) -> Result<DeskStatus, DeskError> {
        self.transact(key, |s| {
            let price = self.prices.current_price();
            let tokens = s.wallet.balance(self.governance_token());
            let unrealized_pnl = price.map(|p| {
                s.account
                    .open_trades()
                    .map(|(_, t)| t.gross_pnl(p))
                    .sum::<f64>()
            });
            Ok(DeskStatus {
                key: key.clone(),
                summary: AccountSummary::of(&s.account),
                gauge: RiskGauge::compute(self.ledger.governor(), &s.account, tokens),
                slots: SlotStatus::from_balance(tokens),
                price,
                unrealized_pnl,
            })
        })
    }

    /// Evaluate SL/TP at the current price; with auto-close enabled, close
    /// every hit trade in insertion order, each with its own settlement.
    pub fn on_price_tick(&self, key: &AccountKey) -> Result<TickReport, DeskError> {
        self.transact(key, |s| {
            let price = self.require_price()?;
            let triggers = self.ledger.evaluate_triggers(&s.account, price);
            let mut auto_closed = Vec::new();
            if self.config.triggers.auto_close && s.account.is_active() {
                for (index, flags) in triggers.iter().filter(|(_, f)| f.any()) {
                    info!(account = %key, index, sl_hit = flags.sl_hit, tp_hit = flags.tp_hit, "bracket hit, closing");
                    let outcome = self.ledger.close_position(
                        &mut s.account,
                        &mut s.wallet,
                        *index,
                        price,
                        self.clock.now(),
                    )?;
                    s.record(&outcome.settlement);
                    auto_closed.push(outcome);
                }
            }
            Ok(TickReport { price, triggers, auto_closed })
        })
    }

    /// End-of-day snapshot of total P&L and reward eligibility.
    pub fn end_of_day(&self, key: &AccountKey) -> Result<EodReport, DeskError> {
        self.transact(key, |s| Ok(lifecycle::process_end_of_day(&mut s.account, self.clock.now())))
    }

    /// Retry a liquidation that was blocked for lack of tokens.
    pub fn resolve_liquidation(&self, key: &AccountKey) -> Result<LiquidationOutcome, DeskError> {
        self.transact(key, |s| {
            let outcome = self.ledger.governor().check_cumulative_liquidation(
                &mut s.account,
                &mut s.wallet,
                self.clock.now(),
            );
            if let LiquidationOutcome::Liquidated { record, .. } = &outcome {
                s.liquidations.push(record.clone());
            }
            Ok(outcome)
        })
    }

    /// End a flat account's participation.
    pub fn exit_challenge(&self, key: &AccountKey) -> Result<(), DeskError> {
        self.transact(key, |s| Ok(lifecycle::exit_challenge(&mut s.account)?))
    }
}
