//! Challenge lifecycle through the desk: join atomicity, lookup, end of day.

mod common;

use chrono::Duration;
use common::Harness;
use propdesk_core::domain::{
    Challenge, ChallengeId, ChallengeStatus, Side, TransactionKind, TransactionRecord, UserId, Wallet,
};
use propdesk_core::error::{DeskError, LifecycleError};
use propdesk_core::ledger::OrderRequest;
use propdesk_core::store::{get_as, list_as, paths, DocumentStore, WriteBatch};
use propdesk_core::DeskConfig;

fn transactions(h: &Harness) -> Vec<TransactionRecord> {
    list_as::<TransactionRecord>(h.store.as_ref(), paths::TRANSACTIONS)
        .unwrap()
        .into_iter()
        .map(|(_, t)| t)
        .collect()
}

fn pool(h: &Harness) -> Option<Wallet> {
    get_as::<Wallet>(
        h.store.as_ref(),
        paths::SYSTEM_WALLETS,
        &h.desk.config().tokens.pool_wallet,
    )
    .unwrap()
}

// ── Join ────────────────────────────────────────────────────────────

#[test]
fn join_moves_the_fee_and_writes_every_document() {
    let h = Harness::new(DeskConfig::default());
    let wallet = h.wallet_with("alice", 5.0);

    let preview = h
        .desk
        .preview_join(&wallet.owner, &wallet.id, &h.challenge.id)
        .unwrap();
    assert_eq!(preview.entry_fee, 1.0);
    assert_eq!(preview.token_balance, 5.0);
    assert!(preview.to_string().contains("NQ 100K"));

    let account = h
        .desk
        .join_challenge(&wallet.owner, &wallet.id, &h.challenge.id)
        .unwrap();

    assert_eq!(h.tokens(&wallet), 4.0);
    assert_eq!(pool(&h).map(|p| p.balance("CRNY")), Some(1.0));

    let challenge = h.desk.challenge(&h.challenge.id).unwrap();
    assert_eq!(challenge.participants, 1);
    assert_eq!(challenge.total_pool, 1.0);

    let txs = transactions(&h);
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].kind, TransactionKind::ChallengeEntry);
    assert_eq!(txs[0].amount, 1.0);
    assert_eq!(txs[0].from, "alice");
    assert_eq!(txs[0].challenge_id.as_ref(), Some(&h.challenge.id));

    let stored = h.desk.account(&account.key()).unwrap();
    assert_eq!(stored.current_balance, 100_000.0);
    assert_eq!(stored.initial_balance, 100_000.0);
    assert_eq!(stored.max_contracts, 7);
    assert_eq!(stored.last_daily_reset, Some(common::start().date_naive()));
    assert!(stored.trades.is_empty());
}

#[test]
fn second_join_accumulates_the_pool() {
    let h = Harness::new(DeskConfig::default());
    h.join("alice", 1.0);
    h.join("bob", 1.0);
    let challenge = h.desk.challenge(&h.challenge.id).unwrap();
    assert_eq!(challenge.participants, 2);
    assert_eq!(challenge.total_pool, 2.0);
    assert_eq!(pool(&h).map(|p| p.balance("CRNY")), Some(2.0));
    assert_eq!(transactions(&h).len(), 2);
}

#[test]
fn short_wallet_is_refused_without_writes() {
    let h = Harness::new(DeskConfig::default());
    let wallet = h.wallet_with("alice", 0.5);
    let before = h.store.snapshot();

    let err = h
        .desk
        .join_challenge(&wallet.owner, &wallet.id, &h.challenge.id)
        .unwrap_err();
    assert!(matches!(
        err,
        DeskError::Lifecycle(LifecycleError::InsufficientEntryFee { required, available })
            if required == 1.0 && available == 0.5
    ));
    assert_eq!(h.store.snapshot(), before);
}

#[test]
fn failed_join_commit_writes_nothing() {
    let h = Harness::new(DeskConfig::default());
    let wallet = h.wallet_with("alice", 5.0);
    let before = h.store.snapshot();

    h.store.fail_commits(true);
    let err = h
        .desk
        .join_challenge(&wallet.owner, &wallet.id, &h.challenge.id)
        .unwrap_err();
    assert!(matches!(err, DeskError::Store(_)));
    h.store.fail_commits(false);

    assert_eq!(h.store.snapshot(), before);
    assert!(h.desk.find_participation(&wallet.owner).unwrap().is_none());
}

#[test]
fn closed_and_unknown_challenges_are_refused() {
    let h = Harness::new(DeskConfig::default());
    let wallet = h.wallet_with("alice", 5.0);

    let err = h
        .desk
        .join_challenge(&wallet.owner, &wallet.id, &ChallengeId::new("missing"))
        .unwrap_err();
    assert!(matches!(err, DeskError::Lifecycle(LifecycleError::ChallengeNotFound(_))));

    let mut closed: Challenge = h.desk.challenge(&h.challenge.id).unwrap();
    closed.status = ChallengeStatus::Closed;
    let mut batch = WriteBatch::new();
    batch.put(paths::CHALLENGES, closed.id.as_str(), &closed).unwrap();
    h.store.commit(batch).unwrap();

    let err = h
        .desk
        .join_challenge(&wallet.owner, &wallet.id, &h.challenge.id)
        .unwrap_err();
    assert!(matches!(err, DeskError::Lifecycle(LifecycleError::ChallengeInactive(_))));
    assert!(h.desk.list_active_challenges().unwrap().is_empty());
    assert_eq!(h.tokens(&wallet), 5.0);
}

// ── Lookup ──────────────────────────────────────────────────────────

#[test]
fn active_challenges_are_listed_oldest_first() {
    let h = Harness::new(DeskConfig::default());
    h.clock.advance(Duration::minutes(5));
    let later = h.desk.create_challenge("NQ 50K", Some("half size")).unwrap();

    let names: Vec<String> = h
        .desk
        .list_active_challenges()
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["NQ 100K".to_string(), "NQ 50K".to_string()]);
    assert_eq!(later.description, "half size");
    assert_eq!(h.challenge.description, h.desk.config().challenge.description);
}

#[test]
fn participation_lookup_is_per_user() {
    let h = Harness::new(DeskConfig::default());
    let (key, _) = h.join("alice", 1.0);

    let found = h.desk.find_participation(&UserId::new("alice")).unwrap();
    assert_eq!(found.map(|a| a.key()), Some(key));
    assert!(h.desk.find_participation(&UserId::new("bob")).unwrap().is_none());
}

// ── End of day ──────────────────────────────────────────────────────

#[test]
fn end_of_day_snapshots_total_pnl() {
    let h = Harness::new(DeskConfig::default());
    let (key, _) = h.join("alice", 1.0);
    h.desk
        .open_trade(&key, &OrderRequest::market(Side::Buy, "MNQ"))
        .unwrap();
    h.prices.set(20_030.0);
    h.desk.close_position(&key, 0).unwrap();

    h.clock.advance(Duration::hours(8));
    let report = h.desk.end_of_day(&key).unwrap();
    assert_eq!(report.total_pnl, 58.0);
    assert!(report.reward_eligible);
    assert_eq!(report.at, common::start() + Duration::hours(8));

    let account = h.desk.account(&key).unwrap();
    assert_eq!(account.daily_pnl, 58.0);
    assert_eq!(account.last_eod, Some(report.at));
}
