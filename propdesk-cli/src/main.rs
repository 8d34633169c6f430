//! PropDesk CLI: wallets, challenges and NQ/MNQ trading over a JSON-file store.
//!
//! Commands:
//! - `wallet create|show`: manage token wallets
//! - `challenge create|list|join|exit`: challenge administration and participation
//! - `trade open|quick|close|close-all|modify|cancel`: order entry and exits
//! - `positions`, `history`, `status`: account views
//! - `eod`, `resolve`: end-of-day snapshot, retry of a blocked liquidation
//! - `price`, `watch`: price feed and SL/TP ticks

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use propdesk_core::config::{FeedConfig, FeedMode};
use propdesk_core::domain::{AccountKey, ChallengeId, Side, UserId, WalletId};
use propdesk_core::feed::{
    spawn_line_reader, spawn_poller, synthetic_history, AggregateStreamFeed, CircuitBreaker,
    FeedAdapter, PriceFeed, YahooQuoteFeed,
};
use propdesk_core::ledger::OrderRequest;
use propdesk_core::store::JsonFileStore;
use propdesk_core::{DeskConfig, TradingDesk};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "propdesk",
    about = "PropDesk CLI: simulated NQ futures prop-trading challenges"
)]
struct Cli {
    /// JSON database file. Defaults to <data dir>/propdesk/db.json.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// TOML config file. Built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Errors only.
    #[arg(short, long, global = true, default_value_t = false)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Token wallets.
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },
    /// Challenge administration and participation.
    Challenge {
        #[command(subcommand)]
        action: ChallengeAction,
    },
    /// Order entry and exits.
    Trade {
        #[command(subcommand)]
        action: TradeAction,
    },
    /// Open positions marked at the current price.
    Positions {
        #[arg(long)]
        user: String,
    },
    /// Closed trades, newest first.
    History {
        #[arg(long)]
        user: String,

        /// Also write the history to this CSV file.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Balance, risk gauges and slot status.
    Status {
        #[arg(long)]
        user: String,
    },
    /// Snapshot total P&L as the day's P&L.
    Eod {
        #[arg(long)]
        user: String,
    },
    /// Retry a liquidation that was blocked for lack of tokens.
    Resolve {
        #[arg(long)]
        user: String,
    },
    /// Fetch the current price once.
    Price {
        /// Print recent 5-minute candles instead.
        #[arg(long, default_value_t = false)]
        history: bool,

        /// In stream mode, read frames from stdin instead of the websocket.
        #[arg(long, default_value_t = false)]
        frames_from_stdin: bool,
    },
    /// Poll the feed and evaluate SL/TP on every tick.
    Watch {
        #[arg(long)]
        user: String,

        #[arg(long, default_value_t = 10)]
        ticks: u32,

        /// In stream mode, read frames from stdin instead of the websocket.
        #[arg(long, default_value_t = false)]
        frames_from_stdin: bool,
    },
}

#[derive(Subcommand)]
enum WalletAction {
    /// Create a wallet holding governance tokens.
    Create {
        #[arg(long)]
        user: String,

        #[arg(long, default_value = "main")]
        name: String,

        /// Initial governance token balance.
        #[arg(long, default_value_t = 10.0)]
        tokens: f64,
    },
    /// List a user's wallets.
    Show {
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand)]
enum ChallengeAction {
    /// Create a challenge from the configured defaults.
    Create {
        name: String,

        #[arg(long)]
        description: Option<String>,
    },
    /// List active challenges, oldest first.
    List,
    /// Pay the entry fee and join.
    Join {
        #[arg(long)]
        user: String,

        #[arg(long)]
        wallet: String,

        #[arg(long)]
        challenge: String,

        /// Skip the confirmation prompt.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Leave the current challenge (no open or pending trades allowed).
    Exit {
        #[arg(long)]
        user: String,

        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum TradeAction {
    /// Open a trade sized by the wallet's slot count.
    Open {
        #[arg(long)]
        user: String,

        #[arg(value_enum)]
        side: SideArg,

        #[arg(long, default_value = "NQ")]
        instrument: String,

        #[arg(long, value_enum, default_value = "market")]
        kind: KindArg,

        /// Limit price (LIMIT, STOP_LIMIT).
        #[arg(long)]
        limit: Option<f64>,

        /// Stop trigger (STOP, STOP_LIMIT).
        #[arg(long)]
        stop: Option<f64>,

        /// Stop-loss distance in points.
        #[arg(long)]
        sl: Option<f64>,

        /// Take-profit distance in points.
        #[arg(long)]
        tp: Option<f64>,

        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Market order with the default bracket.
    Quick {
        #[arg(long)]
        user: String,

        #[arg(value_enum)]
        side: SideArg,

        #[arg(long, default_value = "NQ")]
        instrument: String,

        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Close one open trade at the current price.
    Close {
        #[arg(long)]
        user: String,

        index: usize,

        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Close every open trade at one price.
    CloseAll {
        #[arg(long)]
        user: String,

        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Replace the SL/TP levels of an open trade (omitted levels are removed).
    Modify {
        #[arg(long)]
        user: String,

        index: usize,

        #[arg(long)]
        sl: Option<f64>,

        #[arg(long)]
        tp: Option<f64>,
    },
    /// Cancel a pending order and release its margin.
    Cancel {
        #[arg(long)]
        user: String,

        index: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SideArg {
    Buy,
    Sell,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Buy => Side::Buy,
            SideArg::Sell => Side::Sell,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Market,
    Limit,
    Stop,
    StopLimit,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => DeskConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DeskConfig::default(),
    };
    let db = cli.db.clone().unwrap_or_else(default_db_path);

    match cli.command {
        Commands::Wallet { action } => run_wallet(&offline_desk(&db, &config)?, action),
        Commands::Challenge { action } => run_challenge(&offline_desk(&db, &config)?, action),
        Commands::Trade { action } => run_trade(&priced_desk(&db, &config)?, action),
        Commands::Positions { user } => run_positions(&priced_desk(&db, &config)?, &user),
        Commands::History { user, csv } => run_history(&offline_desk(&db, &config)?, &user, csv),
        Commands::Status { user } => run_status(&priced_desk(&db, &config)?, &user),
        Commands::Eod { user } => {
            let desk = offline_desk(&db, &config)?;
            let report = desk.end_of_day(&participation(&desk, &user)?)?;
            println!(
                "EOD {}: total P&L {:+.2}{}",
                report.at.format("%Y-%m-%d %H:%M UTC"),
                report.total_pnl,
                if report.reward_eligible { " (reward eligible)" } else { "" }
            );
            Ok(())
        }
        Commands::Resolve { user } => run_resolve(&offline_desk(&db, &config)?, &user),
        Commands::Price { history, frames_from_stdin } => {
            run_price(&config, history, StreamSource::pick(frames_from_stdin))
        }
        Commands::Watch { user, ticks, frames_from_stdin } => {
            run_watch(&db, &config, &user, ticks, StreamSource::pick(frames_from_stdin))
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("logging already initialized");
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("propdesk")
        .join("db.json")
}

// ── Wiring ──

/// Where stream-mode frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamSource {
    /// One-shot commands: no transport, simulated fallback.
    Off,
    Socket,
    Stdin,
}

impl StreamSource {
    fn pick(frames_from_stdin: bool) -> Self {
        if frames_from_stdin {
            StreamSource::Stdin
        } else {
            StreamSource::Socket
        }
    }
}

/// Feed adapter for the configured mode and stream source.
fn price_feed(config: &FeedConfig, stream: StreamSource) -> Result<Arc<FeedAdapter>> {
    let adapter = match (config.mode, stream) {
        (FeedMode::Stream, StreamSource::Off) => FeedAdapter::new(None, config),
        (FeedMode::Stream, StreamSource::Stdin) => {
            let (frames, _reader) = spawn_line_reader(BufReader::new(std::io::stdin()));
            let source: Box<dyn PriceFeed> = Box::new(AggregateStreamFeed::new(frames));
            FeedAdapter::new(Some(source), config)
        }
        _ => FeedAdapter::from_config(config)?,
    };
    Ok(Arc::new(adapter))
}

fn open_desk(db: &Path, config: &DeskConfig, feed: Arc<FeedAdapter>) -> Result<TradingDesk> {
    let store = JsonFileStore::open(db)
        .with_context(|| format!("opening database {}", db.display()))?;
    Ok(TradingDesk::new(config.clone(), Arc::new(store), feed))
}

/// Desk whose price cell stays empty: for commands that never price a trade.
fn offline_desk(db: &Path, config: &DeskConfig) -> Result<TradingDesk> {
    open_desk(db, config, price_feed(&config.feed, StreamSource::Off)?)
}

/// Desk with one fresh price pulled from the feed.
fn priced_desk(db: &Path, config: &DeskConfig) -> Result<TradingDesk> {
    let feed = price_feed(&config.feed, StreamSource::Off)?;
    let update = feed.refresh();
    tracing::info!(price = update.price, origin = ?update.origin, "price refreshed");
    open_desk(db, config, feed)
}

fn participation(desk: &TradingDesk, user: &str) -> Result<AccountKey> {
    desk.find_participation(&UserId::new(user))?
        .map(|account| account.key())
        .ok_or_else(|| anyhow!("user '{user}' has no active challenge participation"))
}

/// Print `summary` and ask for a y/N answer unless `yes` is set.
fn confirm(summary: &str, yes: bool) -> Result<bool> {
    print!("{summary}");
    if yes {
        return Ok(true);
    }
    print!("confirm? [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    let accepted = matches!(answer.trim(), "y" | "Y" | "yes");
    if !accepted {
        println!("cancelled");
    }
    Ok(accepted)
}

// ── Wallets and challenges ──

fn run_wallet(desk: &TradingDesk, action: WalletAction) -> Result<()> {
    let token = desk.config().tokens.governance.clone();
    match action {
        WalletAction::Create { user, name, tokens } => {
            let wallet = desk.create_wallet(&UserId::new(user), &name, [(token.clone(), tokens)])?;
            println!("wallet {} ({}) holds {} {token}", wallet.id, wallet.name, tokens);
        }
        WalletAction::Show { user } => {
            let wallets = desk.wallets(&UserId::new(user.as_str()))?;
            if wallets.is_empty() {
                println!("{user} has no wallets");
            }
            for wallet in wallets {
                let balances: Vec<String> = wallet
                    .balances
                    .iter()
                    .map(|(t, amount)| format!("{amount} {t}"))
                    .collect();
                println!("{}  {:<12} {}", wallet.id, wallet.name, balances.join(", "));
            }
        }
    }
    Ok(())
}

fn run_challenge(desk: &TradingDesk, action: ChallengeAction) -> Result<()> {
    match action {
        ChallengeAction::Create { name, description } => {
            let challenge = desk.create_challenge(&name, description.as_deref())?;
            println!("challenge {} created: {}", challenge.id, challenge.name);
        }
        ChallengeAction::List => {
            let challenges = desk.list_active_challenges()?;
            if challenges.is_empty() {
                println!("no active challenges");
            }
            for c in challenges {
                println!(
                    "{}  {:<16} fee {} | ${:.0} | {} participants | pool {}",
                    c.id, c.name, c.entry_fee, c.initial_balance, c.participants, c.total_pool
                );
            }
        }
        ChallengeAction::Join { user, wallet, challenge, yes } => {
            let user = UserId::new(user);
            let wallet = WalletId::new(wallet);
            let challenge = ChallengeId::new(challenge);
            let preview = desk.preview_join(&user, &wallet, &challenge)?;
            if !confirm(&preview.to_string(), yes)? {
                return Ok(());
            }
            let account = desk.join_challenge(&user, &wallet, &challenge)?;
            println!("joined: participant {}", account.participant_id);
        }
        ChallengeAction::Exit { user, yes } => {
            let key = participation(desk, &user)?;
            if !confirm(&format!("leave challenge {}\n", key.challenge_id), yes)? {
                return Ok(());
            }
            desk.exit_challenge(&key)?;
            println!("left challenge {}", key.challenge_id);
        }
    }
    Ok(())
}

// ── Trading ──

fn order_request(
    side: Side,
    instrument: String,
    kind: KindArg,
    limit: Option<f64>,
    stop: Option<f64>,
) -> Result<OrderRequest> {
    let request = match kind {
        KindArg::Market => OrderRequest::market(side, instrument),
        KindArg::Limit => {
            let Some(limit) = limit else { bail!("--limit is required for LIMIT orders") };
            OrderRequest::limit(side, instrument, limit)
        }
        KindArg::Stop => {
            let Some(stop) = stop else { bail!("--stop is required for STOP orders") };
            OrderRequest::stop(side, instrument, stop)
        }
        KindArg::StopLimit => match (stop, limit) {
            (Some(stop), Some(limit)) => OrderRequest::stop_limit(side, instrument, stop, limit),
            _ => bail!("--stop and --limit are required for STOP_LIMIT orders"),
        },
    };
    Ok(request)
}

fn submit(desk: &TradingDesk, key: &AccountKey, request: &OrderRequest, yes: bool) -> Result<()> {
    let preview = desk.preview_open(key, request)?;
    if !confirm(&preview.to_string(), yes)? {
        return Ok(());
    }
    let receipt = desk.open_trade(key, request)?;
    println!(
        "#{} {} {} {} x {} @ {:.2} ({})",
        receipt.index,
        receipt.trade.status,
        receipt.trade.side,
        receipt.trade.instrument,
        receipt.trade.contracts,
        receipt.trade.entry_price,
        receipt.trade.order_kind
    );
    Ok(())
}

fn run_trade(desk: &TradingDesk, action: TradeAction) -> Result<()> {
    match action {
        TradeAction::Open { user, side, instrument, kind, limit, stop, sl, tp, yes } => {
            let key = participation(desk, &user)?;
            let request = order_request(side.into(), instrument, kind, limit, stop)?
                .with_bracket(sl, tp);
            submit(desk, &key, &request, yes)
        }
        TradeAction::Quick { user, side, instrument, yes } => {
            let key = participation(desk, &user)?;
            let request = OrderRequest::quick(side.into(), instrument, &desk.config().triggers);
            submit(desk, &key, &request, yes)
        }
        TradeAction::Close { user, index, yes } => {
            let key = participation(desk, &user)?;
            let preview = desk.preview_close(&key, index)?;
            if !confirm(&preview.to_string(), yes)? {
                return Ok(());
            }
            let outcome = desk.close_position(&key, index)?;
            println!("closed #{index}: net {:+.2}", outcome.total_net_pnl);
            print_settlement(&outcome.settlement);
            Ok(())
        }
        TradeAction::CloseAll { user, yes } => {
            let key = participation(desk, &user)?;
            let open = desk.positions(&key)?;
            let summary = format!("close all {} open positions at market\n", open.len());
            if !confirm(&summary, yes)? {
                return Ok(());
            }
            let outcome = desk.close_all_open_positions(&key)?;
            for closed in &outcome.closed {
                println!("closed #{} @ {:.2}: net {:+.2}", closed.index, closed.exit_price, closed.net_pnl);
            }
            println!("total net {:+.2}", outcome.total_net_pnl);
            print_settlement(&outcome.settlement);
            Ok(())
        }
        TradeAction::Modify { user, index, sl, tp } => {
            let key = participation(desk, &user)?;
            desk.modify_position(&key, index, sl, tp)?;
            println!("#{index} bracket set: SL {} / TP {}", level(sl), level(tp));
            Ok(())
        }
        TradeAction::Cancel { user, index } => {
            let key = participation(desk, &user)?;
            let released = desk.cancel_order(&key, index)?;
            println!("#{index} cancelled, ${released:.2} margin released");
            Ok(())
        }
    }
}

fn level(price: Option<f64>) -> String {
    price.map_or_else(|| "-".to_string(), |p| format!("{p:.2}"))
}

fn print_settlement(settlement: &propdesk_core::risk::SettlementReport) {
    if settlement.daily_locked() {
        println!("daily loss limit reached: trading locked until the next UTC day");
    }
    if let Some(record) = settlement.liquidation() {
        println!(
            "LIQUIDATED: {} token burned, {} remaining, account reset",
            record.tokens_burned, record.remaining_tokens
        );
    }
    if settlement.blocked() {
        println!("cumulative loss limit reached without tokens to burn: trading blocked");
    }
}

// ── Views ──

fn run_positions(desk: &TradingDesk, user: &str) -> Result<()> {
    let key = participation(desk, user)?;
    let positions = desk.positions(&key)?;
    if positions.is_empty() {
        println!("no open positions");
    }
    for p in positions {
        let hit = match (p.triggers.sl_hit, p.triggers.tp_hit) {
            (true, _) => " SL HIT",
            (_, true) => " TP HIT",
            _ => "",
        };
        println!(
            "#{:<3} {} {} x {} @ {:.2} | now {:.2} | {:+.2} ({:+.2}%) | SL {} TP {}{hit}",
            p.index,
            p.side,
            p.instrument,
            p.contracts,
            p.entry_price,
            p.current_price,
            p.gross_pnl,
            p.pnl_pct_of_margin,
            level(p.stop_loss),
            level(p.take_profit)
        );
    }
    Ok(())
}

fn run_history(desk: &TradingDesk, user: &str, csv_path: Option<PathBuf>) -> Result<()> {
    let key = participation(desk, user)?;
    let trades = desk.history(&key)?;
    for t in &trades {
        println!(
            "{} {} {} x {} {:.2} -> {} net {}",
            t.closed_at.map_or_else(String::new, |c| c.format("%Y-%m-%d %H:%M").to_string()),
            t.side,
            t.instrument,
            t.contracts,
            t.entry_price,
            level(t.exit_price),
            t.pnl.map_or_else(|| "-".to_string(), |p| format!("{p:+.2}"))
        );
    }
    if let Some(path) = csv_path {
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(["closed_at", "side", "instrument", "contracts", "entry", "exit", "net_pnl"])?;
        for t in &trades {
            writer.write_record([
                t.closed_at.map(|c| c.to_rfc3339()).unwrap_or_default(),
                t.side.to_string(),
                t.instrument.clone(),
                t.contracts.to_string(),
                t.entry_price.to_string(),
                t.exit_price.map(|p| p.to_string()).unwrap_or_default(),
                t.pnl.map(|p| p.to_string()).unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
        println!("{} trades written to {}", trades.len(), path.display());
    }
    Ok(())
}

fn run_status(desk: &TradingDesk, user: &str) -> Result<()> {
    let key = participation(desk, user)?;
    let status = desk.status(&key)?;
    let s = &status.summary;
    let g = &status.gauge;
    println!("account {}", status.key);
    println!("  balance:    ${:.2} ({:+.2}%)", s.balance, s.profit_pct);
    println!("  daily P&L:  {:+.2} ({:.0}% of limit, {:?})", s.daily_pnl, g.daily.used_pct, g.daily.level);
    println!("  total P&L:  {:+.2} ({:.0}% of limit, {:?})", s.cumulative_pnl, g.cumulative.used_pct, g.cumulative.level);
    println!("  positions:  {} open, {} pending", s.open_positions, s.pending_orders);
    println!(
        "  slots:      {} ({} tokens){}",
        status.slots.slots,
        status.slots.tokens,
        if status.slots.active { "" } else { " - buy tokens to trade" }
    );
    if let (Some(price), Some(unrealized)) = (status.price, status.unrealized_pnl) {
        println!("  price:      {price:.2} (unrealized {unrealized:+.2})");
    }
    if g.daily_locked {
        println!("  DAILY LOCKED until the next UTC day");
    }
    if g.trading_blocked {
        println!("  TRADING BLOCKED: acquire tokens, then run `propdesk resolve`");
    }
    println!("  trading:    {}", if g.trading_enabled { "enabled" } else { "disabled" });
    Ok(())
}

fn run_resolve(desk: &TradingDesk, user: &str) -> Result<()> {
    use propdesk_core::risk::LiquidationOutcome;
    let key = participation(desk, user)?;
    match desk.resolve_liquidation(&key)? {
        LiquidationOutcome::NotTriggered => println!("nothing to resolve"),
        LiquidationOutcome::Liquidated { record, slots } => println!(
            "liquidated: {} token burned, {} remaining ({slots} slots), account reset",
            record.tokens_burned, record.remaining_tokens
        ),
        LiquidationOutcome::Blocked { required, available } => {
            println!("still blocked: {required} tokens needed, {available} held")
        }
    }
    Ok(())
}

// ── Price ──

fn run_price(config: &DeskConfig, history: bool, stream: StreamSource) -> Result<()> {
    let feed = &config.feed;
    if history {
        let candles = YahooQuoteFeed::new(feed.quote_symbol.clone(), Arc::new(CircuitBreaker::for_quotes()))
            .and_then(|quotes| quotes.history("5m", "1d"))
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "history fetch failed, using synthetic candles");
                synthetic_history(feed.baseline_price, 100, Utc::now(), feed.seed)
            });
        for c in candles {
            println!(
                "{}  O {:.2}  H {:.2}  L {:.2}  C {:.2}",
                c.time.format("%Y-%m-%d %H:%M"),
                c.open,
                c.high,
                c.low,
                c.close
            );
        }
        return Ok(());
    }
    let adapter = price_feed(feed, stream)?;
    let update = adapter.refresh();
    println!("{:.2} ({:?} via {})", update.price, update.origin, adapter.source_name());
    Ok(())
}

fn run_watch(
    db: &Path,
    config: &DeskConfig,
    user: &str,
    ticks: u32,
    stream: StreamSource,
) -> Result<()> {
    let feed = price_feed(&config.feed, stream)?;
    feed.refresh();
    let desk = open_desk(db, config, Arc::clone(&feed))?;
    let key = participation(&desk, user)?;

    let stop = Arc::new(AtomicBool::new(false));
    let interval = feed.interval();
    let poller = spawn_poller(Arc::clone(&feed), interval, Arc::clone(&stop));

    let mut result = Ok(());
    for tick in 1..=ticks {
        match desk.on_price_tick(&key) {
            Ok(report) => {
                let hits = report.triggers.iter().filter(|(_, f)| f.any()).count();
                println!("tick {tick}: {:.2} | {hits} bracket hits", report.price);
                for outcome in &report.auto_closed {
                    for closed in &outcome.closed {
                        println!("  auto-closed #{}: net {:+.2}", closed.index, closed.net_pnl);
                    }
                    print_settlement(&outcome.settlement);
                }
            }
            Err(e) => {
                result = Err(e.into());
                break;
            }
        }
        if tick < ticks {
            std::thread::sleep(interval);
        }
    }

    stop.store(true, Ordering::Relaxed);
    if poller.join().is_err() {
        eprintln!("price poller panicked");
    }
    result
}
