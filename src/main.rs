//! Bid war bot
//!
//! Usage:
//!   bidwar-bot --config bot.json totals
//!   bidwar-bot --config bot.json bid --donor aerionblue moo please
//!   bidwar-bot --config bot.json watch-tips --file tips.txt
//!   bidwar-bot --dry-run watch-tips --file tips.txt

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bidwar_bot::bidwar::{BidOption, Catalog, Tallier};
use bidwar_bot::chat::{ChatReplier, LogChatSink, ReplyLimiter};
use bidwar_bot::config::BotConfig;
use bidwar_bot::dispatch::Dispatcher;
use bidwar_bot::ledger::{Ledger, MemoryLedger, SheetsLedger};
use bidwar_bot::sources::TipFileWatcher;
use bidwar_bot::state::{GiftBurstTracker, PreferenceCache};

/// Bid war attribution and tally bot
#[derive(Parser, Debug)]
#[command(name = "bidwar-bot")]
#[command(about = "Attribute donations to bid war options and report the standings")]
struct Cli {
    /// Path to the JSON bot configuration
    #[arg(short, long, env = "BIDWAR_CONFIG")]
    config: Option<PathBuf>,

    /// Use an in-memory ledger instead of the spreadsheet
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the current totals of every bid war
    Totals,

    /// Run a bid command on behalf of a donor
    Bid {
        /// Chat username of the donor
        #[arg(short, long)]
        donor: String,

        /// The rest of the bid command, e.g. `moo please`
        #[arg(required = true)]
        message: Vec<String>,
    },

    /// Watch a tip file and dispatch new tips as they arrive
    WatchTips {
        /// Tip file path (overrides the config)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bidwar_bot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    let _ = dotenv();

    // Also try the manifest dir when run with --manifest-path from elsewhere.
    let candidate = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}

fn load_catalog(config: &BotConfig) -> Result<Catalog> {
    let Some(path) = &config.bidwar_data_path else {
        warn!("no bid war data file configured; every donation will be unattributed");
        return Ok(Catalog::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("could not read bid war data file {}", path.display()))?;
    Catalog::parse(&raw).with_context(|| format!("malformed bid war data file {}", path.display()))
}

fn build_ledger(config: &BotConfig, catalog: &Catalog, dry_run: bool) -> Result<Arc<dyn Ledger>> {
    if dry_run {
        info!("🧪 dry run: using an in-memory ledger");
        let keys = catalog
            .contests
            .iter()
            .flat_map(|c| c.options.iter().map(|o| o.short_code.clone()));
        return Ok(Arc::new(MemoryLedger::new(keys)));
    }

    let sheet = &config.spreadsheet;
    if sheet.id.is_empty() {
        bail!(
            "no spreadsheet configured; set spreadsheet.id or BIDWAR_SPREADSHEET_ID, or pass --dry-run"
        );
    }
    let token = sheet
        .access_token
        .as_deref()
        .context("SHEETS_ACCESS_TOKEN is not set")?;
    let timeout = config.ledger_timeout();
    let ledger = SheetsLedger::new(token, sheet.id.clone(), &sheet.sheet_name, timeout)
        .context("error initializing Google Sheets client")?;
    Ok(Arc::new(ledger))
}

async fn print_totals(tallier: &Tallier) -> Result<()> {
    let totals = tallier
        .get_totals()
        .await
        .context("error reading current bid war totals")?;
    info!("found {} bid war options in the ledger", totals.len());
    for total in &totals {
        info!("Current total for {:?} is {}", total.option.display_name, total.value);
    }

    for contest in tallier.catalog().contests.iter().filter(|c| !c.closed) {
        let standings = tallier.totals_for_contest(contest).await?;
        println!("{}: {}", contest.name, standings.describe(&BidOption::default()));
    }
    Ok(())
}

async fn watch_tips(dispatcher: Arc<Dispatcher>, path: PathBuf, config: &BotConfig) -> Result<()> {
    let channel = config.chat.channel.clone();
    let watcher = TipFileWatcher::new(&path, channel, config.tip_poll_interval())
        .await
        .with_context(|| format!("error reading tip file {}", path.display()))?;
    let (tx, mut rx) = mpsc::channel(100);
    let handle = watcher.spawn(tx);
    info!("👀 watching {} for tips", path.display());

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    dispatcher.dispatch_event(event);
                }
                None => {
                    error!("tip watcher stopped");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }
    handle.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();
    let config = BotConfig::from_env(cli.config.as_deref())?;

    let catalog = Arc::new(load_catalog(&config)?);
    let ledger = build_ledger(&config, &catalog, cli.dry_run)?;
    let tallier = Arc::new(Tallier::new(ledger, catalog, config.ledger_timeout()));

    let replier = ChatReplier::new(
        Arc::new(LogChatSink),
        ReplyLimiter::new(config.reply_limit()),
        config.chat.replies_enabled,
    );
    let dispatcher = Arc::new(Dispatcher::new(
        tallier.clone(),
        PreferenceCache::new(config.preference_ttl()),
        GiftBurstTracker::new(config.mass_gift_window()),
        replier,
        config.minimum_donation(),
    ));

    match cli.command {
        Commands::Totals => print_totals(&tallier).await?,
        Commands::Bid { donor, message } => {
            let message = format!("{} {}", bidwar_bot::dispatch::BID_COMMAND, message.join(" "));
            dispatcher
                .handle_bid_command(&config.chat.channel, &donor, &message)
                .await
                .with_context(|| format!("error assigning bid command for {}", donor))?;
        }
        Commands::WatchTips { file } => {
            let Some(path) = file.or_else(|| config.tip_file.path.clone()) else {
                bail!("no tip file given; pass --file or set tipFile.path");
            };
            watch_tips(dispatcher, path, &config).await?;
        }
    }
    Ok(())
}
