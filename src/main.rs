use clap::{Args, Parser, Subcommand};
use kv_withdraw::application::engine::WithdrawalEngine;
use kv_withdraw::application::race::{jittered_amounts, race};
use kv_withdraw::application::strategies::StrategyKind;
use kv_withdraw::config::{DEFAULT_KEY_PREFIX, DEFAULT_MAX_RETRIES, EngineConfig, LockSettings};
use kv_withdraw::domain::ports::SharedStore;
use kv_withdraw::infrastructure::in_memory::InMemoryStore;
use kv_withdraw::interfaces::report::ReportWriter;
use miette::{IntoDiagnostic, Result, miette};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct StoreArgs {
    /// Redis connection URL. Without it an in-memory store is used, which
    /// lives only as long as one command: balances set by `init` are gone
    /// by the next invocation.
    #[arg(long, env = "REDIS_URL", global = true)]
    redis_url: Option<String>,

    /// Latency added to every in-memory store operation, in milliseconds.
    #[arg(long, default_value_t = 0, global = true)]
    simulated_latency_ms: u64,
}

#[derive(Args)]
struct EngineArgs {
    /// Namespace prefix for every key.
    #[arg(long, env = "KEY_PREFIX", default_value = DEFAULT_KEY_PREFIX, global = true)]
    key_prefix: String,

    /// Attempts the optimistic strategy makes before reporting a conflict.
    #[arg(long, env = "MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES, global = true)]
    max_retries: u32,

    /// Lease lifetime in milliseconds.
    #[arg(long, env = "LOCK_TTL_MS", default_value_t = 5000, global = true)]
    lock_ttl_ms: u64,

    /// How long to wait for a lease before reporting lock_busy, in milliseconds.
    #[arg(long, env = "LOCK_WAIT_MS", default_value_t = 1000, global = true)]
    lock_wait_ms: u64,

    /// Delay between lease acquisition attempts, in milliseconds.
    #[arg(long, env = "LOCK_RETRY_MS", default_value_t = 10, global = true)]
    lock_retry_ms: u64,
}

impl EngineArgs {
    fn config(&self) -> EngineConfig {
        EngineConfig {
            key_prefix: self.key_prefix.clone(),
            max_retries: self.max_retries,
            lock: LockSettings {
                ttl: Duration::from_millis(self.lock_ttl_ms),
                wait_budget: Duration::from_millis(self.lock_wait_ms),
                retry_delay: Duration::from_millis(self.lock_retry_ms),
            },
            ..EngineConfig::default()
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Set a user's balance, overwriting any previous value
    Init {
        #[arg(long)]
        user: String,
        #[arg(long, allow_negative_numbers = true)]
        balance: i64,
    },
    /// Print a user's current balance
    Balance {
        #[arg(long)]
        user: String,
    },
    /// Print a user's most recent withdrawals, newest first
    History {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Withdraw from a user's balance with one strategy
    Withdraw {
        #[arg(long, default_value = "script")]
        strategy: StrategyKind,
        #[arg(long)]
        user: String,
        #[arg(long, allow_negative_numbers = true)]
        amount: i64,
    },
    /// Fire concurrent withdrawals at one balance and compare strategies
    Race {
        /// Strategies to run; defaults to all four.
        #[arg(long = "strategy")]
        strategies: Vec<StrategyKind>,
        #[arg(long, default_value = "123")]
        user: String,
        #[arg(long, default_value_t = 1000)]
        initial: i64,
        #[arg(long, default_value_t = 100)]
        requests: usize,
        #[arg(long, default_value_t = 3)]
        amount: i64,
        /// Randomly move each amount by up to this much (never below 1).
        #[arg(long, default_value_t = 0)]
        amount_jitter: i64,
    },
    /// Check that the store is reachable
    Health,
}

impl Command {
    /// Commands whose result depends on state left behind by earlier runs.
    fn needs_persistence(&self) -> bool {
        matches!(
            self,
            Command::Init { .. }
                | Command::Balance { .. }
                | Command::History { .. }
                | Command::Withdraw { .. }
        )
    }
}

fn in_memory_store(args: &StoreArgs) -> SharedStore {
    Arc::new(InMemoryStore::with_latency(Duration::from_millis(
        args.simulated_latency_ms,
    )))
}

async fn open_store(args: &StoreArgs) -> Result<SharedStore> {
    match args.redis_url.as_deref() {
        Some(url) => open_redis(url, args).await,
        None => Ok(in_memory_store(args)),
    }
}

#[cfg(feature = "storage-redis")]
async fn open_redis(url: &str, _args: &StoreArgs) -> Result<SharedStore> {
    let store = kv_withdraw::infrastructure::redis::RedisStore::connect(url)
        .await
        .into_diagnostic()?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "storage-redis"))]
async fn open_redis(url: &str, args: &StoreArgs) -> Result<SharedStore> {
    tracing::warn!(
        url,
        "WARNING: Redis storage requested via --redis-url, but 'storage-redis' feature is not enabled. Falling back to In-Memory storage."
    );
    Ok(in_memory_store(args))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.store.redis_url.is_none() && cli.command.needs_persistence() {
        tracing::warn!(
            "using an in-memory store that does not persist between runs; pass --redis-url to keep balances"
        );
    }
    let store = open_store(&cli.store).await?;
    let engine = WithdrawalEngine::new(store, cli.engine.config()).into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());

    match cli.command {
        Command::Init { user, balance } => {
            engine.init_balance(&user, balance).await.into_diagnostic()?;
            writer
                .write(&serde_json::json!({ "userId": user, "balance": balance }))
                .into_diagnostic()?;
        }
        Command::Balance { user } => {
            let balance = engine
                .balance(&user)
                .await
                .into_diagnostic()?
                .ok_or_else(|| miette!("balance not found for user '{user}'"))?;
            writer
                .write(&serde_json::json!({ "userId": user, "balance": balance }))
                .into_diagnostic()?;
        }
        Command::History { user, limit } => {
            let history = engine.history(&user, limit).await.into_diagnostic()?;
            writer
                .write(&serde_json::json!({ "userId": user, "history": history }))
                .into_diagnostic()?;
        }
        Command::Withdraw {
            strategy,
            user,
            amount,
        } => {
            let outcome = engine
                .withdraw(strategy, &user, amount)
                .await
                .into_diagnostic()?;
            writer.write(&outcome).into_diagnostic()?;
        }
        Command::Race {
            strategies,
            user,
            initial,
            requests,
            amount,
            amount_jitter,
        } => {
            let strategies = if strategies.is_empty() {
                StrategyKind::ALL.to_vec()
            } else {
                strategies
            };
            let amounts = jittered_amounts(amount, amount_jitter, requests, &mut rand::thread_rng())
                .into_diagnostic()?;

            let mut reports = Vec::with_capacity(strategies.len());
            for kind in strategies {
                let racer = format!("{user}-{kind}");
                reports.push(
                    race(&engine, kind, &racer, initial, &amounts)
                        .await
                        .into_diagnostic()?,
                );
            }
            writer.write_all(reports).into_diagnostic()?;
        }
        Command::Health => {
            let backend = engine.health().await.into_diagnostic()?;
            writer
                .write(&serde_json::json!({ "status": "ok", "store": backend }))
                .into_diagnostic()?;
        }
    }

    Ok(())
}
