// # nawalad - Nawala check runner
//
// Thin integration layer invoked by an external scheduler (cron, systemd
// timer). Every run executes one command and exits:
//
// - `check [--target-id N]`: check one target, or every target that is due
// - `refresh-shortlinks`: re-probe the candidate URLs of active shortlinks
// - `auto-rotate [--no-rollback]`: rotation sweep, then the rollback sweep
// - `rotate <id>` / `rollback <id>`: manual shortlink moves
// - `stats <target-id> [--hours H]`: check statistics as JSON (default 7 days)
//
// All probe, fusion and rotation logic lives in nawala-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Store
// - `NAWALA_STORE_TYPE`: Type of store (file, memory)
// - `NAWALA_STORE_PATH`: Path to the data file (for file)
//
// ### Detection
// - `NAWALA_BLOCKED_PREFIXES`: Comma-separated sinkhole IP prefixes
// - `NAWALA_BLOCKPAGE_PHRASES`: Comma-separated block page phrases
//
// ### Engine
// - `NAWALA_MAX_CONCURRENCY`: Targets checked in parallel
// - `NAWALA_LOG_LEVEL`: trace, debug, info, warn, error
//
// ### Notifications
// - `NAWALA_TELEGRAM_BOT_TOKEN`: Bot API token
// - `NAWALA_TELEGRAM_CHAT_IDS`: Comma-separated chat ids, each optionally
//   bound to a target group as `chat_id:group_id`
//
// ## Example
//
// ```bash
// export NAWALA_STORE_TYPE=file
// export NAWALA_STORE_PATH=/var/lib/nawala/state.json
// export NAWALA_TELEGRAM_BOT_TOKEN=123456:your_token
// export NAWALA_TELEGRAM_CHAT_IDS=-1001234567890,4242:3
//
// nawalad check && nawalad refresh-shortlinks && nawalad auto-rotate
// ```

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use nawala_core::config::{NawalaConfig, StoreConfig};
use nawala_core::events::EngineEvent;
use nawala_core::model::{RotationReason, ShortlinkId, TargetId};
use nawala_core::traits::{Notifier, Store};
use nawala_core::{CheckEngine, EventSink, ProbeRegistry, RotationService};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for cron and systemd callers
///
/// - 0: Command completed
/// - 1: Configuration or startup error
/// - 2: Runtime error
#[derive(Debug, Clone, Copy)]
enum NawalaExitCode {
    Clean = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<NawalaExitCode> for ExitCode {
    fn from(code: NawalaExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Debug, Parser)]
#[command(name = "nawalad", version, about = "Censorship checks and shortlink rotation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check one target, or every target whose interval has elapsed
    Check {
        #[arg(long)]
        target_id: Option<TargetId>,
    },

    /// Re-probe every active candidate of every active shortlink
    RefreshShortlinks,

    /// Rotate every shortlink whose current target is blocked
    AutoRotate {
        /// Skip the auto-rollback sweep that follows
        #[arg(long)]
        no_rollback: bool,
    },

    /// Rotate one shortlink to its best healthy candidate
    Rotate {
        shortlink_id: ShortlinkId,
        #[arg(long)]
        actor: Option<String>,
    },

    /// Return one shortlink to its original target
    Rollback {
        shortlink_id: ShortlinkId,
        #[arg(long)]
        actor: Option<String>,
    },

    /// Print check statistics of a target as JSON
    Stats {
        target_id: TargetId,
        #[arg(long, default_value_t = 168)]
        hours: i64,
    },
}

/// Environment configuration
struct Config {
    store_type: String,
    store_path: Option<String>,
    log_level: String,
    blocked_prefixes: Option<Vec<String>>,
    blockpage_phrases: Option<Vec<String>>,
    max_concurrency: Option<usize>,
    telegram_bot_token: Option<String>,
    telegram_chats: Vec<ChatSpec>,
}

/// One `NAWALA_TELEGRAM_CHAT_IDS` entry
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChatSpec {
    chat_id: String,
    group_id: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let max_concurrency = match var("NAWALA_MAX_CONCURRENCY") {
            Some(raw) => Some(raw.trim().parse::<usize>().with_context(|| {
                format!("NAWALA_MAX_CONCURRENCY must be a number. Got: {}", raw)
            })?),
            None => None,
        };

        let telegram_chats = var("NAWALA_TELEGRAM_CHAT_IDS")
            .map(|raw| split_list(&raw))
            .unwrap_or_default()
            .iter()
            .map(|entry| parse_chat(entry))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            store_type: var("NAWALA_STORE_TYPE").unwrap_or_else(|| "memory".to_string()),
            store_path: var("NAWALA_STORE_PATH"),
            log_level: var("NAWALA_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            blocked_prefixes: var("NAWALA_BLOCKED_PREFIXES").map(|raw| split_list(&raw)),
            blockpage_phrases: var("NAWALA_BLOCKPAGE_PHRASES").map(|raw| split_list(&raw)),
            max_concurrency,
            telegram_bot_token: var("NAWALA_TELEGRAM_BOT_TOKEN").filter(|t| !t.trim().is_empty()),
            telegram_chats,
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.store_type.as_str() {
            "memory" => {}
            "file" => match self.store_path.as_deref() {
                None | Some("") => anyhow::bail!(
                    "NAWALA_STORE_PATH is required when NAWALA_STORE_TYPE=file. \
                    Set it via: export NAWALA_STORE_PATH=/var/lib/nawala/state.json"
                ),
                Some(path) => {
                    if let Some(parent) = std::path::Path::new(path).parent()
                        && !parent.as_os_str().is_empty()
                        && !parent.exists()
                    {
                        anyhow::bail!(
                            "NAWALA_STORE_PATH parent directory does not exist: {}. \
                            Create it first: sudo mkdir -p {}",
                            parent.display(),
                            parent.display()
                        );
                    }
                }
            },
            other => anyhow::bail!(
                "NAWALA_STORE_TYPE '{}' is not supported. Supported types: file, memory",
                other
            ),
        }

        if self.blocked_prefixes.as_ref().is_some_and(|p| p.is_empty()) {
            anyhow::bail!("NAWALA_BLOCKED_PREFIXES is set but lists no prefix");
        }

        if self.blockpage_phrases.as_ref().is_some_and(|p| p.is_empty()) {
            anyhow::bail!("NAWALA_BLOCKPAGE_PHRASES is set but lists no phrase");
        }

        if let Some(max) = self.max_concurrency
            && !(1..=64).contains(&max)
        {
            anyhow::bail!("NAWALA_MAX_CONCURRENCY must be between 1 and 64. Got: {}", max);
        }

        if self.telegram_bot_token.is_some() && self.telegram_chats.is_empty() {
            anyhow::bail!(
                "NAWALA_TELEGRAM_CHAT_IDS must list at least one chat when \
                NAWALA_TELEGRAM_BOT_TOKEN is set"
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "NAWALA_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Library configuration with the environment overrides applied
    fn nawala_config(&self) -> Result<NawalaConfig> {
        let mut config = NawalaConfig::default();

        if let Some(prefixes) = &self.blocked_prefixes {
            config.detector.blocked_ip_prefixes = prefixes.clone();
        }
        if let Some(phrases) = &self.blockpage_phrases {
            config.detector.blockpage_phrases = phrases.clone();
        }
        if let Some(max) = self.max_concurrency {
            config.engine.max_concurrent_checks = max;
        }
        config.store = match (self.store_type.as_str(), &self.store_path) {
            ("file", Some(path)) => StoreConfig::File { path: path.clone() },
            _ => StoreConfig::Memory,
        };

        config.validate()?;
        Ok(config)
    }

    fn log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_chat(entry: &str) -> Result<ChatSpec> {
    match entry.split_once(':') {
        Some((chat_id, group)) => {
            let group_id = group.trim().parse::<u64>().with_context(|| {
                format!(
                    "NAWALA_TELEGRAM_CHAT_IDS entry '{}' has an invalid group id",
                    entry
                )
            })?;
            Ok(ChatSpec {
                chat_id: chat_id.trim().to_string(),
                group_id: Some(group_id),
            })
        }
        None => Ok(ChatSpec {
            chat_id: entry.to_string(),
            group_id: None,
        }),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return NawalaExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return NawalaExitCode::ConfigError.into();
    }

    let nawala_config = match config.nawala_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration validation error: {}", e);
            return NawalaExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return NawalaExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return NawalaExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run(cli.command, config, nawala_config)).into()
}

/// Wire the components, run one command, flush the store
async fn run(command: Command, config: Config, nawala_config: NawalaConfig) -> NawalaExitCode {
    #[allow(unused_mut)]
    let mut registry = ProbeRegistry::with_builtin_stores();

    #[cfg(feature = "http")]
    {
        debug!("Registering HTTP probe seams");
        nawala_probe_http::register(&mut registry);
    }

    let prober = match registry.build_prober(&nawala_config) {
        Ok(prober) => Arc::new(prober),
        Err(e) => {
            error!("Failed to build prober: {}", e);
            return NawalaExitCode::ConfigError;
        }
    };

    let store: Arc<dyn Store> = match registry.create_store(&nawala_config.store).await {
        Ok(store) => Arc::from(store),
        Err(e) => {
            error!("Failed to open {} store: {}", nawala_config.store.type_name(), e);
            return NawalaExitCode::RuntimeError;
        }
    };

    let notifier = match build_notifier(&config) {
        Ok(notifier) => notifier,
        Err(e) => {
            error!("Failed to set up notifications: {}", e);
            return NawalaExitCode::ConfigError;
        }
    };

    let (events, rx) = EventSink::channel(nawala_config.engine.event_channel_capacity);
    let forwarder = spawn_forwarder(rx, notifier);

    let engine = match CheckEngine::new(
        store.clone(),
        prober,
        nawala_config.engine.clone(),
        events.clone(),
    ) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Invalid engine configuration: {}", e);
            return NawalaExitCode::ConfigError;
        }
    };
    let rotation = RotationService::new(store.clone(), events);

    let outcome = tokio::select! {
        result = execute(command, &engine, &rotation) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, abandoning the running command");
            Ok(())
        }
    };

    // Dropping the last sinks closes the channel so the forwarder drains and stops
    drop(engine);
    drop(rotation);
    if let Err(e) = forwarder.await {
        warn!("Notification forwarder stopped abnormally: {}", e);
    }

    let mut code = match outcome {
        Ok(()) => NawalaExitCode::Clean,
        Err(e) => {
            error!("Command failed: {:#}", e);
            NawalaExitCode::RuntimeError
        }
    };

    if let Err(e) = store.flush().await {
        error!("Failed to flush store: {}", e);
        code = NawalaExitCode::RuntimeError;
    }

    code
}

async fn execute(command: Command, engine: &CheckEngine, rotation: &RotationService) -> Result<()> {
    match command {
        Command::Check { target_id: Some(id) } => {
            let outcome = engine.check_target(id).await?;
            println!(
                "target {}: {} ({}%, {} resolver(s))",
                outcome.target_id,
                outcome.status,
                outcome.confidence,
                outcome.results.len()
            );
        }
        Command::Check { target_id: None } => {
            let summary = engine.check_due_targets(Utc::now()).await?;
            for outcome in &summary.outcomes {
                println!(
                    "target {}: {} ({}%)",
                    outcome.target_id, outcome.status, outcome.confidence
                );
            }
            info!(
                "Checked {} due target(s), {} failed",
                summary.outcomes.len(),
                summary.failed
            );
            if summary.failed > 0 {
                anyhow::bail!("{} target check(s) failed", summary.failed);
            }
        }
        Command::RefreshShortlinks => {
            let refreshed = engine.refresh_shortlink_targets().await?;
            println!("refreshed {} candidate(s)", refreshed);
        }
        Command::AutoRotate { no_rollback } => {
            let rotated = rotation.auto_rotate_all().await?;
            println!("rotated {} shortlink(s)", rotated);
            if !no_rollback {
                let rolled_back = rotation.auto_rollback_all().await?;
                println!("rolled back {} shortlink(s)", rolled_back);
            }
        }
        Command::Rotate {
            shortlink_id,
            actor,
        } => {
            let rotated = rotation
                .rotate(shortlink_id, actor.as_deref(), RotationReason::Manual)
                .await?;
            println!("shortlink {}: rotated={}", shortlink_id, rotated);
        }
        Command::Rollback {
            shortlink_id,
            actor,
        } => {
            let rolled_back = rotation.rollback(shortlink_id, actor.as_deref()).await?;
            println!("shortlink {}: rolled_back={}", shortlink_id, rolled_back);
        }
        Command::Stats { target_id, hours } => {
            if hours <= 0 {
                anyhow::bail!("--hours must be positive. Got: {}", hours);
            }
            let stats = engine
                .target_statistics(target_id, chrono::Duration::hours(hours))
                .await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

/// Forward status changes to the notifier until the channel closes
fn spawn_forwarder(
    mut rx: mpsc::Receiver<EngineEvent>,
    notifier: Option<Box<dyn Notifier>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                EngineEvent::StatusChanged(change) => {
                    let Some(notifier) = &notifier else {
                        continue;
                    };
                    if let Err(e) = notifier.notify(&change).await {
                        warn!(
                            target_id = change.target_id,
                            "{} notification failed: {}",
                            notifier.notifier_name(),
                            e
                        );
                    }
                }
                EngineEvent::ResolverFailed {
                    target_id,
                    resolver_id,
                    error,
                } => {
                    debug!(target_id, resolver_id, "Resolver excluded: {}", error);
                }
                other => debug!("{:?}", other),
            }
        }
    })
}

#[cfg(feature = "telegram")]
fn build_notifier(config: &Config) -> Result<Option<Box<dyn Notifier>>> {
    use nawala_notify_telegram::{TelegramChannel, TelegramNotifier};

    let Some(token) = &config.telegram_bot_token else {
        debug!("NAWALA_TELEGRAM_BOT_TOKEN not set, notifications disabled");
        return Ok(None);
    };

    let channels = config
        .telegram_chats
        .iter()
        .map(|chat| TelegramChannel {
            group_id: chat.group_id,
            ..TelegramChannel::new(chat.chat_id.clone())
        })
        .collect();

    let notifier = TelegramNotifier::new(token.clone(), channels)?;
    info!(
        "Telegram notifications enabled for {} chat(s)",
        notifier.channels().len()
    );
    Ok(Some(Box::new(notifier)))
}

#[cfg(not(feature = "telegram"))]
fn build_notifier(config: &Config) -> Result<Option<Box<dyn Notifier>>> {
    if config.telegram_bot_token.is_some() {
        warn!("NAWALA_TELEGRAM_BOT_TOKEN is set but nawalad was built without telegram support");
    }
    Ok(None)
}
