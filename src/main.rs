//! CTA strategy toolkit CLI.
//!
//! Replays recorded market data through target-position trading and manages
//! stored strategy settings.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cta_strategy::config::{load_strategy_configs, StrategyConfig};
use cta_strategy::db::StrategyStore;
use cta_strategy::engine::{CtaEngine, EngineType, RecordingEngine};
use cta_strategy::replay::{
    parse_events, run_replay, run_replay_with_store, FillMode, ReplayConfig,
};
use cta_strategy::strategy::{class_defaults, create_strategy, Setting, STRATEGY_CLASSES};

/// CTA strategy toolkit CLI.
#[derive(Parser)]
#[command(name = "ctactl")]
#[command(about = "Replay and manage CTA target-position strategies", long_about = None)]
struct Cli {
    /// Database URL
    #[arg(short, long, env = "CTA_DATABASE_URL", default_value = "sqlite:./cta_strategy.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "CTA_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay JSON-lines market events through a target-position strategy
    Replay {
        /// Event file (one tick, bar or target event per line)
        #[arg(short, long)]
        events: PathBuf,

        /// Engine mode the strategy runs under
        #[arg(short, long, value_enum, default_value = "backtesting")]
        mode: ModeArg,

        /// How sent orders are resolved
        #[arg(short, long, value_enum, default_value = "immediate")]
        fill: FillMode,

        /// Price step beyond the best quote
        #[arg(long, default_value = "1")]
        tick_add: Decimal,

        /// Strategy instance name
        #[arg(long, default_value = "replay")]
        name: String,

        /// Instrument identifier
        #[arg(long, default_value = "IF2401.CFFEX")]
        symbol: String,

        /// Continue from the strategy's stored variables and save them back
        #[arg(long)]
        persist: bool,
    },

    /// Manage stored strategy settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Show default parameters of the built-in strategy classes
    ShowDefaults,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// List stored settings
    List,

    /// Add or replace a strategy setting
    Add {
        /// Strategy instance name
        #[arg(long)]
        name: String,

        /// Strategy class
        #[arg(long)]
        class: String,

        /// Instrument identifier
        #[arg(long)]
        symbol: String,

        /// Parameter overrides as a JSON object
        #[arg(long, default_value = "{}")]
        setting: String,
    },

    /// Add or replace every setting in a JSON config file
    Import {
        /// File holding a JSON array of strategy configs
        file: PathBuf,
    },

    /// Remove a strategy setting and its stored data
    Remove {
        /// Strategy instance name
        name: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Backtesting,
    Live,
}

impl From<ModeArg> for EngineType {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Backtesting => EngineType::Backtesting,
            ModeArg::Live => EngineType::Live,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Replay {
            events,
            mode,
            fill,
            tick_add,
            name,
            symbol,
            persist,
        } => {
            let text = std::fs::read_to_string(&events)
                .with_context(|| format!("Failed to read {}", events.display()))?;
            let events = parse_events(&text)?;

            let config = ReplayConfig {
                strategy_name: name,
                vt_symbol: symbol,
                mode: mode.into(),
                fill,
                tick_add,
            };

            let results = if persist {
                let store = StrategyStore::new(&cli.database).await?;
                run_replay_with_store(config, &events, store).await?
            } else {
                run_replay(config, &events).await?
            };
            println!("{}", results);

            if !results.pending_orders.is_empty() {
                println!("\nPending orders:");
                for id in &results.pending_orders {
                    println!("  {}", id);
                }
            }
        }

        Commands::Settings { action } => {
            let store = StrategyStore::new(&cli.database).await?;

            match action {
                SettingsAction::List => {
                    let configs = store.load_settings().await?;

                    if configs.is_empty() {
                        println!("No strategies configured. Use 'ctactl settings add' to add one.");
                        return Ok(());
                    }

                    println!("\n{:<20} {:<22} {:<16} SETTING", "NAME", "CLASS", "SYMBOL");
                    println!("{}", "-".repeat(80));

                    for config in configs {
                        println!(
                            "{:<20} {:<22} {:<16} {}",
                            truncate(&config.strategy_name, 18),
                            config.class_name,
                            config.vt_symbol,
                            serde_json::to_string(&config.setting)?
                        );
                    }
                }

                SettingsAction::Add {
                    name,
                    class,
                    symbol,
                    setting,
                } => {
                    let setting: Setting =
                        serde_json::from_str(&setting).context("Setting must be a JSON object")?;
                    let config = StrategyConfig {
                        strategy_name: name,
                        class_name: class,
                        vt_symbol: symbol,
                        setting,
                    };

                    validate(&config)?;
                    store.save_setting(&config).await?;
                    println!("Saved: {} ({})", config.strategy_name, config.class_name);
                }

                SettingsAction::Import { file } => {
                    let configs = load_strategy_configs(&file)?;
                    for config in &configs {
                        validate(config)?;
                    }
                    for config in &configs {
                        store.save_setting(config).await?;
                    }
                    info!(count = configs.len(), file = %file.display(), "Settings imported");
                    println!("Imported {} strategies", configs.len());
                }

                SettingsAction::Remove { name } => {
                    if store.remove_setting(&name).await? {
                        println!("Removed: {}", name);
                    } else {
                        println!("No strategy named {}", name);
                    }
                }
            }
        }

        Commands::ShowDefaults => {
            for class_name in STRATEGY_CLASSES {
                let Some(defaults) = class_defaults(class_name) else {
                    continue;
                };

                println!("\n=== {} ===", class_name);
                for (name, value) in defaults {
                    println!("  {:<14} {}", name, value);
                }
            }
        }
    }

    Ok(())
}

/// Check a config by building the strategy it describes.
fn validate(config: &StrategyConfig) -> Result<()> {
    let engine: Arc<dyn CtaEngine> = Arc::new(RecordingEngine::new(EngineType::Live));
    create_strategy(engine, config)
        .with_context(|| format!("Invalid config for {}", config.strategy_name))?;
    Ok(())
}

/// Truncate a string with ellipsis if too long.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
