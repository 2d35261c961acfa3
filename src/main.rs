//! # Goblin
//!
//! Housekeeping for the goblin Discord bot: the open recruit-thread
//! registry, the stale-thread sweeper, guild recruit settings and the CWL
//! war cache.
//!
//! Usage:
//!   goblin run                              # Sweeper + DM session janitor until Ctrl-C
//!   goblin sweep                            # One sweep, print the report
//!   goblin open-threads                     # List registered recruit threads
//!   goblin cwl months '#2PP'                # Cached CWL months for a clan
//!   goblin cwl show '#2PP' 2026-01 3        # One cached round (or the whole month)
//!   goblin roles set 123 15 456 789         # Map TH15 to recruiter roles

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use goblin_channels::DiscordThreads;
use goblin_core::{GoblinConfig, ThreadPlatform};
use goblin_cwl::{WarCache, is_month_key};
use goblin_scheduler::SweepScheduler;
use goblin_session::{RecruitDmSession, SessionCache};
use goblin_store::{ApplicantRegistry, ConfigStore};
use tracing_subscriber::EnvFilter;

const CRATES: &[&str] = &[
    "goblin",
    "goblin_core",
    "goblin_store",
    "goblin_session",
    "goblin_scheduler",
    "goblin_cwl",
    "goblin_channels",
];

#[derive(Parser)]
#[command(name = "goblin", version, about = "👺 Goblin: recruit threads, DM sessions and CWL cache")]
struct Cli {
    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the data directory from the config
    #[arg(long)]
    data_dir: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sweeper until Ctrl-C
    Run,
    /// Sweep stale recruit threads once
    Sweep,
    /// List open recruit threads
    OpenThreads,
    /// Inspect the CWL war cache
    Cwl {
        #[command(subcommand)]
        command: CwlCommand,
    },
    /// Inspect or change town-hall recruiter roles
    Roles {
        #[command(subcommand)]
        command: RolesCommand,
    },
}

#[derive(Subcommand)]
enum CwlCommand {
    /// Months with cached wars, newest first
    Months { clan: String },
    /// Cached wars for a month, or one round day
    Show {
        clan: String,
        month: String,
        day: Option<u32>,
    },
}

#[derive(Subcommand)]
enum RolesCommand {
    /// Print the town-hall role mapping and allowed roles
    Show { guild: String },
    /// Replace the roles pinged for a town hall level
    Set {
        guild: String,
        th: u8,
        roles: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = CRATES
        .iter()
        .map(|c| format!("{c}={level}"))
        .collect::<Vec<_>>()
        .join(",");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(GoblinConfig::default_path);
    let mut config = GoblinConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    match cli.command {
        Command::Run => run(&config).await,
        Command::Sweep => sweep_once(&config).await,
        Command::OpenThreads => open_threads(&config).await,
        Command::Cwl { command } => cwl(&config, command).await,
        Command::Roles { command } => roles(&config, command).await,
    }
}

fn platform(config: &GoblinConfig) -> Arc<dyn ThreadPlatform> {
    if config.discord.token.trim().is_empty() {
        tracing::warn!("⚠️ No Discord token configured (set GOBLIN_DISCORD_TOKEN); thread lookups will fail");
    }
    Arc::new(DiscordThreads::new(config.discord.clone()))
}

async fn run(config: &GoblinConfig) -> Result<()> {
    let registry = Arc::new(ApplicantRegistry::open(config.registry_path()).await);
    let sessions: Arc<SessionCache<RecruitDmSession>> =
        Arc::new(SessionCache::new(Duration::from_secs(config.session.ttl_secs)));

    println!("👺 Goblin v{}", env!("CARGO_PKG_VERSION"));
    println!("   📂 Data Dir:      {}", config.data_root().display());
    println!("   🧵 Open threads:  {}", registry.len());
    println!("   ⏰ Sweep every:   {}s", config.sweep.interval_secs);
    println!();

    let sweeper = Arc::new(SweepScheduler::from_config(
        registry.clone(),
        platform(config),
        &config.sweep,
    ));
    let sweep_task = sweeper.clone().spawn();

    let janitor = {
        let sessions = sessions.clone();
        let period = Duration::from_secs(config.session.ttl_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let evicted = sessions.sweep_expired();
                if evicted > 0 {
                    tracing::debug!("Evicted {evicted} expired DM session(s)");
                }
            }
        })
    };

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    tracing::info!("🛑 Shutting down");
    janitor.abort();
    sweeper.shutdown();
    if let Err(e) = sweep_task.await {
        tracing::warn!("⚠️ Sweeper ended abnormally: {e}");
    }
    registry.flush().await?;
    Ok(())
}

async fn sweep_once(config: &GoblinConfig) -> Result<()> {
    let registry = Arc::new(ApplicantRegistry::open(config.registry_path()).await);
    let sweeper = SweepScheduler::from_config(registry.clone(), platform(config), &config.sweep);
    let report = sweeper
        .trigger()
        .await
        .context("a sweep is already running")?;
    registry.flush().await?;

    println!("🧹 Sweep finished");
    println!("   Examined:  {}", report.examined);
    println!("   Stale:     {}", report.stale);
    println!("   Closed:    {}", report.finalized);
    println!("   Missing:   {}", report.missing);
    println!("   Failed:    {}", report.failed);
    println!("   Removed:   {}", report.removed);
    Ok(())
}

async fn open_threads(config: &GoblinConfig) -> Result<()> {
    let registry = ApplicantRegistry::open(config.registry_path()).await;
    let entries = registry.list_all();
    if entries.is_empty() {
        println!("No open recruit threads.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{}  {:<20} {:<12} {}  {}",
            entry.opened_at.format("%Y-%m-%d %H:%M"),
            entry.owner_key,
            entry.correlation_key,
            entry.resource_id,
            entry.external_url
        );
    }
    Ok(())
}

async fn cwl(config: &GoblinConfig, command: CwlCommand) -> Result<()> {
    let cache = WarCache::new(config.cwl_dir());
    match command {
        CwlCommand::Months { clan } => {
            let months = cache.list_available_months(&clan).await;
            if months.is_empty() {
                println!("No cached CWL months for {clan}.");
            }
            for month in months {
                println!("{month}");
            }
        }
        CwlCommand::Show { clan, month, day } => {
            anyhow::ensure!(is_month_key(&month), "month must look like YYYY-MM, got {month}");
            let wars = match day {
                Some(day) => cache.load(&clan, &month, day).await.map(|w| vec![(day, w)]).unwrap_or_default(),
                None => cache.load_month(&clan, &month).await.into_iter().collect(),
            };
            if wars.is_empty() {
                println!("Nothing cached for {clan} in {month}.");
            }
            for (day, war) in wars {
                println!("── day {day}: {} vs {}", war.clan.name, war.opponent.name);
                println!("{}", serde_json::to_string_pretty(&war)?);
            }
        }
    }
    Ok(())
}

async fn roles(config: &GoblinConfig, command: RolesCommand) -> Result<()> {
    let store = ConfigStore::open(config.recruit_config_path());
    match command {
        RolesCommand::Show { guild } => {
            println!("Town hall roles:\n{}", store.role_mapping_summary(&guild).await);
            println!("Allowed roles: {}", store.allowed_role_summary(&guild).await);
        }
        RolesCommand::Set { guild, th, roles } => {
            store.set_role_ids_for_town_hall(&guild, th, &roles).await?;
            println!("✅ TH{th} updated for guild {guild}");
            println!("{}", store.role_mapping_summary(&guild).await);
        }
    }
    store.close().await;
    Ok(())
}
