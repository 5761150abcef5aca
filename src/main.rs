use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use tether::conflict::{ConflictDetector, ConflictResolver, DefaultResolution, ResolutionPolicy};
use tether::engine::{ReconciliationEngine, SyncMode, SyncStatus};
use tether::history::HistoryLog;
use tether::report::ReportStore;
use tether::rules::{Direction, RuleStore, SyncRule};
use tether::scheduler::Scheduler;
use tether::store::s3::S3Store;
use tether::store::ObjectStore;
use tether::{Config, ConfigExport};

#[derive(Parser)]
#[command(
    name = "tether",
    version,
    about = "Keep local directories and S3-compatible object storage in sync"
)]
struct Cli {
    /// Configuration directory (defaults to the platform config dir)
    #[arg(long, global = true, env = "TETHER_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one sync pass and exit
    Run {
        /// Override the configured mode (full, selective, backup, incremental)
        #[arg(long)]
        mode: Option<String>,
    },
    /// Run passes on the configured interval until interrupted
    Start,
    /// Manage sync rules
    Rule {
        #[command(subcommand)]
        command: RuleCommand,
    },
    /// Show the pass history
    History {
        /// Show aggregate statistics instead of individual entries
        #[arg(long)]
        stats: bool,
        /// Delete all history entries
        #[arg(long)]
        clear: bool,
    },
    /// List files currently diverged on both sides
    Conflicts,
    /// Resolve a diverged file (policy: local, remote, both, skip)
    Resolve { path: PathBuf, policy: String },
    /// List saved sync reports
    Reports,
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum RuleCommand {
    /// Add a sync rule
    Add {
        name: String,
        local: PathBuf,
        remote: String,
        /// upload, download or bidirectional
        #[arg(long, default_value = "bidirectional")]
        direction: String,
        /// Exclusion pattern (repeatable): prefix foo*, suffix *foo, exact
        /// name, or a full glob
        #[arg(long = "filter")]
        filters: Vec<String>,
    },
    /// List configured rules
    List,
    /// Remove a rule by id
    Remove { id: String },
    /// Enable a rule by id
    Enable { id: String },
    /// Disable a rule by id
    Disable { id: String },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the active configuration
    Show,
    /// Set the scheduler interval in seconds (minimum 10)
    SetInterval { secs: u64 },
    /// Set the sync mode (full, selective, backup, incremental)
    SetMode { mode: String },
    /// Set the default conflict resolution (local, remote, both, skip, ask)
    SetResolution { resolution: String },
    /// Configure the object store connection
    SetStore {
        bucket: String,
        #[arg(long)]
        region: Option<String>,
        /// Custom endpoint for MinIO/R2/B2 style services
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// Export sync settings and rules to a file
    Export { path: PathBuf },
    /// Import sync settings and rules from a file
    Import { path: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let dir = match cli.config_dir {
        Some(dir) => dir,
        None => Config::default_dir()?,
    };
    let config_path = Config::config_path(&dir);
    let mut config = Config::load(&config_path)?;

    match cli.command {
        Command::Run { mode } => {
            let mode = match mode {
                Some(m) => SyncMode::from_str(&m)?,
                None => config.sync.mode,
            };
            let scheduler = build_scheduler(&config, &dir).await?;
            scheduler.set_mode(mode).await;

            let status = scheduler.run_once().await?;
            print_status(&status);

            let conflicts = scheduler.conflicts().await;
            if !conflicts.is_empty() {
                println!();
                println!(
                    "{} {} conflict(s) pending; run 'tether resolve <path> <policy>'",
                    "!".yellow().bold(),
                    conflicts.len()
                );
            }
        }

        Command::Start => {
            let scheduler = Arc::new(build_scheduler(&config, &dir).await?);
            scheduler.start().await?;
            println!(
                "{} syncing every {}s in {} mode (ctrl-c to stop)",
                "tether".green().bold(),
                config.sync.interval_secs,
                config.sync.mode.as_str()
            );

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl-c")?;
            println!("stopping after the current pass...");
            scheduler.stop().await?;
        }

        Command::Rule { command } => {
            let mut rules = RuleStore::open(Config::rules_path(&dir))?;
            match command {
                RuleCommand::Add {
                    name,
                    local,
                    remote,
                    direction,
                    filters,
                } => {
                    let direction = Direction::from_str(&direction)?;
                    let rule = SyncRule::new(name, local, remote, direction).with_filters(filters);
                    let id = rule.id.clone();
                    rules.add(rule)?;
                    println!("{} rule {} added", "+".green().bold(), id);
                }
                RuleCommand::List => {
                    if rules.is_empty() {
                        println!("no sync rules configured");
                    }
                    for rule in rules.all() {
                        let state = if rule.enabled {
                            "enabled".green()
                        } else {
                            "disabled".red()
                        };
                        println!(
                            "{}  {}  {}  {} <-> {}  [{}]",
                            rule.id,
                            state,
                            rule.direction.as_str(),
                            rule.local_path.display(),
                            rule.remote_path,
                            rule.filters.join(", ")
                        );
                    }
                }
                RuleCommand::Remove { id } => {
                    rules.remove(&id)?;
                    println!("{} rule {} removed", "-".red().bold(), id);
                }
                RuleCommand::Enable { id } => {
                    rules.set_enabled(&id, true)?;
                    println!("rule {} enabled", id);
                }
                RuleCommand::Disable { id } => {
                    rules.set_enabled(&id, false)?;
                    println!("rule {} disabled", id);
                }
            }
        }

        Command::History { stats, clear } => {
            let mut history = HistoryLog::open(Config::history_path(&dir))?;
            if clear {
                history.clear()?;
                println!("history cleared");
            } else if stats {
                let s = history.stats();
                println!("passes:          {}", s.total_entries);
                println!(
                    "outcomes:        {} ok / {} partial / {} failed",
                    s.success_count, s.partial_count, s.failed_count
                );
                println!("files uploaded:  {}", s.total_uploaded);
                println!("files downloaded:{}", s.total_downloaded);
                println!("conflicts:       {}", s.total_conflicts);
                println!("errors:          {}", s.total_errors);
                println!("avg duration:    {:.0} ms", s.average_duration_ms);
                println!("success rate:    {:.0}%", s.success_rate * 100.0);
            } else {
                if history.is_empty() {
                    println!("no passes recorded");
                }
                for entry in history.entries().iter().rev() {
                    let outcome = match entry.status {
                        tether::PassOutcome::Success => entry.status.as_str().green(),
                        tether::PassOutcome::Partial => entry.status.as_str().yellow(),
                        tether::PassOutcome::Failed => entry.status.as_str().red(),
                    };
                    println!(
                        "{}  {}  {}  up {} / down {} / conflicts {} / errors {}  {} ms",
                        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        outcome,
                        entry.sync_mode.as_str(),
                        entry.files_uploaded,
                        entry.files_downloaded,
                        entry.conflict_count,
                        entry.error_count,
                        entry.duration_ms
                    );
                }
            }
        }

        Command::Conflicts => {
            let store = build_store(&config).await?;
            let rules = RuleStore::open(Config::rules_path(&dir))?;
            let detector = ConflictDetector::new(
                store.as_ref(),
                std::time::UNIX_EPOCH,
                tether::engine::DEFAULT_STORE_DEADLINE,
            );

            let mut found = false;
            for rule in rules.enabled() {
                for entry in detector.detect(&rule).await? {
                    found = true;
                    println!("{}", entry.path.display());
                }
            }
            if !found {
                println!("no conflicts detected");
            }
        }

        Command::Resolve { path, policy } => {
            let policy = ResolutionPolicy::from_str(&policy)?;
            let store = build_store(&config).await?;
            let rules = RuleStore::open(Config::rules_path(&dir))?;
            let all = rules.all().to_vec();

            let detector = ConflictDetector::new(
                store.as_ref(),
                std::time::UNIX_EPOCH,
                tether::engine::DEFAULT_STORE_DEADLINE,
            );
            let resolver = ConflictResolver::new(
                store.as_ref(),
                &all,
                tether::engine::DEFAULT_STORE_DEADLINE,
            );

            let mut resolved = false;
            for rule in rules.enabled() {
                for mut entry in detector.detect(&rule).await? {
                    if entry.path == path {
                        resolver.resolve_one(&mut entry, policy).await?;
                        println!(
                            "{} {} resolved as {}",
                            "ok".green().bold(),
                            path.display(),
                            policy.as_str()
                        );
                        resolved = true;
                    }
                }
            }
            if !resolved {
                bail!("no conflict recorded for path: {}", path.display());
            }
        }

        Command::Reports => {
            let reports = ReportStore::new(Config::reports_dir(&dir));
            let listed = reports.list()?;
            if listed.is_empty() {
                println!("no reports saved");
            }
            for path in listed {
                println!("{}", path.display());
            }
        }

        Command::Config { command } => match command {
            ConfigCommand::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigCommand::SetInterval { secs } => {
                config.sync.set_interval_secs(secs)?;
                config.save(&config_path)?;
                println!("interval set to {}s", secs);
            }
            ConfigCommand::SetMode { mode } => {
                config.sync.mode = SyncMode::from_str(&mode)?;
                config.save(&config_path)?;
                println!("mode set to {}", mode);
            }
            ConfigCommand::SetResolution { resolution } => {
                config.sync.default_resolution = DefaultResolution::from_str(&resolution)?;
                config.save(&config_path)?;
                println!("default resolution set to {}", resolution);
            }
            ConfigCommand::SetStore {
                bucket,
                region,
                endpoint,
            } => {
                config.store.bucket = bucket;
                config.store.region = region;
                config.store.endpoint = endpoint;
                config.store.enabled = true;
                config.save(&config_path)?;
                println!("object store configured");
            }
            ConfigCommand::Export { path } => {
                let rules = RuleStore::open(Config::rules_path(&dir))?;
                let export = ConfigExport {
                    sync: config.sync.clone(),
                    rules: rules.all().to_vec(),
                };
                export.write(&path)?;
                println!("configuration exported to {}", path.display());
            }
            ConfigCommand::Import { path } => {
                let export = ConfigExport::read(&path)?;
                config.sync = export.sync;
                config.save(&config_path)?;
                let mut rules = RuleStore::open(Config::rules_path(&dir))?;
                rules.replace_all(export.rules)?;
                println!("configuration imported from {}", path.display());
            }
        },
    }

    Ok(())
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<S3Store>> {
    if !config.store.enabled {
        bail!("object store not configured; run 'tether config set-store <bucket>' first");
    }
    let store = S3Store::new(
        config.store.bucket.clone(),
        config.store.region.clone(),
        config.store.endpoint.clone(),
    )
    .await?;
    if !store.bucket_exists().await? {
        store
            .create_bucket()
            .await
            .with_context(|| format!("bucket '{}' is not reachable", store.bucket()))?;
    }
    Ok(Arc::new(store))
}

async fn build_scheduler(config: &Config, dir: &std::path::Path) -> anyhow::Result<Scheduler> {
    let store = build_store(config).await?;
    let engine = ReconciliationEngine::new(store);
    let rules = RuleStore::open(Config::rules_path(dir))?;
    let history = HistoryLog::open(Config::history_path(dir))?;
    let reports = ReportStore::new(Config::reports_dir(dir));

    let scheduler = Scheduler::new(engine, rules, history, reports, config.sync.clone());
    scheduler.set_connected(true);
    Ok(scheduler)
}

fn print_status(status: &SyncStatus) {
    let outcome = if status.errors.is_empty() {
        "ok".green().bold()
    } else {
        "errors".red().bold()
    };
    println!(
        "{} {} mode: {} up, {} down, {} conflict(s)",
        outcome,
        status.mode.as_str(),
        status.files_uploaded,
        status.files_downloaded,
        status.conflict_count
    );
    for err in &status.errors {
        println!("  {} {}", "x".red(), err);
    }
}
