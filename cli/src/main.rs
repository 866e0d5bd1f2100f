use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use raredrop_core::export::{export_assignments, export_groups};
use raredrop_core::{
    CategoryRate, Engine, GroupingStrategy, RareCategory, RunHandle, SyncConfig,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LEVEL_DISTANCE: u32 = 10;

#[derive(Parser)]
#[command(
    name = "raredrop",
    version = "0.1.0",
    about = "CLI tool for rare drop assignment synchronization",
    long_about = None
)]
struct Cli {
    /// Path to SQLite database file
    #[arg(long, global = true, env = "RAREDROP_DATABASE", default_value = "./raredrop.sqlite")]
    database: std::path::PathBuf,

    /// Path to log file
    #[arg(long, global = true, default_value = "/tmp/raredrop.log")]
    log_file: std::path::PathBuf,

    /// Verbosity level (repeat for more verbose output)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Run configuration, from a TOML file and/or flags. Flags win over the file.
#[derive(Args)]
struct RunArgs {
    /// TOML file with the run configuration
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Start from the configuration detected in the database
    #[arg(long, conflicts_with = "config")]
    reuse_detected: bool,

    /// Seal of Star base probability (0.01 for 1%)
    #[arg(long)]
    star: Option<f64>,

    /// Seal of Moon base probability
    #[arg(long)]
    moon: Option<f64>,

    /// Seal of Sun base probability
    #[arg(long)]
    sun: Option<f64>,

    /// Level window radius around each monster
    #[arg(long)]
    level_distance: Option<u32>,

    /// Only pair monsters and items of the same region
    #[arg(long)]
    region_aware: bool,

    /// Monster level above which drop ratios decay (0 disables)
    #[arg(long)]
    level_threshold: Option<u32>,

    /// Percent decrease per level above the threshold (0 disables)
    #[arg(long)]
    decrease_pct: Option<f64>,

    /// One group per item level shared by all monsters in range
    #[arg(long)]
    shared_by_level: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace all rare drop groups and assignments
    Sync {
        #[command(flatten)]
        run: RunArgs,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
        /// Quiet mode (1=hide progress bar)
        #[arg(long, default_value_t = 0)]
        quiet: u8,
    },

    /// Compute the assignments a sync would write, without writing
    Plan {
        #[command(flatten)]
        run: RunArgs,
        /// Export planned assignments to CSV
        #[arg(long)]
        csv: Option<std::path::PathBuf>,
        /// Export planned group rows to CSV
        #[arg(long)]
        groups_csv: Option<std::path::PathBuf>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create or refresh the backup of both drop tables
    Backup {
        #[arg(long, default_value_t = 0)]
        quiet: u8,
    },

    /// Restore both drop tables from the backup
    Restore {
        #[arg(long, default_value_t = 0)]
        quiet: u8,
    },

    /// Show whether a backup exists and its size
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Detect the configuration behind the current rare drops
    Inspect {
        #[arg(long)]
        json: bool,
    },
}

fn setup_logging(verbose: u8, log_file: &std::path::Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let filter_level = match verbose {
        0 => tracing::Level::ERROR,
        1 => tracing::Level::WARN,
        2 => tracing::Level::INFO,
        3 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(filter_level.into());

    let file_appender = tracing_appender::rolling::never(
        log_file.parent().unwrap_or(std::path::Path::new(".")),
        log_file.file_name().unwrap_or(std::ffi::OsStr::new("raredrop.log")),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::Layer::new().with_writer(std::io::stderr).with_ansi(true))
        .with(fmt::Layer::new().with_writer(non_blocking).with_ansi(false));

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(guard)
}

fn build_config(engine: &Engine, args: &RunArgs) -> Result<SyncConfig> {
    let mut config = if let Some(path) = &args.config {
        if !path.exists() {
            anyhow::bail!("Sync config not found: {:?}", path);
        }
        SyncConfig::from_file(path)?
    } else if args.reuse_detected {
        let detected = engine.inspect()?;
        info!("Reusing detected configuration: {}", detected);
        detected
            .to_sync_config(DEFAULT_LEVEL_DISTANCE)
            .ok_or_else(|| anyhow::anyhow!("No existing configuration detected in the database"))?
    } else {
        SyncConfig::new(Vec::new(), DEFAULT_LEVEL_DISTANCE)
    };

    for (category, probability) in [
        (RareCategory::Star, args.star),
        (RareCategory::Moon, args.moon),
        (RareCategory::Sun, args.sun),
    ] {
        if let Some(probability) = probability {
            config.categories.retain(|rate| rate.category != category);
            config.categories.push(CategoryRate { category, probability });
        }
    }
    config.categories.sort_by_key(|rate| rate.category);

    if let Some(distance) = args.level_distance {
        config.level_distance = distance;
    }
    if args.region_aware {
        config.region_mixing = false;
    }
    if let Some(threshold) = args.level_threshold {
        config.level_threshold = threshold;
    }
    if let Some(pct) = args.decrease_pct {
        config.decrease_pct = pct;
    }
    if args.shared_by_level {
        config.grouping = GroupingStrategy::SharedByLevel;
    }

    if config.categories.is_empty() {
        anyhow::bail!("Enable at least one category with --star, --moon or --sun, or pass --config");
    }
    config.validate()?;
    Ok(config)
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Drain the progress stream into a bar (or the log when quiet), then wait for the outcome.
async fn follow<T>(mut handle: RunHandle<T>, quiet: u8) -> Result<T> {
    let pb = (quiet == 0).then(progress_bar);
    while let Some(event) = handle.progress.recv().await {
        match &pb {
            Some(pb) => {
                pb.set_position(u64::from(event.percent));
                pb.set_message(format!("{} ({})", event.message, event.eta));
            }
            None => info!("[{}%] {}", event.percent, event.message),
        }
    }
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    Ok(handle.finish().await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = setup_logging(cli.verbose, &cli.log_file)?;

    info!("Starting raredrop CLI");

    let engine = Engine::open(&cli.database)?;
    info!("Opened database {:?}", cli.database);

    match cli.command {
        Commands::Sync { run, json, quiet } => {
            let config = build_config(&engine, &run)?;
            info!(
                "Syncing {} categories, level distance {}, region mixing {}",
                config.categories.len(),
                config.level_distance,
                config.region_mixing
            );

            let summary = follow(engine.spawn_sync(config)?, quiet).await?;
            if json {
                println!("{}", summary.to_json()?);
            } else {
                println!("{}", summary);
            }
        }
        Commands::Plan { run, csv, groups_csv, json } => {
            let config = build_config(&engine, &run)?;
            let plan = engine.plan(&config)?;

            if let Some(path) = &csv {
                export_assignments(&plan, path)?;
            }
            if let Some(path) = &groups_csv {
                export_groups(&plan, path)?;
            }

            if json {
                let report = serde_json::json!({
                    "items_processed": plan.items_processed,
                    "groups": plan.groups.len(),
                    "group_rows": plan.group_rows(),
                    "assignments": plan.assignments.len(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("--- Plan (no changes written) ---");
                println!("Items processed: {}", plan.items_processed);
                println!("Groups: {} ({} rows)", plan.groups.len(), plan.group_rows());
                println!("Assignments: {}", plan.assignments.len());
            }
        }
        Commands::Backup { quiet } => {
            let counts = follow(engine.spawn_backup()?, quiet).await?;
            println!(
                "Backup created: {} group rows, {} assignment rows",
                counts.group_rows, counts.assignment_rows
            );
        }
        Commands::Restore { quiet } => {
            let counts = follow(engine.spawn_restore()?, quiet).await?;
            println!(
                "Restored {} group rows and {} assignment rows",
                counts.group_rows, counts.assignment_rows
            );
        }
        Commands::Status { json } => {
            let status = engine.backup_status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else if let Some(counts) = status.counts {
                println!(
                    "Backup exists: {} group rows, {} assignment rows",
                    counts.group_rows, counts.assignment_rows
                );
            } else {
                println!(
                    "No backup (group backup: {}, assignment backup: {})",
                    status.group_backup, status.assignment_backup
                );
            }
        }
        Commands::Inspect { json } => {
            let detected = engine.inspect()?;
            if json {
                println!("{}", detected.to_json()?);
            } else {
                println!("{}", detected);
            }
        }
    }

    info!("raredrop CLI finished");
    Ok(())
}
