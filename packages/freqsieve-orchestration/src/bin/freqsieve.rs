//! freqsieve CLI
//!
//! # Usage
//!
//! ```bash
//! # Run partition 3 of 8 for a target (resumes from its checkpoint)
//! freqsieve run --target "2**61 - 1" --partitions 8 --partition 3 --block-size 100000
//!
//! # Run every partition of the job in this process, stopping after 10 minutes
//! freqsieve run --target 1022117 --partitions 4 --time-budget-secs 600
//!
//! # Aggregate markers and logs
//! freqsieve status --target 1022117 --partitions 4
//!
//! # Bundle pending partition logs now
//! freqsieve archive --target 1022117 --force
//!
//! # Primes in a range on a worker pool
//! freqsieve sieve --start 1000 --end 2000 --workers 4
//!
//! # Single-process check with collision listing
//! freqsieve check --target 85085 --explore 20
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use freqsieve_core::config::SieveConfig;
use freqsieve_core::{
    explore, is_prime_frequency, Collision, CollisionContext, IntervalSieve, Prefilter,
    PrefilterOutcome, Target,
};
use freqsieve_orchestration::{
    progress_channel, ArchiveTrigger, CancellationToken, JobStatus, JobVerdict, PartitionRunner,
    ProgressEvent, RunOutcome, RunnerConfig,
};
use freqsieve_storage::{FsPartitionStore, JobKey, PartitionStore, ReplacePolicy};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "freqsieve")]
#[command(
    about = "Partitioned, resumable frequency-collision primality verification",
    long_about = None
)]
struct Cli {
    /// Verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct StoreArgs {
    /// YAML configuration file (version 1)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage root (overrides storage.root)
    #[arg(long)]
    state_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one partition, or every partition of the job
    Run {
        /// Target integer or expression (e.g. "2**127 - 1")
        #[arg(short, long)]
        target: String,

        /// Total number of partitions
        #[arg(short = 'n', long, default_value = "1")]
        partitions: u32,

        /// Partition to run (default: all)
        #[arg(short, long)]
        partition: Option<u32>,

        /// Candidate indices per block
        #[arg(short, long, default_value = "10000")]
        block_size: u64,

        /// Also exclude 5 and 7 up front
        #[arg(long)]
        hardened: bool,

        /// Stop between blocks after this many seconds
        #[arg(long)]
        time_budget_secs: Option<u64>,

        /// Stop after scanning this many blocks per partition
        #[arg(long)]
        max_blocks: Option<u64>,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Show the aggregated verdict of a job
    Status {
        #[arg(short, long)]
        target: String,

        #[arg(short = 'n', long, default_value = "1")]
        partitions: u32,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Archive pending partition logs
    Archive {
        #[arg(short, long)]
        target: String,

        /// Archive even below the configured threshold
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// List primes in [start, end] on a fixed-size worker pool
    Sieve {
        #[arg(long)]
        start: u64,

        #[arg(long)]
        end: u64,

        /// Worker threads (0 = one per core)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Numbers per task
        #[arg(short, long)]
        block_size: Option<u64>,

        /// YAML configuration file (version 1)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Check a target in a single process
    Check {
        #[arg(short, long)]
        target: String,

        /// List up to N collisions instead of stopping at the first
        #[arg(long)]
        explore: Option<usize>,

        #[arg(long)]
        hardened: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<SieveConfig> {
    match path {
        Some(path) => SieveConfig::from_yaml(path)
            .with_context(|| format!("loading configuration {}", path.display())),
        None => Ok(SieveConfig::default()),
    }
}

fn open_store(args: &StoreArgs) -> anyhow::Result<(SieveConfig, Arc<FsPartitionStore>)> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(dir) = &args.state_dir {
        config.storage.root = dir.clone();
    }
    let store = FsPartitionStore::new(
        config.storage.root.clone(),
        ReplacePolicy::from_settings(&config.checkpoint),
    );
    Ok((config, Arc::new(store)))
}

fn parse_target(input: &str) -> anyhow::Result<Target> {
    input
        .parse::<Target>()
        .with_context(|| format!("parsing target '{}'", input))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            target,
            partitions,
            partition,
            block_size,
            hardened,
            time_budget_secs,
            max_blocks,
            store,
        } => {
            run_partitions(
                &target,
                partitions,
                partition,
                block_size,
                hardened,
                time_budget_secs,
                max_blocks,
                &store,
            )
            .await
        }
        Commands::Status {
            target,
            partitions,
            json,
            store,
        } => show_status(&target, partitions, json, &store).await,
        Commands::Archive {
            target,
            force,
            store,
        } => archive_logs(&target, force, &store).await,
        Commands::Sieve {
            start,
            end,
            workers,
            block_size,
            config,
        } => run_sieve(start, end, workers, block_size, config.as_ref()).await,
        Commands::Check {
            target,
            explore,
            hardened,
        } => check_target(&target, explore, hardened),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_partitions(
    target: &str,
    partitions: u32,
    partition: Option<u32>,
    block_size: u64,
    hardened: bool,
    time_budget_secs: Option<u64>,
    max_blocks: Option<u64>,
    store_args: &StoreArgs,
) -> anyhow::Result<()> {
    let target = parse_target(target)?;
    let (config, store) = open_store(store_args)?;
    let prefilter = if hardened {
        Prefilter::hardened()
    } else {
        config.prefilter()?
    };
    let trigger = ArchiveTrigger::new(store.clone(), config.archive.threshold);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current block");
                cancel.cancel();
            }
        });
    }
    if let Some(secs) = time_budget_secs {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            info!("Time budget of {}s spent, stopping after the current block", secs);
            cancel.cancel();
        });
    }

    let (progress, mut events) = progress_channel();
    let ids: Vec<u32> = match partition {
        Some(id) => vec![id],
        None => (0..partitions).collect(),
    };

    let mut handles = Vec::with_capacity(ids.len());
    for id in ids {
        let mut runner_config =
            RunnerConfig::new(id, partitions, block_size).with_prefilter(prefilter.clone());
        if let Some(max) = max_blocks {
            runner_config = runner_config.with_max_blocks(max);
        }
        let runner = PartitionRunner::new(target.clone(), runner_config, store.clone())?
            .with_progress(progress.clone())
            .with_archive_trigger(trigger.clone());
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move { runner.run(cancel).await }));
    }
    drop(progress);

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let ProgressEvent::BlockCompleted {
                partition_id,
                block,
                total_blocks,
            } = event
            {
                println!(
                    "partition {}: block {}/{} clear",
                    partition_id,
                    block + 1u32,
                    total_blocks
                );
            }
        }
    });

    let mut aborted = 0;
    for handle in handles {
        match handle.await.context("partition task panicked")? {
            Ok(report) => match report.outcome {
                RunOutcome::Completed => println!(
                    "partition {}: completed ({} blocks scanned this run)",
                    report.partition_id, report.blocks_scanned
                ),
                RunOutcome::CompositeFound(marker) => println!(
                    "partition {}: COMPOSITE, {} = {} x {}",
                    report.partition_id, target, marker.factor, marker.cofactor
                ),
                RunOutcome::Interrupted { resume_block } => println!(
                    "partition {}: interrupted, resumes at block {}",
                    report.partition_id, resume_block
                ),
            },
            Err(err) => {
                error!("{} (invariant: {})", err, err.failed_invariant());
                aborted += 1;
            }
        }
    }
    let _ = printer.await;

    if aborted > 0 {
        bail!("{} partition run(s) aborted", aborted);
    }
    Ok(())
}

async fn show_status(
    target: &str,
    partitions: u32,
    json: bool,
    store_args: &StoreArgs,
) -> anyhow::Result<()> {
    let target = parse_target(target)?;
    let (_, store) = open_store(store_args)?;
    let status = JobStatus::collect(store.as_ref(), &target, partitions).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("job {} (target {})", status.job, status.target);
    match &status.verdict {
        JobVerdict::Composite { markers } => {
            for marker in markers {
                println!(
                    "  COMPOSITE: partition {} found {} x {} ({:?})",
                    marker.partition_id, marker.factor, marker.cofactor, marker.source
                );
            }
        }
        JobVerdict::ProbablePrime => {
            println!("  all {} partitions completed: no collision found", partitions)
        }
        JobVerdict::Incomplete { missing } => {
            println!("  incomplete: partitions {:?} not finished", missing)
        }
    }
    println!(
        "  logs: {} pending, {} archived",
        status.pending_logs, status.archived_logs
    );
    Ok(())
}

async fn archive_logs(target: &str, force: bool, store_args: &StoreArgs) -> anyhow::Result<()> {
    let target = parse_target(target)?;
    let (config, store) = open_store(store_args)?;
    let job = JobKey::for_target(&target);
    let trigger = ArchiveTrigger::new(store.clone(), config.archive.threshold);

    let summary = if force {
        trigger.force(&job).await?
    } else {
        trigger.maybe_archive(&job).await?
    };

    match summary {
        Some(summary) => println!("archived {} logs into {}", summary.logs, summary.archive),
        None => println!(
            "nothing archived ({} logs pending, threshold {})",
            store.pending_log_count(&job).await?,
            trigger.threshold()
        ),
    }
    Ok(())
}

async fn run_sieve(
    start: u64,
    end: u64,
    workers: Option<usize>,
    block_size: Option<u64>,
    config: Option<&PathBuf>,
) -> anyhow::Result<()> {
    if start > end {
        bail!("start {} is greater than end {}", start, end);
    }
    let config = load_config(config)?;
    let sieve = IntervalSieve::new(
        workers.unwrap_or(config.pool.workers),
        block_size.unwrap_or(config.pool.block_size),
        config.prefilter()?,
    )?;

    let primes = tokio::task::spawn_blocking(move || sieve.primes_in(start, end)).await??;
    for p in &primes {
        println!("{}", p);
    }
    info!("{} primes in [{}, {}]", primes.len(), start, end);
    Ok(())
}

fn check_target(target: &str, explore_limit: Option<usize>, hardened: bool) -> anyhow::Result<()> {
    let target = parse_target(target)?;
    let prefilter = if hardened {
        Prefilter::hardened()
    } else {
        Prefilter::standard()
    };

    if let Some(max) = explore_limit {
        match prefilter.classify(&target) {
            PrefilterOutcome::NeedsScan => {
                let ctx = CollisionContext::new(&target)?;
                let found = explore(&ctx, max);
                println!(
                    "{}: {} collision(s) within index limit {}",
                    target,
                    found.len(),
                    ctx.limit()
                );
                for hit in found {
                    let Collision {
                        index,
                        lane,
                        factor,
                    } = &hit.collision;
                    println!(
                        "  c={} lane {:?} factor {} k={}",
                        index, lane, factor, hit.multiplier
                    );
                }
                return Ok(());
            }
            outcome => println!("{}: decided by prefilter ({:?})", target, outcome),
        }
    }

    if is_prime_frequency(&target, &prefilter)? {
        println!("{} is prime (no collision)", target);
    } else {
        println!("{} is composite", target);
    }
    Ok(())
}
