use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pakwatch::{
    AssetWatcher, BucketHashMap, CommandTools, EventCoalescer, RebuildOrchestrator, ToolConfig,
    WatchPaths, CONFIG_ENV_VAR,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Watches an extracted asset tree and rebuilds paks and the DAT archive on change.
#[derive(Debug, Parser)]
#[command(name = "pakwatch", version)]
struct Cli {
    /// Extracted asset directory to watch recursively.
    watch_dir: PathBuf,

    /// DAT archive to regenerate. Export is skipped when omitted.
    archive: Option<PathBuf>,

    /// JSON file with tool command templates and the debounce period.
    #[arg(long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Quiet period before a batch of changes is processed.
    #[arg(long)]
    debounce_ms: Option<u64>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = ToolConfig::load(cli.config.as_deref()).context("loading tool config")?;
    if let Some(debounce_ms) = cli.debounce_ms {
        config.debounce_ms = debounce_ms;
    }
    let paths = WatchPaths::resolve(&cli.watch_dir, cli.archive.as_deref())
        .context("resolving watch paths")?;
    info!(
        root = %paths.watch_root.display(),
        archive = ?paths.archive_output,
        debounce_ms = config.debounce_ms,
        "pakwatch_starting"
    );

    let orchestrator = RebuildOrchestrator::new(
        paths.watch_root.clone(),
        paths.archive_output.clone(),
        CommandTools::from_config(&config),
        BucketHashMap,
    );
    let coalescer = EventCoalescer::spawn(config.debounce(), orchestrator)
        .context("starting change coalescer")?;
    let watcher = AssetWatcher::start(&paths.watch_root, coalescer.notifier())
        .context("starting filesystem watcher")?;

    wait_for_interrupt()?;

    info!(root = %watcher.root().display(), "pakwatch_stopping");
    drop(watcher);
    coalescer.shutdown();
    Ok(())
}

fn wait_for_interrupt() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("listening for ctrl-c")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
