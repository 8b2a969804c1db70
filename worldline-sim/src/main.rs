//! worldline-sim: run a registered pipeline against a new, resumed or forked world.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::Parser;
use tracing::info;

use worldline_sim::{parse_params, SimConfig, SimulationRequest, Simulator, WorldSource};
use worldline_store::{KvSnapshotStore, SledBackend, SnapshotStore};

#[derive(Parser)]
#[command(name = "worldline-sim")]
#[command(about = "Execute functor pipelines against versioned worlds")]
struct Cli {
    /// Pipeline to run
    #[arg(long, default_value = "conway-game-of-life")]
    pipeline_id: String,

    /// Resume from a saved frame
    #[arg(long, conflicts_with = "from_archive")]
    from_frame: Option<PathBuf>,

    /// Fork a saved world archive with the given params
    #[arg(long)]
    from_archive: Option<PathBuf>,

    /// Pipeline parameters as key=value
    #[arg(long, num_args = 1..)]
    params: Vec<String>,

    /// List registered pipelines and exit
    #[arg(long)]
    list: bool,

    /// Log every step at info level
    #[arg(short, long)]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "worldline.yaml")]
    config: String,

    /// Root directory for world archives (overrides config file)
    #[arg(long, env = "WORLDLINE_OUTPUT_ROOT")]
    output_root: Option<String>,

    /// Write archives without gzip
    #[arg(long)]
    no_compress: bool,

    /// Sled database for the snapshot store (overrides config file)
    #[arg(long, env = "WORLDLINE_STORE_PATH")]
    store_path: Option<String>,

    /// Fork the prepared world this many times and run the forks concurrently
    #[arg(long, default_value_t = 0)]
    branches: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("worldline=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = SimConfig::load_or_default(&cli.config)?;

    // Apply CLI overrides
    if cli.verbose {
        config.simulator.verbose = true;
    }
    if cli.no_compress {
        config.simulator.compress = false;
    }
    if let Some(output_root) = cli.output_root {
        config.simulator.output_root = output_root;
    }
    if let Some(store_path) = cli.store_path {
        config.store.db_path = Some(store_path);
    }

    let mut simulator = Simulator::new(config.clone());

    if cli.list {
        println!("Available pipelines:");
        for pipeline in simulator.registry().list() {
            println!("  {:<24} {}", pipeline.id(), pipeline.label());
            if !pipeline.description().is_empty() {
                println!("  {:<24} {}", "", pipeline.description());
            }
        }
        return Ok(());
    }

    let mut sled = None;
    if let Some(db_path) = &config.store.db_path {
        info!(path = %db_path, namespace = %config.store.namespace, "Opening snapshot store");
        let backend = Arc::new(SledBackend::open(db_path)?);
        let store = KvSnapshotStore::new(Arc::clone(&backend), config.store.namespace.clone())
            .with_compression(config.store.compress_frames);
        let store: Arc<dyn SnapshotStore> = Arc::new(store);
        simulator = simulator.with_store(store);
        sled = Some(backend);
    }

    let source = match (cli.from_frame, cli.from_archive) {
        (Some(_), Some(_)) => bail!("--from-frame and --from-archive are mutually exclusive"),
        (Some(frame), None) => WorldSource::Frame(frame),
        (None, Some(archive)) => WorldSource::Archive(archive),
        (None, None) => WorldSource::New,
    };

    let request = SimulationRequest::new(cli.pipeline_id)
        .with_source(source)
        .with_params(parse_params(&cli.params)?)
        .with_branches(cli.branches);

    let reports = simulator.run(&request).await?;

    if let Some(backend) = sled {
        backend.flush().await?;
    }

    for report in &reports {
        if let Some(path) = report.archive_path() {
            println!("World archive: {path}");
        }
        println!("{}", report.summary);
        println!(
            "  actions: {}  duration: {}ms",
            report.result.actions.len(),
            report.result.duration_ms
        );
    }

    Ok(())
}
