use clap::Parser;
use shadowvec_api::{ApiState, RestApi};
use shadowvec_core::EventBus;
use shadowvec_search::{QueryEngine, QueryEngineConfig};
use shadowvec_storage::{MemoryRecordStore, MutationSynchronizer, ShadowIndex, ShadowPool, ShadowPoolConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Shadow vector index server
#[derive(Parser, Debug)]
#[command(name = "shadowvec")]
#[command(about = "Nearest-neighbor search over a primary record store", long_about = None)]
struct Args {
    /// Path to the data directory
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// HTTP API port
    #[arg(long, default_value_t = 8090)]
    http_port: u16,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Concurrent operations on the shadow index read path
    #[arg(long, default_value_t = 16)]
    max_readers: usize,

    /// Idle seconds before stale shadow index readers are reclaimed
    #[arg(long, default_value_t = 300)]
    idle_timeout_secs: u64,

    /// Deadline in seconds for searches and synchronization writes
    #[arg(long, default_value_t = 30)]
    query_timeout_secs: u64,

    /// Ceiling on results per search
    #[arg(long, default_value_t = shadowvec_search::MAX_SEARCH_RESULTS)]
    max_search_results: usize,

    /// Bearer token granting administrator access
    #[arg(long)]
    admin_token: Option<String>,

    /// LMDB map size in megabytes
    #[arg(long, default_value_t = 10 * 1024)]
    map_size_mb: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting shadowvec v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", args.data_dir);
    info!("HTTP API port: {}", args.http_port);

    let pool_config = ShadowPoolConfig {
        max_readers: args.max_readers.max(1),
        idle_timeout: Duration::from_secs(args.idle_timeout_secs),
        map_size: args.map_size_mb * 1024 * 1024,
        // Records live in memory and their row ids restart with the process.
        reset_on_open: true,
        ..ShadowPoolConfig::default()
    };
    let pool = Arc::new(ShadowPool::open(args.data_dir.join("shadow"), pool_config)?);
    let reaper = pool.spawn_idle_reaper();
    let index = ShadowIndex::new(pool.clone());
    info!("Shadow index initialized");

    let query_timeout = Duration::from_secs(args.query_timeout_secs);
    let bus = Arc::new(EventBus::new());
    let store = Arc::new(MemoryRecordStore::new(bus.clone()));
    Arc::new(MutationSynchronizer::new(store.clone(), index.clone(), query_timeout)).register(&bus);

    let engine = Arc::new(QueryEngine::new(
        store.clone(),
        index.clone(),
        QueryEngineConfig {
            max_results: args.max_search_results,
            timeout: query_timeout,
        },
    ));

    if args.admin_token.is_none() {
        info!("No admin token configured, admin endpoints are disabled");
    }
    let state = ApiState {
        store,
        engine,
        index,
        admin_token: args.admin_token.clone(),
    };

    let http_port = args.http_port;
    let http_handle = std::thread::spawn(move || {
        info!("Starting HTTP server on port {}", http_port);
        let sys = actix_web::rt::System::new();
        sys.block_on(async {
            if let Err(e) = RestApi::start(state, http_port).await {
                tracing::error!("HTTP server error: {}", e);
            }
        })
    });

    info!("shadowvec started successfully");
    info!("HTTP API: http://localhost:{}/api/", args.http_port);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = tokio::task::spawn_blocking(move || {
            http_handle.join().ok();
        }) => {
            info!("HTTP server stopped");
        }
    }

    info!("Shutting down...");
    bus.shutdown().await;
    reaper.abort();
    pool.close().await;
    Ok(())
}
