//! PoolAgent - Per-Destination Connection Pooling
//!
//! This is the main entry point for the poolagent binary. It drives a burst
//! of concurrent requests at one destination through a pool of TCP
//! connections and reports how the pool served them.

use anyhow::Result;
use clap::Parser;
use poolagent::config::{load_config, Config};
use poolagent::transport::{Connection, TcpConnector};
use poolagent::{PoolAgent, PoolAgentError, PoolKey};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// PoolAgent - exercise a per-destination TCP connection pool
#[derive(Parser, Debug)]
#[command(name = "poolagent")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Destination as host:port
    target: PoolKey,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of concurrent requests to issue
    #[arg(short = 'n', long, default_value_t = 10)]
    requests: usize,

    /// How long each request holds its connection, in milliseconds
    #[arg(long, default_value_t = 100)]
    hold_ms: u64,

    /// Override the configured per-destination connection limit
    #[arg(long)]
    max_sockets: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let mut config = match &args.config {
        Some(path) => {
            let config = load_config(path)?;
            info!("Configuration loaded from: {:?}", path);
            config
        }
        None => Config::default(),
    };
    if let Some(max_sockets) = args.max_sockets {
        config.pool.max_sockets = max_sockets;
    }

    info!("PoolAgent v{}", poolagent::VERSION);
    info!(
        "Target: {}, requests: {}, hold: {}ms, max_sockets: {}",
        args.target, args.requests, args.hold_ms, config.pool.max_sockets
    );

    let connector = TcpConnector::from_config(&config.transport);
    let agent = PoolAgent::new(config.pool, connector)?;

    tokio::select! {
        result = run_requests(&agent, &args.target, args.requests, Duration::from_millis(args.hold_ms)) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    agent.log_health();
    let stats = agent.stats();
    info!(
        "Done: created={}, reused={}, queued={}, handoffs={}, closed={}",
        stats.total_created,
        stats.total_reused,
        stats.total_queued,
        stats.total_handoffs,
        stats.total_closed
    );

    agent.shutdown();
    Ok(())
}

/// Issue `count` concurrent requests, each holding its connection for `hold`
async fn run_requests(
    agent: &PoolAgent<TcpConnector>,
    target: &PoolKey,
    count: usize,
    hold: Duration,
) -> Result<()> {
    let mut tasks = JoinSet::new();

    for n in 0..count {
        let agent = agent.clone();
        let target = target.clone();

        tasks.spawn(async move {
            let started = Instant::now();
            let conn = agent.acquire(target.host(), target.port()).await?;
            let waited = started.elapsed();

            let connected = conn.lock().await.is_some();
            if !connected {
                warn!("Request {} could not reach {}", n, target);
                return Ok::<_, PoolAgentError>(());
            }

            debug!("Request {} got a connection after {:?}", n, waited);
            tokio::time::sleep(hold).await;
            conn.release();
            Ok(())
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined? {
            warn!("Request failed: {}", e);
        }
    }

    Ok(())
}

/// Setup logging based on configuration
///
/// `RUST_LOG` takes precedence over `--log-level` when set.
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    Ok(())
}
