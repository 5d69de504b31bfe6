use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use hist_index::config::IndexConfig;
use hist_index::index::Index;
use hist_index::query::QueryServer;
use hist_index::stats::KeySpaceStats;
use hist_index::storage::{MemoryStore, SnapshotStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "hist-index")]
#[command(about = "Full-text index over browsing history and bookmarks", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// 加载快照并启动 HTTP 查询服务
    Serve {
        /// TOML 配置文件
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        port: Option<u16>,
        /// 覆盖配置中的快照路径
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hist-index")
        .join("config.toml")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Serve {
            config,
            port,
            snapshot,
        } => serve(config, port, snapshot).await,
    }
}

async fn serve(
    config: Option<PathBuf>,
    port: Option<u16>,
    snapshot: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut cfg = IndexConfig::load(&config.unwrap_or_else(default_config_path))?;
    if let Some(port) = port {
        cfg.http_port = port;
    }
    if let Some(path) = snapshot {
        cfg.snapshot_path = path;
    }

    info!("Starting hist-index");

    let snapshots = SnapshotStore::new(cfg.snapshot_path.clone());
    let store = match snapshots.load_if_valid().await? {
        Some(store) => store,
        None => {
            info!("No usable snapshot at {:?}, starting empty", snapshots.path());
            MemoryStore::new()
        }
    };

    let port = cfg.http_port;
    let interval_secs = cfg.snapshot_interval_secs;
    let index = Index::open(store.clone(), cfg);
    info!("\n{}", KeySpaceStats::collect(&index).await?);

    // 定期快照
    if interval_secs > 0 {
        let snapshots = snapshots.clone();
        let store = store.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = snapshots.write_atomic(&store).await {
                    warn!("Periodic snapshot failed: {}", e);
                }
            }
        });
    }

    // 启动查询服务 (HTTP)
    let server = QueryServer::new(index.clone());
    tokio::spawn(async move {
        if let Err(e) = server.run(port).await {
            warn!("Query server stopped: {}", e);
        }
    });

    info!(
        "hist-index ready. Query via: http://localhost:{}/search?q=keyword",
        port
    );

    // 优雅退出处理
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    index.flush().await?;
    snapshots.write_atomic(&store).await?;
    store.close();

    Ok(())
}
