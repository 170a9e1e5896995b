use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::info;

use timetrack_core::api::{router, AppState};
use timetrack_core::store::init_db;

const DEFAULT_PORT: u16 = 17700;

#[derive(Parser, Debug)]
#[command(name = "timetrack_core", version)]
struct Args {
    /// Address for the local API, e.g. 127.0.0.1:17700
    #[arg(long, default_value = "127.0.0.1:17700")]
    listen: String,

    /// SQLite database file. Parent directories are created.
    #[arg(long, default_value = "./data/timetrack.db")]
    db: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timetrack_core=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    if let Some(parent) = args.db.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(&args.db)?;
    init_db(&conn)?;

    let app = router(AppState {
        conn: Arc::new(Mutex::new(conn)),
    });

    let addr = parse_listen(&args.listen)?;
    info!("listening on http://{addr}");
    info!("db: {}", args.db.display());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Accepts `ip:port`, a bare ip, `localhost` or `localhost:port`.
fn parse_listen(input: &str) -> anyhow::Result<SocketAddr> {
    let input = input.trim();
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = input.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    let loopback = IpAddr::from([127, 0, 0, 1]);
    if input == "localhost" {
        return Ok(SocketAddr::new(loopback, DEFAULT_PORT));
    }
    if let Some(port) = input.strip_prefix("localhost:") {
        let port: u16 = port.parse().map_err(|_| {
            anyhow::anyhow!("invalid --listen '{input}': bad port, e.g. localhost:{DEFAULT_PORT}")
        })?;
        return Ok(SocketAddr::new(loopback, port));
    }

    anyhow::bail!("invalid --listen '{input}'. Use ip:port (e.g. 127.0.0.1:{DEFAULT_PORT}) or ip")
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}
