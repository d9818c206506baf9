//! FuzzRun Control Plane Server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fuzzrun_control_plane::{http, Config, FuzzService};

/// FuzzRun control plane: supervises fuzzing engines and serves the task API.
#[derive(Parser, Debug)]
#[command(name = "fuzzrun-control-plane", about = "FuzzRun fuzzing task control plane")]
struct Args {
    /// Root directory for task descriptors, outputs and seeds
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// HTTP server address
    #[arg(long, default_value = "127.0.0.1:5000")]
    http_addr: String,

    /// Fuzzing engine executable
    #[arg(long, default_value = "/usr/local/bin/afl-fuzz")]
    engine: PathBuf,

    /// Default per-execution timeout in milliseconds
    #[arg(long, default_value = "1000")]
    timeout_ms: u64,

    /// Disable binary-only instrumentation for prebuilt targets
    #[arg(long)]
    no_qemu: bool,

    /// Maximum engine instances per task
    #[arg(long, default_value = "10")]
    max_instances: u32,

    /// Seconds to wait for an engine to exit before killing it
    #[arg(long, default_value = "5")]
    stop_grace_secs: u64,
}

impl Args {
    fn into_config(self) -> Config {
        let mut config = Config::with_data_root(&self.data_dir)
            .with_engine_path(self.engine)
            .with_stop_grace(Duration::from_secs(self.stop_grace_secs));
        config.http_bind_addr = self.http_addr;
        config.default_timeout_ms = self.timeout_ms;
        config.qemu_mode = !self.no_qemu;
        config.max_instances = self.max_instances;
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("fuzzrun=info".parse()?))
        .with_target(true)
        .init();

    let config = args.into_config();
    let http_addr: SocketAddr = config.http_bind_addr.parse()?;

    info!(
        tasks_dir = %config.tasks_dir.display(),
        engine = %config.engine_path.display(),
        "Starting FuzzRun control plane"
    );

    // A data root we cannot write is the only fatal startup condition
    let service = FuzzService::open(config).await?;

    let http_router = http::create_router(service.clone());
    let http_listener = TcpListener::bind(http_addr).await?;
    info!("HTTP server listening on {}", http_addr);

    axum::serve(http_listener, http_router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.shutdown().await;
    info!("FuzzRun control plane stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
