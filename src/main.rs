// src/main.rs - Platform middleware service entry point
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use platform_middleware::{
    load_config, Middleware, StewartTransform, TcpEffectorLink, TracingStatusSink,
};

#[derive(Debug, Parser)]
#[command(name = "platform-middleware", version, about = "Motion platform command middleware")]
struct Cli {
    /// Startup configuration file
    #[arg(short, long, default_value = "middleware.toml")]
    config: PathBuf,
    #[arg(long)]
    effector_ip: Option<String>,
    #[arg(long)]
    effector_port: Option<u16>,
    #[arg(long)]
    watcher_port: Option<u16>,
    /// Port clients connect to
    #[arg(long)]
    listen_port: Option<u16>,
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .init();

    tracing::info!("Starting platform middleware {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loading configuration from: {}", cli.config.display());

    let mut config = load_config(&cli.config);
    if let Some(ip) = cli.effector_ip {
        config.effector_ip = ip;
    }
    if let Some(port) = cli.effector_port {
        config.effector_port = port;
    }
    if let Some(port) = cli.watcher_port {
        config.watcher_port = port;
    }
    if let Some(port) = cli.listen_port {
        config.listen_port = port;
    }

    let mut middleware = Middleware::new(
        config,
        TcpEffectorLink::new(),
        Box::new(StewartTransform::new()),
        Arc::new(TracingStatusSink),
    );

    let result = tokio::select! {
        res = async {
            middleware.start().await?;
            middleware.run().await
        } => res,
        signal = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received");
            signal.map_err(Into::into)
        }
    };

    // Runs on every exit path, including startup failures.
    middleware.shutdown().await;

    if let Err(e) = result {
        tracing::error!("Platform middleware failed: {}", e);
        return Err(e.into());
    }
    tracing::info!("Finished");
    Ok(())
}
