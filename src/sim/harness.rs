//! Bench harness: an effector emulator and a scripted middleware client.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use platform_middleware::PlatformGeometry;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Simulation Harness CLI
#[derive(Parser, Debug)]
#[command(name = "sim-harness", about = "Effector emulator and test client for the platform middleware.")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pretend to be the platform: answer geometry, log moves
    Effector {
        #[arg(long, default_value_t = 10003)]
        port: u16,
        #[arg(long, default_value_t = 10004)]
        watcher_port: u16,
        #[arg(long, default_value = "Emulated Platform")]
        name: String,
    },
    /// Drive the middleware with a config line, an activation and a yaw sweep
    Client {
        #[arg(long, default_value = "127.0.0.1:10002")]
        addr: SocketAddr,
        #[arg(long, default_value_t = 50.0)]
        rate_hz: f64,
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
    },
}

type HarnessResult = Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>;

async fn serve_effector(stream: TcpStream, peer: SocketAddr, name: String) -> HarnessResult {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        let request: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("{}: bad request {} ({})", peer, line, e);
                continue;
            }
        };
        match request["method"].as_str() {
            Some("geometry") => {
                let mut result = serde_json::to_value(PlatformGeometry::default())?;
                result["name"] = json!(name);
                let reply = json!({ "jsonrpc": "2.0", "id": request["id"], "result": result });
                write.write_all(format!("{}\n", reply).as_bytes()).await?;
                tracing::info!("{}: sent geometry", peer);
            }
            Some("move") => tracing::info!("{}: lengths {}", peer, request["params"]["lengths"]),
            Some("activate") => tracing::info!("{}: activate {}", peer, request["params"]["active"]),
            other => tracing::warn!("{}: unknown method {:?}", peer, other),
        }
    }
    tracing::info!("{}: disconnected", peer);
    Ok(())
}

async fn serve_watcher(stream: TcpStream, peer: SocketAddr) -> HarnessResult {
    let mut lines = BufReader::new(stream).lines();
    let mut events = 0u64;
    while lines.next_line().await?.is_some() {
        events += 1;
    }
    tracing::info!("watcher {}: {} events mirrored", peer, events);
    Ok(())
}

async fn run_effector(port: u16, watcher_port: u16, name: String) -> HarnessResult {
    let effector = TcpListener::bind(("0.0.0.0", port)).await?;
    let watcher = TcpListener::bind(("0.0.0.0", watcher_port)).await?;
    tracing::info!("Emulated effector '{}' on port {}, watcher on {}", name, port, watcher_port);
    loop {
        tokio::select! {
            conn = effector.accept() => {
                let (stream, peer) = conn?;
                let name = name.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_effector(stream, peer, name).await {
                        tracing::error!("{}: {}", peer, e);
                    }
                });
            }
            conn = watcher.accept() => {
                let (stream, peer) = conn?;
                tokio::spawn(async move {
                    if let Err(e) = serve_watcher(stream, peer).await {
                        tracing::error!("watcher {}: {}", peer, e);
                    }
                });
            }
        }
    }
}

async fn send(stream: &mut TcpStream, msg: Value) -> std::io::Result<()> {
    stream.write_all(format!("{}\n", msg).as_bytes()).await
}

async fn run_client(addr: SocketAddr, rate_hz: f64, seconds: f64) -> HarnessResult {
    let mut stream = TcpStream::connect(addr).await?;
    tracing::info!("Connected to middleware at {}", addr);

    send(&mut stream, json!({ "method": "config", "gain": 1.0, "washoutYaw": 0.996 })).await?;
    send(&mut stream, json!({ "method": "activate", "active": true })).await?;

    let period = Duration::from_secs_f64(1.0 / rate_hz.max(1.0));
    let samples = (seconds * rate_hz).max(0.0) as u64;
    let mut ticker = tokio::time::interval(period);
    for i in 0..samples {
        ticker.tick().await;
        let t = i as f64 * period.as_secs_f64();
        // slow yaw sweep that crosses the +/-1 wrap point
        let yaw = ((t * 0.25).fract() * 2.0 - 1.0) as f32;
        let surge = (0.3 * (t * std::f64::consts::TAU * 0.5).sin()) as f32;
        send(&mut stream, json!({ "method": "xyzrpy", "units": "norm", "args": [surge, 0.0, 0.0, 0.0, 0.0, yaw] })).await?;
    }

    send(&mut stream, json!({ "method": "activate", "active": false })).await?;
    tracing::info!("Sent {} movement samples", samples);
    Ok(())
}

#[tokio::main]
async fn main() -> HarnessResult {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Effector { port, watcher_port, name } => run_effector(port, watcher_port, name).await,
        Commands::Client { addr, rate_hz, seconds } => run_client(addr, rate_hz, seconds).await,
    }
}
