// src/ingest.rs - Client-facing ingest session (accept, read lines, decode, enqueue)
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};

use crate::command::Command;
use crate::protocol::{self, Message, Units};
use crate::queue::{CommandQueue, QueueEntry};
use crate::shaping::ShapingConfig;

pub type SharedShapingConfig = Arc<RwLock<ShapingConfig>>;

/// Gap between lines after which washout history is discarded.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_millis(2000);

/// Counters kept across client connections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub clients: u64,
    pub lines: u64,
    pub commands: u64,
    pub config_updates: u64,
    pub decode_errors: u64,
    pub resets: u64,
}

/// Turns protocol lines into queue entries and config changes.
pub struct LineHandler {
    queue: CommandQueue,
    config: SharedShapingConfig,
    inactivity_timeout: Duration,
    last_line_at: Option<Instant>,
    stats: IngestStats,
}

impl LineHandler {
    pub fn new(queue: CommandQueue, config: SharedShapingConfig, inactivity_timeout: Duration) -> Self {
        Self {
            queue,
            config,
            inactivity_timeout,
            last_line_at: None,
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Forget the previous line time so the next line starts from a reset filter.
    pub fn client_changed(&mut self) {
        self.last_line_at = None;
    }

    pub async fn handle_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        self.stats.lines += 1;

        let now = Instant::now();
        let stale = match self.last_line_at {
            None => {
                tracing::debug!("First line on this stream, resetting shaping");
                true
            }
            Some(prev) if now.duration_since(prev) > self.inactivity_timeout => {
                tracing::info!("Inactivity timeout on client stream, resetting shaping");
                true
            }
            Some(_) => false,
        };
        if stale {
            self.queue.push(QueueEntry::ResetShaping);
            self.stats.resets += 1;
        }
        self.last_line_at = Some(now);

        match protocol::decode(line) {
            Ok(Message::Move { command, units: Units::Normalized }) => self.enqueue(command.into()),
            Ok(Message::Move { units: Units::Real, .. }) => {
                tracing::debug!("Real-unit xyzrpy is not shaped or forwarded, dropping");
            }
            Ok(Message::Activate(command)) => self.enqueue(command.into()),
            Ok(Message::Config(update)) => {
                let mut cfg = self.config.write().await;
                let changed = cfg.apply(&update);
                self.stats.config_updates += 1;
                tracing::info!("Shaping config updated ({} of {} fields changed): {}", changed, update.len(), *cfg);
            }
            Ok(Message::Raw) => tracing::trace!("Ignoring raw message"),
            Err(e) => {
                self.stats.decode_errors += 1;
                tracing::warn!("Dropping malformed line: {} ({})", e, line);
            }
        }
    }

    fn enqueue(&mut self, command: Command) {
        tracing::trace!("Queueing {:?}", command);
        self.queue.push(QueueEntry::Command(command));
        self.stats.commands += 1;
    }

    /// Read lines until the client hangs up (`Ok`) or the stream faults (`Err`).
    pub async fn serve<R>(&mut self, mut reader: R) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                return Ok(());
            }
            let line = String::from_utf8_lossy(&buf);
            self.handle_line(&line).await;
        }
    }
}

/// Listening socket plus the line handler; serves one client at a time.
pub struct IngestSession {
    listener: TcpListener,
    handler: LineHandler,
}

impl IngestSession {
    pub async fn bind(addr: SocketAddr, handler: LineHandler) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Middleware listening on {}", listener.local_addr()?);
        Ok(Self { listener, handler })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Accept clients forever. Dropping (or aborting) the task closes the socket.
    pub async fn run(mut self) {
        loop {
            tracing::info!("Waiting for client (restart client if already running)");
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!("Accept failed: {}", e);
                    sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };
            let _ = stream.set_nodelay(true);
            tracing::info!("Connected to {}", peer);
            self.handler.stats.clients += 1;
            self.handler.client_changed();

            match self.handler.serve(BufReader::new(stream)).await {
                Ok(()) => tracing::info!("Client {} disconnected, waiting for new connection", peer),
                Err(e) => tracing::warn!("Connection to {} lost: {}", peer, e),
            }
            self.handler.client_changed();
        }
    }
}
