// src/middleware.rs - Wires the ingest session, dispatch loop and effector together
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::config::StartupConfig;
use crate::connection::EffectorConnectionManager;
use crate::dispatch::DispatchLoop;
use crate::effector::{ConnectionSession, EffectorLink};
use crate::ingest::{IngestSession, LineHandler, SharedShapingConfig};
use crate::queue::CommandQueue;
use crate::shaping::ShapingConfig;
use crate::status::StatusSink;
use crate::transform::Transform;

#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("Failed to bind listen port {port}: {source}")]
    Bind { port: u16, source: std::io::Error },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Middleware is not running")]
    NotStarted,
}

/// The whole command pipeline.
pub struct Middleware<L: EffectorLink> {
    config: StartupConfig,
    queue: CommandQueue,
    shaping: SharedShapingConfig,
    connection: EffectorConnectionManager<L>,
    dispatch: DispatchLoop,
    ingest_task: Option<JoinHandle<()>>,
    listen_addr: Option<SocketAddr>,
    shutdown_tx: broadcast::Sender<()>,
}

impl<L: EffectorLink> Middleware<L> {
    pub fn new(config: StartupConfig, link: L, transform: Box<dyn Transform>, status: Arc<dyn StatusSink>) -> Self {
        let queue = CommandQueue::new();
        let shaping = Arc::new(RwLock::new(ShapingConfig::default()));
        let (shutdown_tx, _) = broadcast::channel(1);
        let connection = EffectorConnectionManager::new(link, status.clone(), config.retry_interval());
        let dispatch = DispatchLoop::new(queue.clone(), shaping.clone(), transform, status)
            .with_poll_interval(config.poll_interval());

        Self {
            config,
            queue,
            shaping,
            connection,
            dispatch,
            ingest_task: None,
            listen_addr: None,
            shutdown_tx,
        }
    }

    /// Connect to the effector (retrying until it answers), then open the
    /// client port. Returns the session once both are up.
    pub async fn start(&mut self) -> Result<ConnectionSession, MiddlewareError> {
        tracing::info!("Starting platform middleware");
        let session = self
            .connection
            .begin(&self.config.effector_ip, self.config.effector_port, self.config.watcher_port)
            .await;
        self.dispatch.transform_mut().begin(&session);

        let handler = LineHandler::new(self.queue.clone(), self.shaping.clone(), self.config.inactivity_timeout());
        let ingest = IngestSession::bind(self.config.listen_addr(), handler)
            .await
            .map_err(|source| MiddlewareError::Bind { port: self.config.listen_port, source })?;
        self.listen_addr = Some(ingest.local_addr()?);
        self.ingest_task = Some(ingest.spawn());
        Ok(session)
    }

    /// Run the dispatch loop until [`Middleware::shutdown_handle`] fires.
    pub async fn run(&mut self) -> Result<(), MiddlewareError> {
        if self.ingest_task.is_none() {
            return Err(MiddlewareError::NotStarted);
        }
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.dispatch.run(self.connection.link_mut(), shutdown_rx).await;
        Ok(())
    }

    /// Stop everything and release the effector. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        tracing::info!("Shutting down platform middleware");
        let _ = self.shutdown_tx.send(());
        if let Some(task) = self.ingest_task.take() {
            task.abort();
            let _ = task.await;
        }
        self.connection.end().await;
    }

    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Address the ingest session is bound to, once started.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen_addr
    }

    pub fn shaping_config(&self) -> SharedShapingConfig {
        self.shaping.clone()
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn connection(&self) -> &EffectorConnectionManager<L> {
        &self.connection
    }
}
