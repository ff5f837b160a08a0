// src/connection.rs - Effector session lifecycle (connect-until-success, release)
use std::sync::Arc;

use tokio::time::{sleep, Duration};

use crate::effector::{ConnectionSession, EffectorLink};
use crate::status::{OUT_LABEL, StatusSink};

pub const DISCONNECTED_LABEL: &str = "Not Connected to a Platform";

/// Owns the effector link and the session obtained from it.
pub struct EffectorConnectionManager<L: EffectorLink> {
    link: L,
    status: Arc<dyn StatusSink>,
    retry_interval: Duration,
    session: Option<ConnectionSession>,
    attempts: u64,
}

impl<L: EffectorLink> EffectorConnectionManager<L> {
    pub fn new(link: L, status: Arc<dyn StatusSink>, retry_interval: Duration) -> Self {
        Self {
            link,
            status,
            retry_interval,
            session: None,
            attempts: 0,
        }
    }

    /// Connect to the effector, retrying until it accepts a session.
    ///
    /// Never gives up on its own; drop the future to abandon the attempt.
    pub async fn begin(&mut self, ip: &str, port: u16, watcher_port: u16) -> ConnectionSession {
        loop {
            self.attempts += 1;
            match self.link.begin(ip, port, watcher_port).await {
                Ok(session) => {
                    tracing::info!(
                        "Connected to effector '{}' at {}:{} after {} attempt(s)",
                        session.name, ip, port, self.attempts
                    );
                    self.status.update_labels(OUT_LABEL, &format!("{} Connected", session.name));
                    self.session = Some(session.clone());
                    return session;
                }
                Err(e) => {
                    tracing::warn!(
                        "Unable to connect to effector at {}:{} (attempt {}): {}, retrying... (is the server running?)",
                        ip, port, self.attempts, e
                    );
                    sleep(self.retry_interval).await;
                }
            }
        }
    }

    /// Release the session, if any, and report the disconnected status.
    /// The link is only closed once however often this is called.
    pub async fn end(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!("Releasing effector session '{}' ({})", session.name, session.id);
            self.link.end().await;
        }
        self.status.update_labels(OUT_LABEL, DISCONNECTED_LABEL);
    }

    pub fn session(&self) -> Option<&ConnectionSession> {
        self.session.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Connection attempts made so far, successful or not.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}
