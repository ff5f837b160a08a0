// src/effector.rs - Link to the effector (platform hardware) and its watchers
use std::net::SocketAddr;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::{timeout, Duration};
use uuid::Uuid;

use crate::transform::PlatformGeometry;

pub type ActuatorLengths = [f32; 6];

#[derive(Debug, Error)]
pub enum EffectorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Effector did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Effector closed the connection")]
    Closed,
    #[error("Malformed effector reply: {0}")]
    Protocol(String),
    #[error("No effector session")]
    NotConnected,
}

/// Descriptor of an established effector session.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSession {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub geometry: PlatformGeometry,
}

impl ConnectionSession {
    pub fn new(name: impl Into<String>, address: impl Into<String>, geometry: PlatformGeometry) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            address: address.into(),
            geometry,
        }
    }
}

/// Capability for talking to the effector.
#[async_trait]
pub trait EffectorLink: Send {
    /// Try once to open a session. Retrying is the caller's business.
    async fn begin(&mut self, ip: &str, port: u16, watcher_port: u16) -> Result<ConnectionSession, EffectorError>;
    async fn activate_effector(&mut self, active: bool) -> Result<(), EffectorError>;
    async fn send_move_event(&mut self, lengths: &ActuatorLengths, command: &[f32; 6]) -> Result<(), EffectorError>;
    /// Release the session. Safe to call when nothing is open.
    async fn end(&mut self);
}

/// Geometry reply from the effector.
#[derive(Debug, Clone, Deserialize)]
struct GeometryReply {
    name: String,
    #[serde(flatten)]
    geometry: PlatformGeometry,
}

struct LineStream {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl LineStream {
    fn new(stream: TcpStream) -> Self {
        let (read, writer) = stream.into_split();
        Self { reader: BufReader::new(read), writer }
    }

    async fn send(&mut self, msg: &Value) -> Result<(), EffectorError> {
        let mut line = msg.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<String, EffectorError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(EffectorError::Closed);
        }
        Ok(line.trim_end().to_string())
    }
}

/// Newline-delimited JSON-RPC link to an effector server over TCP.
pub struct TcpEffectorLink {
    effector: Option<LineStream>,
    watcher: Option<LineStream>,
    reply_timeout: Duration,
    next_id: u64,
}

impl Default for TcpEffectorLink {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpEffectorLink {
    pub fn new() -> Self {
        Self {
            effector: None,
            watcher: None,
            reply_timeout: Duration::from_secs(2),
            next_id: 0,
        }
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.effector.is_some()
    }

    fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        json!({ "jsonrpc": "2.0", "id": self.next_id, "method": method, "params": params })
    }

    /// Send to the effector and mirror to the watcher, if one is attached.
    async fn publish(&mut self, msg: Value) -> Result<(), EffectorError> {
        let effector = self.effector.as_mut().ok_or(EffectorError::NotConnected)?;
        if let Err(e) = effector.send(&msg).await {
            self.effector = None;
            return Err(e);
        }
        if let Some(watcher) = self.watcher.as_mut() {
            if let Err(e) = watcher.send(&msg).await {
                tracing::warn!("Dropping watcher connection: {}", e);
                self.watcher = None;
            }
        }
        Ok(())
    }

    async fn query_geometry(&mut self, stream: &mut LineStream) -> Result<GeometryReply, EffectorError> {
        let request = self.request("geometry", Value::Null);
        stream.send(&request).await?;
        let reply = timeout(self.reply_timeout, stream.recv())
            .await
            .map_err(|_| EffectorError::Timeout(self.reply_timeout))??;
        parse_geometry_reply(&reply)
    }
}

fn parse_geometry_reply(reply: &str) -> Result<GeometryReply, EffectorError> {
    let value: Value = serde_json::from_str(reply).map_err(|e| EffectorError::Protocol(e.to_string()))?;
    if let Some(err) = value.get("error") {
        return Err(EffectorError::Protocol(format!("effector returned error {}", err)));
    }
    let result = value
        .get("result")
        .cloned()
        .ok_or_else(|| EffectorError::Protocol("reply has no 'result'".to_string()))?;
    serde_json::from_value(result).map_err(|e| EffectorError::Protocol(e.to_string()))
}

#[async_trait]
impl EffectorLink for TcpEffectorLink {
    async fn begin(&mut self, ip: &str, port: u16, watcher_port: u16) -> Result<ConnectionSession, EffectorError> {
        let stream = TcpStream::connect((ip, port)).await?;
        stream.set_nodelay(true)?;
        let peer: SocketAddr = stream.peer_addr()?;
        let mut effector = LineStream::new(stream);
        let reply = self.query_geometry(&mut effector).await?;
        tracing::info!("Effector '{}' answered from {}", reply.name, peer);

        self.watcher = match TcpStream::connect((ip, watcher_port)).await {
            Ok(stream) => {
                tracing::info!("Watcher attached on {}:{}", ip, watcher_port);
                Some(LineStream::new(stream))
            }
            Err(e) => {
                tracing::info!("No watcher on {}:{} ({})", ip, watcher_port, e);
                None
            }
        };
        self.effector = Some(effector);

        Ok(ConnectionSession::new(reply.name, peer.to_string(), reply.geometry))
    }

    async fn activate_effector(&mut self, active: bool) -> Result<(), EffectorError> {
        let msg = self.request("activate", json!({ "active": active }));
        self.publish(msg).await
    }

    async fn send_move_event(&mut self, lengths: &ActuatorLengths, command: &[f32; 6]) -> Result<(), EffectorError> {
        let msg = self.request("move", json!({ "lengths": lengths, "xyzrpy": command }));
        self.publish(msg).await
    }

    async fn end(&mut self) {
        for stream in [self.effector.take(), self.watcher.take()].into_iter().flatten() {
            let mut writer = stream.writer;
            let _ = writer.shutdown().await;
        }
    }
}
