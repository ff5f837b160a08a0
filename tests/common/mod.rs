// Shared fixtures for integration tests
#![allow(dead_code)]

use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use platform_middleware::{
    ActuatorLengths, ConnectionSession, EffectorError, EffectorLink, PlatformGeometry, Transform,
    TransformError,
};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Default)]
pub struct LinkLog {
    pub begin_attempts: u32,
    pub moves: Vec<(ActuatorLengths, [f32; 6])>,
    pub activations: Vec<bool>,
    pub ends: u32,
}

/// Effector link that fails `failures` times before accepting, and records
/// everything sent through it.
#[derive(Clone, Default)]
pub struct MockLink {
    pub log: Arc<Mutex<LinkLog>>,
    pub failures: u32,
}

impl MockLink {
    pub fn failing(failures: u32) -> Self {
        Self { failures, ..Default::default() }
    }

    pub fn moves(&self) -> Vec<(ActuatorLengths, [f32; 6])> {
        self.log.lock().unwrap().moves.clone()
    }
}

#[async_trait]
impl EffectorLink for MockLink {
    async fn begin(&mut self, ip: &str, port: u16, _watcher_port: u16) -> Result<ConnectionSession, EffectorError> {
        let mut log = self.log.lock().unwrap();
        log.begin_attempts += 1;
        if log.begin_attempts <= self.failures {
            return Err(EffectorError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        Ok(ConnectionSession::new("mock chair", format!("{}:{}", ip, port), PlatformGeometry::default()))
    }

    async fn activate_effector(&mut self, active: bool) -> Result<(), EffectorError> {
        self.log.lock().unwrap().activations.push(active);
        Ok(())
    }

    async fn send_move_event(&mut self, lengths: &ActuatorLengths, command: &[f32; 6]) -> Result<(), EffectorError> {
        self.log.lock().unwrap().moves.push((*lengths, *command));
        Ok(())
    }

    async fn end(&mut self) {
        self.log.lock().unwrap().ends += 1;
    }
}

/// Passes the shaped pose straight through as "lengths".
#[derive(Default)]
pub struct EchoTransform {
    pose: [f32; 6],
}

impl Transform for EchoTransform {
    fn begin(&mut self, _session: &ConnectionSession) {}

    fn apply_translation_and_rotation(&mut self, p: [f32; 3], r: [f32; 3]) -> Result<(), TransformError> {
        self.pose = [p[0], p[1], p[2], r[0], r[1], r[2]];
        Ok(())
    }

    fn raw_length(&self, index: usize) -> f32 {
        self.pose[index]
    }
}

/// In-memory log sink for asserting on emitted diagnostics.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Install as the thread's default subscriber until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.contents().lines().filter(|l| l.contains(needle)).count()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
