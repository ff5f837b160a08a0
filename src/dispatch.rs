// src/dispatch.rs - Platform-facing dispatch loop (shape, transform, forward)
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::command::{ActivationCommand, Command, MovementCommand};
use crate::effector::{EffectorError, EffectorLink};
use crate::ingest::SharedShapingConfig;
use crate::queue::{CommandQueue, QueueEntry};
use crate::shaping::ShapingFilter;
use crate::status::{OUT_LABEL, StatusSink};
use crate::transform::{Transform, TransformError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),
    #[error("Effector error: {0}")]
    Effector(#[from] EffectorError),
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Idle,
    Moved { shaped: MovementCommand, lengths: [f32; 6] },
    Activated(bool),
    /// The command was dropped because a collaborator failed.
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub moves: u64,
    pub activations: u64,
    pub resets: u64,
    pub failures: u64,
}

/// Pops queue entries and drives the transform and effector.
pub struct DispatchLoop {
    queue: CommandQueue,
    config: SharedShapingConfig,
    filter: ShapingFilter,
    transform: Box<dyn Transform>,
    status: Arc<dyn StatusSink>,
    poll_interval: Duration,
    stats: DispatchStats,
}

impl DispatchLoop {
    pub fn new(
        queue: CommandQueue,
        config: SharedShapingConfig,
        transform: Box<dyn Transform>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            queue,
            config,
            filter: ShapingFilter::new(),
            transform,
            status,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stats: DispatchStats::default(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn filter(&self) -> &ShapingFilter {
        &self.filter
    }

    pub fn transform_mut(&mut self) -> &mut dyn Transform {
        self.transform.as_mut()
    }

    /// Process at most one command. Reset markers ahead of it are applied
    /// without using up the tick.
    pub async fn tick(&mut self, link: &mut dyn EffectorLink) -> TickOutcome {
        let command = loop {
            match self.queue.try_pop() {
                None => return TickOutcome::Idle,
                Some(QueueEntry::ResetShaping) => {
                    tracing::debug!("Resetting shaping filter");
                    self.filter.reset();
                    self.stats.resets += 1;
                }
                Some(QueueEntry::Command(command)) => break command,
            }
        };

        let result = match command {
            Command::Activation(cmd) => self.activate(cmd, link).await,
            Command::Movement(cmd) => self.movement(cmd, link).await,
        };
        result.unwrap_or_else(|e| {
            // The next command supersedes this one; nothing is retried.
            tracing::error!("Dropping {:?}: {}", command, e);
            self.stats.failures += 1;
            TickOutcome::Failed
        })
    }

    async fn activate(&mut self, cmd: ActivationCommand, link: &mut dyn EffectorLink) -> Result<TickOutcome, DispatchError> {
        tracing::info!("{}", if cmd.active { "activating" } else { "deactivating" });
        link.activate_effector(cmd.active).await?;
        self.stats.activations += 1;
        let label = if cmd.active { "Platform active" } else { "Platform inactive" };
        self.status.update_labels(OUT_LABEL, label);
        Ok(TickOutcome::Activated(cmd.active))
    }

    async fn movement(&mut self, cmd: MovementCommand, link: &mut dyn EffectorLink) -> Result<TickOutcome, DispatchError> {
        let shaped = {
            let cfg = self.config.read().await;
            self.filter.shape(cmd, &cfg)
        };
        self.transform
            .apply_translation_and_rotation(shaped.position(), shaped.rotation())?;
        let lengths = self.transform.raw_lengths();
        tracing::debug!("middleware out: {:?} -> {:?}", shaped.to_array(), lengths);

        link.send_move_event(&lengths, &shaped.to_array()).await?;
        self.status.update_actuators(&lengths);
        self.stats.moves += 1;
        Ok(TickOutcome::Moved { shaped, lengths })
    }

    /// Tick every poll interval until `shutdown` fires.
    pub async fn run(&mut self, link: &mut dyn EffectorLink, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Dispatch loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick(link).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effector::{ActuatorLengths, ConnectionSession};
    use crate::shaping::ShapingConfig;
    use crate::status::RecordingStatusSink;
    use async_trait::async_trait;
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct RecordingLink {
        moves: Vec<(ActuatorLengths, [f32; 6])>,
        activations: Vec<bool>,
        fail_moves: bool,
    }

    #[async_trait]
    impl EffectorLink for RecordingLink {
        async fn begin(&mut self, _ip: &str, _port: u16, _watcher_port: u16) -> Result<ConnectionSession, EffectorError> {
            Err(EffectorError::NotConnected)
        }
        async fn activate_effector(&mut self, active: bool) -> Result<(), EffectorError> {
            self.activations.push(active);
            Ok(())
        }
        async fn send_move_event(&mut self, lengths: &ActuatorLengths, command: &[f32; 6]) -> Result<(), EffectorError> {
            if self.fail_moves {
                return Err(EffectorError::Closed);
            }
            self.moves.push((*lengths, *command));
            Ok(())
        }
        async fn end(&mut self) {}
    }

    /// Reports the shaped pose back as lengths.
    struct EchoTransform([f32; 6]);

    impl Transform for EchoTransform {
        fn begin(&mut self, _session: &ConnectionSession) {}
        fn apply_translation_and_rotation(&mut self, p: [f32; 3], r: [f32; 3]) -> Result<(), TransformError> {
            self.0 = [p[0], p[1], p[2], r[0], r[1], r[2]];
            Ok(())
        }
        fn raw_length(&self, index: usize) -> f32 {
            self.0[index]
        }
    }

    fn dispatcher(queue: &CommandQueue, status: Arc<RecordingStatusSink>) -> DispatchLoop {
        let config = Arc::new(RwLock::new(ShapingConfig { gain: 2.0, ..Default::default() }));
        DispatchLoop::new(queue.clone(), config, Box::new(EchoTransform([0.0; 6])), status)
    }

    fn movement(x: f32, yaw: f32) -> QueueEntry {
        QueueEntry::Command(Command::Movement(MovementCommand { x, yaw, ..Default::default() }))
    }

    #[tokio::test]
    async fn test_idle_tick() {
        let queue = CommandQueue::new();
        let mut dispatch = dispatcher(&queue, Arc::new(RecordingStatusSink::new()));
        let mut link = RecordingLink::default();
        assert_eq!(dispatch.tick(&mut link).await, TickOutcome::Idle);
    }

    #[tokio::test]
    async fn test_one_command_per_tick() {
        let queue = CommandQueue::new();
        let status = Arc::new(RecordingStatusSink::new());
        let mut dispatch = dispatcher(&queue, status.clone());
        let mut link = RecordingLink::default();

        queue.push(QueueEntry::ResetShaping);
        queue.push(movement(0.25, 0.3));
        queue.push(QueueEntry::Command(Command::Activation(ActivationCommand { active: true })));

        let outcome = dispatch.tick(&mut link).await;
        let TickOutcome::Moved { shaped, lengths } = outcome else { panic!("expected move, got {:?}", outcome) };
        assert_eq!(shaped.x, 0.5);
        assert_eq!(shaped.yaw, 0.0);
        assert_eq!(lengths, shaped.to_array());
        assert_eq!(queue.len(), 1);
        assert_eq!(dispatch.stats().resets, 1);

        assert_eq!(dispatch.tick(&mut link).await, TickOutcome::Activated(true));
        assert_eq!(link.activations, vec![true]);
        assert_eq!(link.moves.len(), 1);
        assert_eq!(status.actuator_updates().len(), 1);
        assert_eq!(status.last_label(OUT_LABEL).as_deref(), Some("Platform active"));
    }

    #[tokio::test]
    async fn test_effector_failure_drops_command_and_continues() {
        let queue = CommandQueue::new();
        let status = Arc::new(RecordingStatusSink::new());
        let mut dispatch = dispatcher(&queue, status.clone());
        let mut link = RecordingLink { fail_moves: true, ..Default::default() };

        queue.push(movement(0.1, 0.0));
        queue.push(movement(0.2, 0.0));
        assert_eq!(dispatch.tick(&mut link).await, TickOutcome::Failed);
        link.fail_moves = false;
        assert!(matches!(dispatch.tick(&mut link).await, TickOutcome::Moved { .. }));
        assert_eq!(dispatch.stats().failures, 1);
        assert_eq!(link.moves.len(), 1);
        // failed move never reached the status display
        assert_eq!(status.actuator_updates().len(), 1);
    }

    #[tokio::test]
    async fn test_transform_failure_is_logged_and_skipped() {
        struct Broken;
        impl Transform for Broken {
            fn begin(&mut self, _session: &ConnectionSession) {}
            fn apply_translation_and_rotation(&mut self, _p: [f32; 3], _r: [f32; 3]) -> Result<(), TransformError> {
                Err(TransformError::NoGeometry)
            }
            fn raw_length(&self, _index: usize) -> f32 {
                0.0
            }
        }
        let queue = CommandQueue::new();
        let config = Arc::new(RwLock::new(ShapingConfig::default()));
        let mut dispatch = DispatchLoop::new(queue.clone(), config, Box::new(Broken), Arc::new(RecordingStatusSink::new()));
        let mut link = RecordingLink::default();
        queue.push(movement(0.1, 0.0));
        assert_eq!(dispatch.tick(&mut link).await, TickOutcome::Failed);
        assert!(link.moves.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let queue = CommandQueue::new();
        let mut dispatch = dispatcher(&queue, Arc::new(RecordingStatusSink::new()));
        let mut link = RecordingLink::default();
        let (tx, rx) = broadcast::channel(1);

        queue.push(movement(0.1, 0.0));
        queue.push(movement(0.2, 0.0));
        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            producer.push(movement(0.3, 0.0));
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tx.send(());
        });
        dispatch.run(&mut link, rx).await;
        assert_eq!(link.moves.len(), 3);
        assert!(queue.is_empty());
    }
}
