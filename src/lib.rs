// src/lib.rs - Platform middleware: command ingestion and motion shaping
pub mod command;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod effector;
pub mod ingest;
pub mod middleware;
pub mod protocol;
pub mod queue;
pub mod shaping;
pub mod status;
pub mod transform;

pub use command::{ActivationCommand, Command, MovementCommand};
pub use config::{load_config, StartupConfig};
pub use connection::EffectorConnectionManager;
pub use dispatch::{DispatchLoop, TickOutcome};
pub use effector::{ActuatorLengths, ConnectionSession, EffectorError, EffectorLink, TcpEffectorLink};
pub use ingest::{IngestSession, LineHandler, SharedShapingConfig};
pub use middleware::{Middleware, MiddlewareError};
pub use queue::{CommandQueue, QueueEntry};
pub use shaping::{ConfigField, ConfigUpdate, FilterState, ShapingConfig, ShapingFilter};
pub use status::{StatusSink, TracingStatusSink};
pub use transform::{PlatformGeometry, StewartTransform, Transform, TransformError};
