//! Error types
//!
//! Every failure is reported upward as one of these; nothing retries on its own.

use thiserror::Error;

use crate::sim::DotId;

/// Orientation hardware problems.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// Neither a rotation-vector sensor nor a gyroscope is present.
    #[error("no usable orientation sensor available")]
    NoSensorAvailable,
}

/// Problems reading or applying a saved session.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Snapshot was written by an incompatible version.
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// Snapshot text is not valid JSON for the snapshot schema.
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),

    /// An entity carries values the simulation cannot accept.
    #[error("invalid entity {id}: {reason}")]
    InvalidEntity { id: DotId, reason: &'static str },
}

/// Problems loading or validating settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Engine lifecycle failures.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The simulation thread survived a teardown request. This is a logic bug.
    #[error("simulation thread still alive after teardown")]
    LoopStillAlive,

    /// The simulation thread panicked.
    #[error("simulation thread panicked")]
    LoopPanicked,

    /// The OS refused to create the simulation thread.
    #[error("failed to spawn simulation thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
