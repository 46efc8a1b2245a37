//! United Colors - simulation core of a tilt-controlled dot game
//!
//! Core modules:
//! - `sim`: Deterministic simulation (entities, animations, spawning, collisions)
//! - `engine`: Simulation thread, pause gate and lifecycle entry points
//! - `render`: Flat buffers published to the render consumer, plus the handoff
//! - `platform`: Orientation sensor abstraction and calibration
//! - `persistence`: Versioned snapshots for suspend/resume
//! - `settings`: Data-driven game rules and loop configuration

pub mod engine;
pub mod error;
pub mod persistence;
pub mod platform;
pub mod render;
pub mod settings;
pub mod sim;

pub use engine::Engine;
pub use error::{ConfigError, EngineError, SensorError, SnapshotError};
pub use settings::{LoopSettings, Rules, Screen, Settings};

use glam::Vec2;

/// Game configuration constants
pub mod consts {
    use crate::sim::Rgb;

    /// Fixed simulation rate (ticks per second)
    pub const TICK_HZ: u32 = 30;
    /// Maximum catch-up ticks per loop iteration to prevent spiral of death
    pub const MAX_CATCH_UP_TICKS: u32 = 5;
    /// Default bound on the wait for the render consumer (milliseconds)
    pub const HANDOFF_TIMEOUT_MS: u64 = 500;

    /// Hard cap on live dots (render buffers are sized for this)
    pub const DOT_LIMIT: usize = 200;
    /// Live dot cap while running the kiosk demo
    pub const KIOSK_DOT_CAP: usize = 10;

    /// Pink, blue and green
    pub const PALETTE: [Rgb; 3] = [
        Rgb::new(0xE9, 0x1E, 0x63),
        Rgb::new(0x21, 0x96, 0xF3),
        Rgb::new(0x8B, 0xC3, 0x4A),
    ];

    /// Bonus dot pulses between full size and this fraction of it
    pub const PULSE_LOW_FRACTION: f32 = 0.85;
    /// Attempts at finding a bonus position clear of the player per tick
    pub const BONUS_PLACEMENT_ATTEMPTS: u32 = 16;
}

/// Normalize a direction, falling back to `fallback` for degenerate input
#[inline]
pub fn unit_or(v: Vec2, fallback: Vec2) -> Vec2 {
    let len_sq = v.length_squared();
    if len_sq.is_finite() && len_sq > f32::EPSILON {
        v / len_sq.sqrt()
    } else {
        fallback
    }
}

/// True when both components are finite
#[inline]
pub fn is_finite_vec(v: Vec2) -> bool {
    v.x.is_finite() && v.y.is_finite()
}
