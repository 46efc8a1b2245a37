//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only, time is counted in ticks
//! - Seeded RNG only
//! - Stable iteration order (spawn order)
//! - No rendering, threading or platform dependencies

pub mod animation;
pub mod collision;
pub mod dot;
pub mod spawn;
pub mod state;
pub mod tick;

pub use animation::{Animation, AnimationStatus, Curve};
pub use collision::{CollisionOutcome, circles_overlap, classify, collides, pick_new_color};
pub use dot::{BonusPhase, BonusState, BonusTiming, Dot, DotId, DotKind, PlayerState, ResumedBonus, Rgb};
pub use spawn::{Edge, EdgeSpawn, SpawnScheduler, bonus_position, edge_spawn, spawn_interval};
pub use state::{GameEvent, GameState, SessionState, SoundCue};
pub use tick::{TickInput, tick};
