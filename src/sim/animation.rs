//! Tick-driven scalar animations
//!
//! Animations never read the clock: progress is computed from the tick passed
//! to `update`, so replaying the same tick sequence replays the same values.
//! Completion is reported through the returned [`AnimationStatus`]; the owner
//! reacts to `Completed` the same way a completion callback would.

use serde::{Deserialize, Serialize};

/// How the animated value evolves over time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Curve {
    /// Linear interpolation over a fixed number of ticks
    Linear { duration: u64 },
    /// Endless sine pulse between `from` and `to`; larger speed is slower
    Pulse { speed: f32 },
}

/// Result of advancing an animation by one update
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnimationStatus {
    /// Not running, nothing was applied
    Idle,
    /// Value applied, still running
    Running(f32),
    /// Final value applied, animation stopped itself
    Completed(f32),
}

/// A scalar animation between two values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animation {
    curve: Curve,
    start_tick: u64,
    from: f32,
    to: f32,
    running: bool,
}

impl Animation {
    /// A stopped animation
    pub fn idle() -> Self {
        Self {
            curve: Curve::Linear { duration: 0 },
            start_tick: 0,
            from: 0.0,
            to: 0.0,
            running: false,
        }
    }

    /// Start a bounded animation that completes after `duration` ticks
    pub fn linear(tick: u64, duration: u64, from: f32, to: f32) -> Self {
        Self {
            curve: Curve::Linear { duration },
            start_tick: tick,
            from,
            to,
            running: true,
        }
    }

    /// Start an indefinite pulse; only `stop` ends it
    pub fn pulse(tick: u64, speed: f32, from: f32, to: f32) -> Self {
        Self {
            curve: Curve::Pulse { speed },
            start_tick: tick,
            from,
            to,
            running: true,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    /// Stop without applying a final value. Returns whether it was running.
    pub fn stop(&mut self) -> bool {
        std::mem::replace(&mut self.running, false)
    }

    /// Progress of a bounded animation, clamped to [0, 1]
    pub fn progress(&self, tick: u64) -> f32 {
        match self.curve {
            Curve::Linear { duration: 0 } => 1.0,
            Curve::Linear { duration } => {
                let elapsed = tick.saturating_sub(self.start_tick) as f64;
                (elapsed / duration as f64).clamp(0.0, 1.0) as f32
            }
            Curve::Pulse { .. } => 0.0,
        }
    }

    /// Value at `tick` without changing state
    pub fn value_at(&self, tick: u64) -> f32 {
        let t = match self.curve {
            Curve::Linear { .. } => self.progress(tick),
            Curve::Pulse { speed } => {
                let phase = tick as f32 / speed.max(f32::EPSILON);
                (phase.sin() + 1.0) / 2.0
            }
        };
        self.from + (self.to - self.from) * t
    }

    /// Advance to `tick`, handing the new value to `apply`
    pub fn update(&mut self, tick: u64, mut apply: impl FnMut(f32)) -> AnimationStatus {
        if !self.running {
            return AnimationStatus::Idle;
        }
        let value = self.value_at(tick);
        apply(value);

        let done = matches!(self.curve, Curve::Linear { .. }) && self.progress(tick) >= 1.0;
        if done {
            self.running = false;
            AnimationStatus::Completed(value)
        } else {
            AnimationStatus::Running(value)
        }
    }
}

impl Default for Animation {
    fn default() -> Self {
        Self::idle()
    }
}
