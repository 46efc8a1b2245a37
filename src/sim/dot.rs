//! Dot entities
//!
//! One struct for every entity, with a closed [`DotKind`] for the variant
//! specific state. The simulation matches on the kind instead of asking an
//! entity what it is.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::animation::{Animation, AnimationStatus};
use crate::consts::PULSE_LOW_FRACTION;
use crate::settings::{Rules, Screen};
use crate::{is_finite_vec, unit_or};

/// Entity identifier, assigned in increasing order and never reused
pub type DotId = u32;

/// 8-bit RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Channels scaled to 0..1 for the render buffers
    pub fn to_unit(self) -> [f32; 3] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
        ]
    }
}

/// Bonus dot animation timings, taken from the rules at spawn time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BonusTiming {
    pub animation_ticks: u64,
    pub lifetime_ticks: u64,
    pub pulse_speed: f32,
}

impl From<&Rules> for BonusTiming {
    fn from(rules: &Rules) -> Self {
        Self {
            animation_ticks: rules.bonus_animation_ticks,
            lifetime_ticks: rules.bonus_lifetime_ticks,
            pulse_speed: rules.bonus_pulse_speed,
        }
    }
}

/// Where a bonus dot is in its visual lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BonusPhase {
    /// Zooming in from nothing
    Appearing,
    /// Throbbing at full size
    Pulsing,
    /// Zooming out after being flagged
    Vanishing,
    /// Nothing left to animate
    Gone,
}

/// Bonus dot state: value, timings and the size animation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusState {
    value: u32,
    created_tick: u64,
    full_size: f32,
    timing: BonusTiming,
    phase: BonusPhase,
    animation: Animation,
}

impl BonusState {
    fn new(tick: u64, full_size: f32, value: u32, timing: BonusTiming) -> Self {
        Self {
            value,
            created_tick: tick,
            full_size,
            timing,
            phase: BonusPhase::Appearing,
            animation: Animation::linear(tick, timing.animation_ticks, 0.0, full_size),
        }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn created_tick(&self) -> u64 {
        self.created_tick
    }

    pub fn full_size(&self) -> f32 {
        self.full_size
    }

    pub fn phase(&self) -> BonusPhase {
        self.phase
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_running()
    }

    fn start_pulse(&mut self, tick: u64) {
        self.phase = BonusPhase::Pulsing;
        self.animation = Animation::pulse(
            tick,
            self.timing.pulse_speed,
            self.full_size,
            self.full_size * PULSE_LOW_FRACTION,
        );
    }

    fn start_vanish(&mut self, tick: u64, current_size: f32) {
        if matches!(self.phase, BonusPhase::Vanishing | BonusPhase::Gone) {
            return;
        }
        self.animation.stop();
        self.phase = BonusPhase::Vanishing;
        self.animation = Animation::linear(tick, self.timing.animation_ticks, current_size, 0.0);
    }

    fn finish(&mut self) {
        self.animation.stop();
        self.phase = BonusPhase::Gone;
    }
}

/// Player-controlled state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Displacement applied every tick until the next sensor sample
    pending: Vec2,
}

impl PlayerState {
    pub fn pending(&self) -> Vec2 {
        self.pending
    }

    /// Pending displacement with any axis that would leave the screen zeroed
    fn clamped_step(&self, pos: Vec2, size: f32, screen: &Screen) -> Vec2 {
        let overflow = screen.overflow(pos + self.pending, size);
        Vec2::new(
            if overflow.horizontal() { 0.0 } else { self.pending.x },
            if overflow.vertical() { 0.0 } else { self.pending.y },
        )
    }
}

/// Variant-specific entity state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DotKind {
    /// Drifts in a straight line, scores or kills on contact
    Ordinary,
    /// Steered by the orientation sensor
    Player(PlayerState),
    /// Stationary, animated, worth extra points
    Bonus(BonusState),
}

/// A single simulated dot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dot {
    pub id: DotId,
    pub pos: Vec2,
    /// Unit direction for ordinary dots, zero otherwise
    pub dir: Vec2,
    pub color: Rgb,
    size: f32,
    pub speed: f32,
    flagged: bool,
    pub kind: DotKind,
}

/// Negative or non-finite sizes and speeds become zero
#[inline]
fn non_negative(v: f32) -> f32 {
    if v.is_finite() { v.max(0.0) } else { 0.0 }
}

/// Non-finite positions collapse to the origin
#[inline]
fn sanitize_pos(pos: Vec2) -> Vec2 {
    if is_finite_vec(pos) { pos } else { Vec2::ZERO }
}

impl Dot {
    pub fn ordinary(id: DotId, pos: Vec2, dir: Vec2, color: Rgb, size: f32, speed: f32) -> Self {
        Self {
            id,
            pos: sanitize_pos(pos),
            dir: unit_or(dir, Vec2::X),
            color,
            size: non_negative(size),
            speed: non_negative(speed),
            flagged: false,
            kind: DotKind::Ordinary,
        }
    }

    pub fn player(id: DotId, pos: Vec2, color: Rgb, size: f32, speed: f32) -> Self {
        Self {
            id,
            pos: sanitize_pos(pos),
            dir: Vec2::ZERO,
            color,
            size: non_negative(size),
            speed: non_negative(speed),
            flagged: false,
            kind: DotKind::Player(PlayerState::default()),
        }
    }

    /// A bonus dot that zooms in from size zero starting at `tick`
    pub fn bonus(
        id: DotId,
        tick: u64,
        pos: Vec2,
        color: Rgb,
        full_size: f32,
        value: u32,
        timing: BonusTiming,
    ) -> Self {
        let full_size = non_negative(full_size);
        Self {
            id,
            pos: sanitize_pos(pos),
            dir: Vec2::ZERO,
            color,
            size: 0.0,
            speed: 0.0,
            flagged: false,
            kind: DotKind::Bonus(BonusState::new(tick, full_size, value, timing)),
        }
    }

    /// Rebuild a bonus dot mid-life; the animation restarts from its phase
    pub fn resumed_bonus(
        id: DotId,
        tick: u64,
        pos: Vec2,
        color: Rgb,
        size: f32,
        state: ResumedBonus,
    ) -> Self {
        let full_size = non_negative(state.full_size);
        let mut bonus = BonusState::new(state.created_tick, full_size, state.value, state.timing);
        let size = non_negative(size);
        let mut flagged = false;
        if state.vanishing {
            bonus.start_vanish(tick, size);
            flagged = true;
        } else {
            bonus.start_pulse(tick);
        }
        Self {
            id,
            pos: sanitize_pos(pos),
            dir: Vec2::ZERO,
            color,
            size,
            speed: 0.0,
            flagged,
            kind: DotKind::Bonus(bonus),
        }
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn set_size(&mut self, size: f32) {
        self.size = non_negative(size);
    }

    pub fn is_player(&self) -> bool {
        matches!(self.kind, DotKind::Player(_))
    }

    pub fn is_bonus(&self) -> bool {
        matches!(self.kind, DotKind::Bonus(_))
    }

    pub fn bonus_state(&self) -> Option<&BonusState> {
        match &self.kind {
            DotKind::Bonus(bonus) => Some(bonus),
            _ => None,
        }
    }

    /// Set the player's per-tick displacement from a normalized tilt
    pub fn steer(&mut self, tilt: Vec2) {
        if let DotKind::Player(player) = &mut self.kind {
            player.pending = if is_finite_vec(tilt) {
                tilt * self.speed
            } else {
                Vec2::ZERO
            };
        }
    }

    /// Advance one tick. Depends only on `tick` and current state.
    pub fn update(&mut self, tick: u64, screen: &Screen) {
        match &mut self.kind {
            DotKind::Ordinary => {
                self.pos += self.dir * self.speed;
            }
            DotKind::Player(player) => {
                self.pos += player.clamped_step(self.pos, self.size, screen);
            }
            DotKind::Bonus(bonus) => {
                let size = &mut self.size;
                let status = bonus.animation.update(tick, |v| *size = non_negative(v));
                if let AnimationStatus::Completed(_) = status {
                    match bonus.phase {
                        BonusPhase::Appearing => bonus.start_pulse(tick),
                        BonusPhase::Vanishing => bonus.phase = BonusPhase::Gone,
                        _ => {}
                    }
                }
                let expired =
                    tick.saturating_sub(bonus.created_tick) >= bonus.timing.lifetime_ticks;
                if expired && !self.flagged {
                    bonus.start_vanish(tick, self.size);
                    self.flagged = true;
                }
            }
        }
    }

    /// Mark for removal; a bonus dot first plays its zoom-out
    pub fn flag_for_removal(&mut self, tick: u64) {
        if let DotKind::Bonus(bonus) = &mut self.kind {
            bonus.start_vanish(tick, self.size);
        }
        self.flagged = true;
    }

    /// Mark for removal with no exit animation
    pub fn flag_for_force_removal(&mut self, _tick: u64) {
        if let DotKind::Bonus(bonus) = &mut self.kind {
            bonus.finish();
        }
        self.flagged = true;
    }

    /// Removal has been requested (the exit animation may still be playing)
    pub fn is_flagged(&self) -> bool {
        self.flagged
    }

    /// Flagged and done animating: safe to drop from the live list
    pub fn is_removable(&self) -> bool {
        match &self.kind {
            DotKind::Bonus(bonus) => self.flagged && !bonus.is_animating(),
            _ => self.flagged,
        }
    }

    /// Apply this dot's side of a collision with the player
    pub fn on_collision(&mut self, tick: u64) {
        match self.kind {
            DotKind::Bonus(_) => self.flag_for_force_removal(tick),
            DotKind::Ordinary => self.flag_for_removal(tick),
            DotKind::Player(_) => {}
        }
    }
}

/// Bonus fields carried across a suspend/resume
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResumedBonus {
    pub value: u32,
    pub created_tick: u64,
    pub full_size: f32,
    pub vanishing: bool,
    pub timing: BonusTiming,
}
