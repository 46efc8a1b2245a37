//! Collision detection and scoring outcomes
//!
//! Dots are circles whose `size` is a diameter. The overlap test compares
//! squared distances so no square root is taken per pair.

use glam::Vec2;
use rand::Rng;

use super::dot::{Dot, DotKind, Rgb};

/// Whether two circles given by center and diameter touch or overlap
#[inline]
pub fn circles_overlap(p1: Vec2, size1: f32, p2: Vec2, size2: f32) -> bool {
    let reach = size1 + size2;
    p1.distance_squared(p2) - reach * reach / 4.0 <= 0.0
}

/// Collision test between two dots. A dot never collides with itself.
pub fn collides(a: &Dot, b: &Dot) -> bool {
    if a.id == b.id {
        return false;
    }
    circles_overlap(a.pos, a.size(), b.pos, b.size())
}

/// What a player collision does to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionOutcome {
    /// Bonus pickup: add `value`, recolour the player, drop the bonus at once
    Bonus { value: u32 },
    /// Same colour: +1 and the dot is removed
    Matched,
    /// Different colour: the session ends
    Mismatched,
}

/// Classify a collision between the player and another dot.
///
/// Returns `None` when `other` is the player itself.
pub fn classify(player: &Dot, other: &Dot) -> Option<CollisionOutcome> {
    match &other.kind {
        DotKind::Bonus(bonus) => Some(CollisionOutcome::Bonus {
            value: bonus.value(),
        }),
        DotKind::Ordinary if other.color == player.color => Some(CollisionOutcome::Matched),
        DotKind::Ordinary => Some(CollisionOutcome::Mismatched),
        DotKind::Player(_) => None,
    }
}

/// Pick a palette colour uniformly at random, never `current`.
///
/// Falls back to `current` if the palette offers nothing else.
pub fn pick_new_color(rng: &mut impl Rng, palette: &[Rgb], current: Rgb) -> Rgb {
    let choices = palette.iter().filter(|&&c| c != current).count();
    if choices == 0 {
        return current;
    }
    let pick = rng.random_range(0..choices);
    palette
        .iter()
        .copied()
        .filter(|&c| c != current)
        .nth(pick)
        .unwrap_or(current)
}
