//! Spawn scheduling
//!
//! Ordinary dots enter from a random screen edge at a cadence that speeds up
//! as the session goes on. At most one bonus dot is alive; the next one is
//! armed only after the previous one is completely gone.

use glam::Vec2;
use rand::Rng;

use super::collision::circles_overlap;
use super::dot::{Dot, Rgb};
use crate::consts::BONUS_PLACEMENT_ATTEMPTS;
use crate::settings::{ColorOrder, Rules, Screen};
use crate::unit_or;

/// Ticks that must pass between ordinary spawns after `elapsed` ticks of play.
///
/// Shrinks linearly from `base` to zero over `max_difficulty_ticks`.
pub fn spawn_interval(elapsed: u64, base: f64, max_difficulty_ticks: u64) -> f64 {
    let progress = if max_difficulty_ticks == 0 {
        1.0
    } else {
        (elapsed as f64 / max_difficulty_ticks as f64).min(1.0)
    };
    (base * (1.0 - progress)).max(0.0)
}

/// Random wait before the next bonus dot, uniform in [0.5, 1.5) x mean
pub fn draw_bonus_wait(rng: &mut impl Rng, mean: u64) -> u64 {
    if mean == 0 {
        return 0;
    }
    mean / 2 + rng.random_range(0..mean)
}

/// Screen edge a dot entered from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

/// Where and how a new ordinary dot enters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSpawn {
    pub edge: Edge,
    pub pos: Vec2,
    pub dir: Vec2,
}

/// Pick an edge, a point on it and an inward direction.
///
/// The component along the edge leans toward the screen center in proportion
/// to how far from the edge midpoint the dot spawns.
pub fn edge_spawn(rng: &mut impl Rng, screen: &Screen, size: f32) -> EdgeSpawn {
    let half = size / 2.0;
    let span = Vec2::new(screen.width - size, screen.height - size).max(Vec2::ZERO);
    let center = screen.center();

    let edge = match rng.random_range(0..4) {
        0 => Edge::Left,
        1 => Edge::Right,
        2 => Edge::Top,
        _ => Edge::Bottom,
    };

    let (pos, raw_dir, inward) = match edge {
        Edge::Left | Edge::Right => {
            let (y, push, drift) = along_edge(rng, half, span.y, center.y);
            if edge == Edge::Left {
                (Vec2::new(half, y), Vec2::new(push, drift), Vec2::X)
            } else {
                (Vec2::new(screen.width - half, y), Vec2::new(-push, drift), Vec2::NEG_X)
            }
        }
        Edge::Top | Edge::Bottom => {
            let (x, push, drift) = along_edge(rng, half, span.x, center.x);
            if edge == Edge::Top {
                (Vec2::new(x, half), Vec2::new(drift, push), Vec2::Y)
            } else {
                (Vec2::new(x, screen.height - half), Vec2::new(drift, -push), Vec2::NEG_Y)
            }
        }
    };

    EdgeSpawn {
        edge,
        pos,
        dir: unit_or(raw_dir, inward),
    }
}

/// Returns (coordinate along the edge, inward push, drift along the edge).
fn along_edge(rng: &mut impl Rng, half: f32, extent: f32, mid: f32) -> (f32, f32, f32) {
    let coord = half + rng.random::<f32>() * extent;
    // Offset from the edge midpoint, -1 at one corner and 1 at the other
    let k = if mid > 0.0 { coord / mid - 1.0 } else { 0.0 };
    let push = 1.0 - 0.5 * k.abs();
    let drift = 0.5 * (rng.random::<f32>() - 0.5) - k;
    (coord, push, drift)
}

/// Find a spot for a bonus dot that keeps clear of the player.
///
/// Gives up after a bounded number of attempts; the caller retries next tick.
pub fn bonus_position(
    rng: &mut impl Rng,
    screen: &Screen,
    size: f32,
    player: Option<&Dot>,
) -> Option<Vec2> {
    let span = Vec2::new(screen.width - 2.0 * size, screen.height - 2.0 * size).max(Vec2::ZERO);
    for _ in 0..BONUS_PLACEMENT_ATTEMPTS {
        let pos = Vec2::new(
            size + rng.random::<f32>() * span.x,
            size + rng.random::<f32>() * span.y,
        );
        let blocked = player
            .map(|p| circles_overlap(p.pos, p.size(), pos, size * 2.0))
            .unwrap_or(false);
        if !blocked {
            return Some(pos);
        }
    }
    None
}

/// Spawn timers and colour rotation for one session
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnScheduler {
    last_spawn_tick: u64,
    color_cursor: usize,
    bonus_armed_at: u64,
    bonus_wait: u64,
}

impl SpawnScheduler {
    pub fn new(rng: &mut impl Rng, rules: &Rules) -> Self {
        Self {
            last_spawn_tick: 0,
            color_cursor: rng.random_range(0..rules.palette.len().max(1)),
            bonus_armed_at: 0,
            bonus_wait: draw_bonus_wait(rng, rules.bonus_mean_wait_ticks),
        }
    }

    /// Whether an ordinary dot should enter this tick
    pub fn dot_due(&self, tick: u64, kiosk: bool, rules: &Rules) -> bool {
        let interval = if kiosk {
            rules.small_dot_spawn_interval
        } else {
            spawn_interval(tick, rules.small_dot_spawn_interval, rules.max_difficulty_ticks)
        };
        tick.saturating_sub(self.last_spawn_tick) as f64 > interval
    }

    pub fn mark_dot_spawned(&mut self, tick: u64) {
        self.last_spawn_tick = tick;
    }

    /// Colour for the next ordinary dot
    pub fn next_color(&mut self, rng: &mut impl Rng, rules: &Rules) -> Rgb {
        let palette = &rules.palette;
        match rules.color_order {
            ColorOrder::RoundRobin => {
                let color = palette[self.color_cursor % palette.len()];
                self.color_cursor = self.color_cursor.wrapping_add(1);
                color
            }
            ColorOrder::Random => palette[rng.random_range(0..palette.len())],
        }
    }

    /// Whether the armed bonus wait has run out
    pub fn bonus_due(&self, tick: u64) -> bool {
        tick.saturating_sub(self.bonus_armed_at) > self.bonus_wait
    }

    /// Start a fresh randomized wait from `tick`
    pub fn rearm_bonus(&mut self, tick: u64, rng: &mut impl Rng, rules: &Rules) {
        self.bonus_armed_at = tick;
        self.bonus_wait = draw_bonus_wait(rng, rules.bonus_mean_wait_ticks);
    }

    pub fn bonus_wait(&self) -> u64 {
        self.bonus_wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    #[test]
    fn test_interval_endpoints() {
        assert_eq!(spawn_interval(0, 120.0, 7200), 120.0);
        assert_eq!(spawn_interval(3600, 120.0, 7200), 60.0);
        assert_eq!(spawn_interval(7200, 120.0, 7200), 0.0);
        assert_eq!(spawn_interval(1_000_000, 120.0, 7200), 0.0);
        assert_eq!(spawn_interval(5, 120.0, 0), 0.0);
    }

    #[test]
    fn test_round_robin_cycles_palette() {
        let mut rng = Pcg32::seed_from_u64(1);
        let rules = Rules::default();
        let mut scheduler = SpawnScheduler::new(&mut rng, &rules);

        let first: Vec<Rgb> = (0..3).map(|_| scheduler.next_color(&mut rng, &rules)).collect();
        let second: Vec<Rgb> = (0..3).map(|_| scheduler.next_color(&mut rng, &rules)).collect();
        assert_eq!(first, second);
        for color in &rules.palette {
            assert!(first.contains(color));
        }
    }

    #[test]
    fn test_random_color_order_stays_in_palette() {
        let mut rng = Pcg32::seed_from_u64(6);
        let rules = Rules {
            color_order: ColorOrder::Random,
            ..Rules::default()
        };
        let mut scheduler = SpawnScheduler::new(&mut rng, &rules);

        let colors: Vec<Rgb> = (0..60).map(|_| scheduler.next_color(&mut rng, &rules)).collect();
        assert!(colors.iter().all(|c| rules.palette.contains(c)));
        for color in &rules.palette {
            assert!(colors.contains(color));
        }
    }

    #[test]
    fn test_dot_due_respects_interval() {
        let mut rng = Pcg32::seed_from_u64(2);
        let rules = Rules::default();
        let mut scheduler = SpawnScheduler::new(&mut rng, &rules);

        assert!(!scheduler.dot_due(100, false, &rules));
        assert!(scheduler.dot_due(121, false, &rules));
        scheduler.mark_dot_spawned(121);
        assert!(!scheduler.dot_due(122, false, &rules));

        // Kiosk ignores difficulty scaling
        scheduler.mark_dot_spawned(7000);
        assert!(!scheduler.dot_due(7100, true, &rules));
        assert!(scheduler.dot_due(7100, false, &rules));
    }

    #[test]
    fn test_bonus_rearm() {
        let mut rng = Pcg32::seed_from_u64(3);
        let rules = Rules::default();
        let mut scheduler = SpawnScheduler::new(&mut rng, &rules);
        scheduler.rearm_bonus(1000, &mut rng, &rules);
        let wait = scheduler.bonus_wait();
        assert!(!scheduler.bonus_due(1000 + wait));
        assert!(scheduler.bonus_due(1000 + wait + 1));
    }

    #[test]
    fn test_bonus_position_avoids_player() {
        let mut rng = Pcg32::seed_from_u64(4);
        let screen = Screen::new(400.0, 400.0, 100.0);
        let player = Dot::player(1, Vec2::new(200.0, 200.0), Rgb::new(0, 0, 0), 100.0, 1.0);
        for _ in 0..200 {
            if let Some(pos) = bonus_position(&mut rng, &screen, 20.0, Some(&player)) {
                assert!(!circles_overlap(player.pos, player.size(), pos, 40.0));
                assert!(!screen.overflow(pos, 20.0).any());
            }
        }
    }

    #[test]
    fn test_bonus_position_gives_up_when_blocked() {
        let mut rng = Pcg32::seed_from_u64(5);
        let screen = Screen::new(100.0, 100.0, 1.0);
        let player = Dot::player(1, Vec2::new(50.0, 50.0), Rgb::new(0, 0, 0), 400.0, 1.0);
        assert_eq!(bonus_position(&mut rng, &screen, 10.0, Some(&player)), None);
    }

    proptest! {
        #[test]
        fn prop_interval_non_increasing(a in 0u64..20_000, b in 0u64..20_000, base in 0.0f64..500.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let early = spawn_interval(lo, base, 7200);
            let late = spawn_interval(hi, base, 7200);
            prop_assert!(late <= early);
            prop_assert!(late >= 0.0);
        }

        #[test]
        fn prop_edge_spawn_on_screen_and_inward(seed in any::<u64>()) {
            let mut rng = Pcg32::seed_from_u64(seed);
            let screen = Screen::new(1080.0, 1920.0, 480.0);
            let size = 30.0;
            let spawn = edge_spawn(&mut rng, &screen, size);

            prop_assert!(!screen.overflow(spawn.pos, size).any());
            prop_assert!((spawn.dir.length() - 1.0).abs() < 1e-4);
            let inward = match spawn.edge {
                Edge::Left => spawn.dir.x,
                Edge::Right => -spawn.dir.x,
                Edge::Top => spawn.dir.y,
                Edge::Bottom => -spawn.dir.y,
            };
            prop_assert!(inward > 0.0);
        }

        #[test]
        fn prop_bonus_wait_in_range(seed in any::<u64>(), mean in 1u64..10_000) {
            let mut rng = Pcg32::seed_from_u64(seed);
            let wait = draw_bonus_wait(&mut rng, mean);
            prop_assert!(wait >= mean / 2);
            prop_assert!(wait < mean / 2 + mean);
        }
    }
}
