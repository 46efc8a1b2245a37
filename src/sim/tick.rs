//! Fixed timestep simulation tick
//!
//! Advances the game state by exactly one step. Nothing here reads the clock;
//! the same seed and input sequence always produce the same state.

use glam::Vec2;
use rand::Rng;

use super::collision::{CollisionOutcome, classify, collides, pick_new_color};
use super::dot::{BonusTiming, Dot, DotKind};
use super::spawn::{bonus_position, edge_spawn};
use super::state::{GameEvent, GameState, SessionState, SoundCue};
use crate::settings::OffscreenPolicy;

/// Input for a single tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickInput {
    /// Calibrated, normalized tilt; each axis in [-1, 1]
    pub tilt: Vec2,
}

/// Advance the game state by one fixed timestep
pub fn tick(state: &mut GameState, input: &TickInput, events: &mut Vec<GameEvent>) {
    if !state.session.is_ticking() {
        return;
    }

    spawn_dot(state);
    spawn_bonus(state, events);

    let now = state.tick;
    let screen = state.screen;
    for dot in &mut state.dots {
        if dot.is_player() {
            dot.steer(input.tilt);
        }
        dot.update(now, &screen);
    }

    handle_offscreen(state);

    if state.session == SessionState::Running {
        resolve_collisions(state, events);
    }

    compact(state);
    state.tick += 1;
}

/// Add an ordinary dot at a screen edge when the cadence allows
fn spawn_dot(state: &mut GameState) {
    let rules = &state.rules;
    if !state.scheduler.dot_due(state.tick, state.kiosk, rules) {
        return;
    }
    let cap = if state.kiosk {
        rules.kiosk_dot_cap.min(rules.dot_limit)
    } else {
        rules.dot_limit
    };
    if state.dots.len() >= cap {
        return;
    }

    let size = rules.small_dot_size(&state.screen);
    let speed = rules.small_dot_speed(&state.screen);
    let spawn = edge_spawn(&mut state.rng, &state.screen, size);
    let color = state.scheduler.next_color(&mut state.rng, &state.rules);
    let id = state.next_entity_id();
    state
        .dots
        .push(Dot::ordinary(id, spawn.pos, spawn.dir, color, size, speed));
    state.scheduler.mark_dot_spawned(state.tick);
    log::debug!("Spawned dot {} on {:?} edge at tick {}", id, spawn.edge, state.tick);
}

/// Add the bonus dot once its wait has run out and none is alive
fn spawn_bonus(state: &mut GameState, events: &mut Vec<GameEvent>) {
    if state.bonus_id.is_some() || !state.scheduler.bonus_due(state.tick) {
        return;
    }
    if state.dots.len() >= state.rules.dot_limit {
        return;
    }

    let size = state.rules.bonus_size(&state.screen);
    let player = state
        .player_id
        .and_then(|id| state.dots.iter().find(|d| d.id == id));
    let Some(pos) = bonus_position(&mut state.rng, &state.screen, size, player) else {
        log::debug!("Bonus placement deferred at tick {}", state.tick);
        return;
    };
    let color = match player {
        Some(p) => p.color,
        None => {
            let palette = &state.rules.palette;
            palette[state.rng.random_range(0..palette.len())]
        }
    };

    let id = state.next_entity_id();
    let timing = BonusTiming::from(&state.rules);
    state.dots.push(Dot::bonus(
        id,
        state.tick,
        pos,
        color,
        size,
        state.rules.bonus_value,
        timing,
    ));
    state.bonus_id = Some(id);
    events.push(GameEvent::Sound(SoundCue::BonusSpawned));
    log::debug!("Spawned bonus dot {} at tick {}", id, state.tick);
}

/// Bounce or despawn ordinary dots that left the screen
fn handle_offscreen(state: &mut GameState) {
    let screen = state.screen;
    let policy = state.rules.offscreen;
    let now = state.tick;

    for dot in state
        .dots
        .iter_mut()
        .filter(|d| matches!(d.kind, DotKind::Ordinary))
    {
        let out = screen.overflow(dot.pos, dot.size());
        if !out.any() {
            continue;
        }
        match policy {
            OffscreenPolicy::Bounce => {
                if out.left {
                    dot.dir.x = dot.dir.x.abs();
                } else if out.right {
                    dot.dir.x = -dot.dir.x.abs();
                }
                if out.top {
                    dot.dir.y = dot.dir.y.abs();
                } else if out.bottom {
                    dot.dir.y = -dot.dir.y.abs();
                }
            }
            OffscreenPolicy::Despawn => dot.flag_for_removal(now),
        }
    }
}

/// Test the player against every other live dot and apply the outcomes
fn resolve_collisions(state: &mut GameState, events: &mut Vec<GameEvent>) {
    let Some(player_id) = state.player_id else {
        return;
    };
    let Some(pi) = state.dots.iter().position(|d| d.id == player_id) else {
        return;
    };
    let now = state.tick;

    for i in 0..state.dots.len() {
        let (player, other) = (&state.dots[pi], &state.dots[i]);
        if other.is_removable() || !collides(player, other) {
            continue;
        }
        let Some(outcome) = classify(player, other) else {
            continue;
        };

        events.push(GameEvent::Sound(SoundCue::DotConsumed));
        match outcome {
            CollisionOutcome::Bonus { value } => {
                state.score = state.score.saturating_add(value);
                let current = state.dots[pi].color;
                state.dots[pi].color = pick_new_color(&mut state.rng, &state.rules.palette, current);
                state.dots[i].on_collision(now);
                events.push(GameEvent::ScoreChanged(state.score));
            }
            CollisionOutcome::Matched => {
                state.score = state.score.saturating_add(1);
                state.dots[i].on_collision(now);
                events.push(GameEvent::ScoreChanged(state.score));
            }
            CollisionOutcome::Mismatched => {
                log::info!("Game over at tick {} with score {}", now, state.score);
                state.set_session(SessionState::GameOver, events);
                return;
            }
        }
    }
}

/// Drop removable dots and re-arm the bonus timer once the bonus is gone
fn compact(state: &mut GameState) {
    state.dots.retain(|d| !d.is_removable());

    if let Some(bonus_id) = state.bonus_id {
        if !state.dots.iter().any(|d| d.id == bonus_id) {
            state.bonus_id = None;
            state
                .scheduler
                .rearm_bonus(state.tick, &mut state.rng, &state.rules);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Rules, Screen};

    fn running_state() -> (GameState, Vec<GameEvent>) {
        let mut state = GameState::new(4242, Screen::default(), Rules::default());
        let mut events = Vec::new();
        state.start(false, &mut events);
        events.clear();
        (state, events)
    }

    fn add_dot_on_player(state: &mut GameState, same_color: bool) -> u32 {
        let player = state.player().unwrap().clone();
        let color = if same_color {
            player.color
        } else {
            pick_new_color(&mut state.rng, &state.rules.palette, player.color)
        };
        let id = state.next_entity_id();
        state
            .dots
            .push(Dot::ordinary(id, player.pos, Vec2::X, color, 30.0, 1.0));
        id
    }

    #[test]
    fn test_matched_collision_scores() {
        let (mut state, mut events) = running_state();
        let id = add_dot_on_player(&mut state, true);

        tick(&mut state, &TickInput::default(), &mut events);

        assert_eq!(state.score, 1);
        assert!(state.dots.iter().all(|d| d.id != id));
        assert!(events.contains(&GameEvent::ScoreChanged(1)));
        assert!(events.contains(&GameEvent::Sound(SoundCue::DotConsumed)));
        assert_eq!(state.session, SessionState::Running);
    }

    #[test]
    fn test_bonus_pickup_scores_and_recolors() {
        let (mut state, mut events) = running_state();
        let player = state.player().unwrap().clone();
        let id = state.next_entity_id();
        let timing = BonusTiming::from(&state.rules);
        state
            .dots
            .push(Dot::bonus(id, 0, player.pos, player.color, 60.0, 5, timing));
        state.bonus_id = Some(id);

        tick(&mut state, &TickInput::default(), &mut events);

        assert_eq!(state.score, 5);
        let recolored = state.player().unwrap().color;
        assert_ne!(recolored, player.color);
        assert!(state.rules.palette.contains(&recolored));
        // Gone in the same tick: no zoom-out
        assert!(state.dots.iter().all(|d| !d.is_bonus()));
        assert_eq!(state.bonus_id, None);
        assert!(events.contains(&GameEvent::ScoreChanged(5)));
    }

    #[test]
    fn test_vanishing_bonus_can_still_be_picked_up() {
        let (mut state, mut events) = running_state();
        let player = state.player().unwrap().clone();
        let id = state.next_entity_id();
        let timing = BonusTiming::from(&state.rules);
        let mut bonus = Dot::bonus(id, 0, player.pos, player.color, 60.0, 5, timing);
        bonus.flag_for_removal(0);
        assert!(!bonus.is_removable());
        state.dots.push(bonus);
        state.bonus_id = Some(id);

        tick(&mut state, &TickInput::default(), &mut events);

        assert_eq!(state.score, 5);
        assert_ne!(state.player().unwrap().color, player.color);
        assert!(state.dots.iter().all(|d| d.id != id));
        assert_eq!(state.bonus_id, None);
    }

    #[test]
    fn test_mismatched_collision_ends_game() {
        let (mut state, mut events) = running_state();
        add_dot_on_player(&mut state, false);

        tick(&mut state, &TickInput::default(), &mut events);

        assert_eq!(state.session, SessionState::GameOver);
        assert!(events.contains(&GameEvent::StateChanged(SessionState::GameOver)));

        // Further ticks are no-ops
        let frozen = state.tick;
        tick(&mut state, &TickInput::default(), &mut events);
        assert_eq!(state.tick, frozen);
    }

    #[test]
    fn test_paused_state_does_not_tick() {
        let (mut state, mut events) = running_state();
        state.pause(&mut events);
        tick(&mut state, &TickInput::default(), &mut events);
        assert_eq!(state.tick, 0);
    }

    #[test]
    fn test_tilt_moves_player() {
        let (mut state, mut events) = running_state();
        let start = state.player_pos().unwrap();
        let input = TickInput {
            tilt: Vec2::new(0.5, -0.5),
        };
        tick(&mut state, &input, &mut events);
        let speed = state.rules.player_speed(&state.screen);
        let moved = state.player_pos().unwrap() - start;
        assert!((moved - Vec2::new(0.5, -0.5) * speed).length() < 1e-3);
    }

    #[test]
    fn test_kiosk_never_scores_and_respects_cap() {
        let mut state = GameState::new(7, Screen::default(), Rules::default());
        let mut events = Vec::new();
        state.start(true, &mut events);

        let mut bonus_spawns = 0;
        for _ in 0..6000 {
            events.clear();
            tick(&mut state, &TickInput::default(), &mut events);
            bonus_spawns += events
                .iter()
                .filter(|e| **e == GameEvent::Sound(SoundCue::BonusSpawned))
                .count();

            assert_eq!(state.score, 0);
            assert!(state.live_count() <= state.rules.kiosk_dot_cap + 1);
            assert!(state.dots.iter().filter(|d| d.is_bonus()).count() <= 1);
            assert!(!events.contains(&GameEvent::Sound(SoundCue::DotConsumed)));
        }
        assert!(bonus_spawns >= 2);
        assert!(state.live_count() > 0);
    }

    #[test]
    fn test_bounce_turns_dot_inward() {
        let mut state = GameState::new(1, Screen::default(), Rules::default());
        let mut events = Vec::new();
        state.start(true, &mut events);
        let id = state.next_entity_id();
        let edge = Vec2::new(state.screen.width - 5.0, 400.0);
        state
            .dots
            .push(Dot::ordinary(id, edge, Vec2::new(1.0, 0.2), state.rules.palette[0], 30.0, 4.0));

        tick(&mut state, &TickInput::default(), &mut events);
        let dot = state.dots.iter().find(|d| d.id == id).unwrap();
        assert!(dot.dir.x < 0.0);
        assert!(dot.dir.y > 0.0);
        assert!((dot.dir.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_despawn_policy_removes_dot() {
        let rules = Rules {
            offscreen: OffscreenPolicy::Despawn,
            ..Rules::default()
        };
        let mut state = GameState::new(1, Screen::default(), rules);
        let mut events = Vec::new();
        state.start(true, &mut events);
        let id = state.next_entity_id();
        state
            .dots
            .push(Dot::ordinary(id, Vec2::new(10.0, 400.0), Vec2::NEG_X, state.rules.palette[0], 30.0, 4.0));

        tick(&mut state, &TickInput::default(), &mut events);
        assert!(state.dots.iter().all(|d| d.id != id));
    }

    #[test]
    fn test_spawns_speed_up_with_difficulty() {
        let mut state = GameState::new(3, Screen::default(), Rules::default());
        let mut events = Vec::new();
        state.start(true, &mut events);
        state.kiosk = false;
        state.session = SessionState::Running;

        let count_spawns = |state: &mut GameState, ticks: u64| {
            let before = state.next_id;
            for _ in 0..ticks {
                let mut events = Vec::new();
                tick(state, &TickInput::default(), &mut events);
            }
            state.next_id - before
        };
        let early = count_spawns(&mut state, 1200);
        state.tick = 6000;
        let late = count_spawns(&mut state, 1200);
        assert!(late > early);
    }

    #[test]
    fn test_determinism() {
        let run = || {
            let mut state = GameState::new(99999, Screen::default(), Rules::default());
            let mut events = Vec::new();
            state.start(true, &mut events);
            for i in 0..2000u32 {
                let input = TickInput {
                    tilt: Vec2::new((i as f32 * 0.01).sin(), 0.0),
                };
                tick(&mut state, &input, &mut events);
            }
            (state.tick, state.dots, events)
        };

        let (tick_a, dots_a, events_a) = run();
        let (tick_b, dots_b, events_b) = run();
        assert_eq!(tick_a, tick_b);
        assert_eq!(dots_a, dots_b);
        assert_eq!(events_a, events_b);
    }
}
