//! Session state and core simulation types
//!
//! Everything a tick reads or writes lives in [`GameState`]. The simulation
//! thread is its only mutator.

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::dot::{Dot, DotId};
use super::spawn::SpawnScheduler;
use crate::settings::{Rules, Screen};

/// Lifecycle of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, nothing started yet
    Idle,
    /// Unscored demo: dots drift, no player
    Kiosk,
    /// Active scored play
    Running,
    /// No ticks until resumed
    Paused,
    /// A mismatched collision ended the run
    GameOver,
}

impl SessionState {
    /// Whether a tick advances the simulation in this state
    pub fn is_ticking(self) -> bool {
        matches!(self, SessionState::Running | SessionState::Kiosk)
    }
}

/// Discrete sound triggers for the audio layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCue {
    /// The player touched a dot
    DotConsumed,
    /// A bonus dot appeared
    BonusSpawned,
}

/// Events published to the platform layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    ScoreChanged(u32),
    StateChanged(SessionState),
    /// One loop iteration finished and its frame was published
    StepCompleted,
    Sound(SoundCue),
    /// The render consumer did not acknowledge a frame in time
    ConsumerStalled,
}

/// Complete simulation state for one session
#[derive(Debug, Clone)]
pub struct GameState {
    /// Session seed
    pub seed: u64,
    pub rng: Pcg32,
    /// Ticks simulated since the session started
    pub tick: u64,
    pub session: SessionState,
    /// Session was started as a demo; resume returns to `Kiosk`
    pub kiosk: bool,
    pub score: u32,
    /// Live dots in spawn order
    pub dots: Vec<Dot>,
    pub player_id: Option<DotId>,
    /// The single live bonus dot, if any
    pub bonus_id: Option<DotId>,
    pub scheduler: SpawnScheduler,
    pub screen: Screen,
    pub rules: Rules,
    /// Never reset, so ids stay unique across restarts
    pub(crate) next_id: DotId,
}

impl GameState {
    /// Create an idle state with the given seed
    pub fn new(seed: u64, screen: Screen, rules: Rules) -> Self {
        let mut rng = Pcg32::seed_from_u64(seed);
        let scheduler = SpawnScheduler::new(&mut rng, &rules);
        Self {
            seed,
            rng,
            tick: 0,
            session: SessionState::Idle,
            kiosk: false,
            score: 0,
            dots: Vec::new(),
            player_id: None,
            bonus_id: None,
            scheduler,
            screen,
            rules,
            next_id: 1,
        }
    }

    /// Allocate a new entity ID
    pub fn next_entity_id(&mut self) -> DotId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Clear the field and begin a fresh session
    pub fn start(&mut self, kiosk: bool, events: &mut Vec<GameEvent>) {
        self.dots.clear();
        self.tick = 0;
        self.score = 0;
        self.kiosk = kiosk;
        self.bonus_id = None;
        self.player_id = None;
        self.scheduler = SpawnScheduler::new(&mut self.rng, &self.rules);

        if !kiosk {
            let id = self.next_entity_id();
            let palette = &self.rules.palette;
            let color = palette[self.rng.random_range(0..palette.len())];
            self.dots.push(Dot::player(
                id,
                self.screen.center(),
                color,
                self.rules.player_size(&self.screen),
                self.rules.player_speed(&self.screen),
            ));
            self.player_id = Some(id);
        }

        events.push(GameEvent::ScoreChanged(0));
        let session = if kiosk {
            SessionState::Kiosk
        } else {
            SessionState::Running
        };
        self.set_session(session, events);
        log::info!("Session started (kiosk: {}, seed: {})", kiosk, self.seed);
    }

    /// Switch session state, emitting `StateChanged` on an actual change
    pub fn set_session(&mut self, session: SessionState, events: &mut Vec<GameEvent>) {
        if self.session != session {
            self.session = session;
            events.push(GameEvent::StateChanged(session));
        }
    }

    /// Running or Kiosk -> Paused. Returns whether anything changed.
    pub fn pause(&mut self, events: &mut Vec<GameEvent>) -> bool {
        if !self.session.is_ticking() {
            return false;
        }
        self.set_session(SessionState::Paused, events);
        true
    }

    /// Paused -> Running (or Kiosk). Returns whether anything changed.
    pub fn resume(&mut self, events: &mut Vec<GameEvent>) -> bool {
        if self.session != SessionState::Paused {
            return false;
        }
        let session = if self.kiosk {
            SessionState::Kiosk
        } else {
            SessionState::Running
        };
        self.set_session(session, events);
        true
    }

    pub fn player(&self) -> Option<&Dot> {
        let id = self.player_id?;
        self.dots.iter().find(|d| d.id == id)
    }

    pub fn bonus(&self) -> Option<&Dot> {
        let id = self.bonus_id?;
        self.dots.iter().find(|d| d.id == id)
    }

    pub fn live_count(&self) -> usize {
        self.dots.len()
    }

    pub fn player_pos(&self) -> Option<Vec2> {
        self.player().map(|p| p.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_state() -> GameState {
        GameState::new(12345, Screen::default(), Rules::default())
    }

    #[test]
    fn test_start_spawns_player_at_center() {
        let mut state = new_state();
        let mut events = Vec::new();
        state.start(false, &mut events);

        assert_eq!(state.session, SessionState::Running);
        assert_eq!(state.live_count(), 1);
        assert_eq!(state.player_pos(), Some(Screen::default().center()));
        let player = state.player().unwrap();
        assert!(state.rules.palette.contains(&player.color));
        assert!(events.contains(&GameEvent::StateChanged(SessionState::Running)));
    }

    #[test]
    fn test_kiosk_has_no_player() {
        let mut state = new_state();
        let mut events = Vec::new();
        state.start(true, &mut events);
        assert_eq!(state.session, SessionState::Kiosk);
        assert!(state.player().is_none());
        assert_eq!(state.live_count(), 0);
    }

    #[test]
    fn test_restart_resets_but_keeps_ids_unique() {
        let mut state = new_state();
        let mut events = Vec::new();
        state.start(false, &mut events);
        let first = state.player_id.unwrap();
        state.score = 40;
        state.tick = 900;

        state.start(false, &mut events);
        assert_eq!(state.score, 0);
        assert_eq!(state.tick, 0);
        assert_eq!(state.live_count(), 1);
        assert!(state.player_id.unwrap() > first);
    }

    #[test]
    fn test_pause_resume_transitions() {
        let mut state = new_state();
        let mut events = Vec::new();
        assert!(!state.pause(&mut events));

        state.start(true, &mut events);
        events.clear();
        assert!(state.pause(&mut events));
        assert_eq!(state.session, SessionState::Paused);
        assert!(!state.pause(&mut events));

        assert!(state.resume(&mut events));
        assert_eq!(state.session, SessionState::Kiosk);
        assert_eq!(
            events,
            vec![
                GameEvent::StateChanged(SessionState::Paused),
                GameEvent::StateChanged(SessionState::Kiosk),
            ]
        );
    }
}
