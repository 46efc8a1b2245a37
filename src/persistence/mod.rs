//! Session snapshots for suspend/resume
//!
//! A snapshot stores exactly what is needed to continue a session: the live
//! dots, the player and bonus dots, score, tick and session flags. In-flight
//! animations are not stored; a restored bonus dot restarts its pulse (or its
//! zoom-out if it was already leaving).

use glam::Vec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::settings::{Rules, Screen};
use crate::sim::{
    BonusPhase, BonusTiming, Dot, DotId, DotKind, GameState, ResumedBonus, Rgb, SessionState,
    SpawnScheduler,
};

/// Bumped whenever the snapshot layout changes incompatibly
pub const SNAPSHOT_VERSION: u32 = 1;

/// Saved session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub seed: u64,
    pub tick: u64,
    pub score: u32,
    pub session: SessionState,
    pub paused: bool,
    pub kiosk: bool,
    pub next_id: DotId,
    /// Ordinary dots
    pub dots: Vec<DotSnapshot>,
    pub player: Option<DotSnapshot>,
    pub bonus: Option<DotSnapshot>,
}

/// Saved dot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DotSnapshot {
    pub id: DotId,
    pub pos: Vec2,
    pub dir: Vec2,
    pub color: Rgb,
    pub size: f32,
    pub speed: f32,
    pub kind: DotSnapshotKind,
}

/// Variant data that survives a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DotSnapshotKind {
    Ordinary,
    Player,
    Bonus {
        value: u32,
        created_tick: u64,
        full_size: f32,
        vanishing: bool,
    },
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

impl DotSnapshot {
    fn capture(dot: &Dot) -> Self {
        let kind = match &dot.kind {
            DotKind::Ordinary => DotSnapshotKind::Ordinary,
            DotKind::Player(_) => DotSnapshotKind::Player,
            DotKind::Bonus(bonus) => DotSnapshotKind::Bonus {
                value: bonus.value(),
                created_tick: bonus.created_tick(),
                full_size: bonus.full_size(),
                vanishing: dot.is_flagged()
                    || matches!(bonus.phase(), BonusPhase::Vanishing | BonusPhase::Gone),
            },
        };
        Self {
            id: dot.id,
            pos: dot.pos,
            dir: dot.dir,
            color: dot.color,
            size: dot.size(),
            speed: dot.speed,
            kind,
        }
    }

    /// Reject values the simulation cannot accept
    fn validate(&self) -> Result<(), SnapshotError> {
        let reason = if !(self.pos.x.is_finite() && self.pos.y.is_finite()) {
            Some("non-finite position")
        } else if !(self.dir.x.is_finite() && self.dir.y.is_finite()) {
            Some("non-finite direction")
        } else if !self.size.is_finite() || self.size < 0.0 {
            Some("size must be finite and non-negative")
        } else if !self.speed.is_finite() {
            Some("non-finite speed")
        } else if let DotSnapshotKind::Bonus { full_size, .. } = self.kind {
            (!full_size.is_finite() || full_size < 0.0).then_some("invalid bonus size")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(SnapshotError::InvalidEntity {
                id: self.id,
                reason,
            }),
            None => Ok(()),
        }
    }

    fn restore(&self, tick: u64, timing: BonusTiming) -> Dot {
        match self.kind {
            DotSnapshotKind::Ordinary => {
                Dot::ordinary(self.id, self.pos, self.dir, self.color, self.size, self.speed)
            }
            DotSnapshotKind::Player => {
                Dot::player(self.id, self.pos, self.color, self.size, self.speed)
            }
            DotSnapshotKind::Bonus {
                value,
                created_tick,
                full_size,
                vanishing,
            } => Dot::resumed_bonus(
                self.id,
                tick,
                self.pos,
                self.color,
                self.size,
                ResumedBonus {
                    value,
                    created_tick,
                    full_size,
                    vanishing,
                    timing,
                },
            ),
        }
    }
}

impl Snapshot {
    /// Capture the state of a session
    pub fn capture(state: &GameState) -> Self {
        let mut dots = Vec::new();
        let mut player = None;
        let mut bonus = None;
        for dot in &state.dots {
            let saved = DotSnapshot::capture(dot);
            match saved.kind {
                DotSnapshotKind::Ordinary => dots.push(saved),
                DotSnapshotKind::Player => player = Some(saved),
                DotSnapshotKind::Bonus { .. } => bonus = Some(saved),
            }
        }
        Self {
            version: SNAPSHOT_VERSION,
            seed: state.seed,
            tick: state.tick,
            score: state.score,
            session: state.session,
            paused: state.session == SessionState::Paused,
            kiosk: state.kiosk,
            next_id: state.next_id,
            dots,
            player,
            bonus,
        }
    }

    /// Rebuild a game state that continues where the snapshot left off
    pub fn restore(&self, screen: Screen, rules: Rules) -> Result<GameState, SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let roles = self
            .dots
            .iter()
            .map(|d| (d, "ordinary"))
            .chain(self.player.iter().map(|d| (d, "player")))
            .chain(self.bonus.iter().map(|d| (d, "bonus")));
        for (dot, role) in roles {
            dot.validate()?;
            let kind_matches = matches!(
                (&dot.kind, role),
                (DotSnapshotKind::Ordinary, "ordinary")
                    | (DotSnapshotKind::Player, "player")
                    | (DotSnapshotKind::Bonus { .. }, "bonus")
            );
            if !kind_matches {
                return Err(SnapshotError::InvalidEntity {
                    id: dot.id,
                    reason: "dot kind does not match its slot",
                });
            }
            if dot.id >= self.next_id {
                return Err(SnapshotError::InvalidEntity {
                    id: dot.id,
                    reason: "id not below next_id",
                });
            }
        }

        let session = if self.paused {
            SessionState::Paused
        } else {
            self.session
        };

        let mut state = GameState::new(self.seed, screen, rules);
        state.rng = Pcg32::seed_from_u64(self.seed ^ self.tick);
        state.scheduler = SpawnScheduler::new(&mut state.rng, &state.rules);
        state.scheduler.mark_dot_spawned(self.tick);
        state
            .scheduler
            .rearm_bonus(self.tick, &mut state.rng, &state.rules);
        state.tick = self.tick;
        state.score = self.score;
        state.session = session;
        state.kiosk = self.kiosk;
        state.next_id = self.next_id;

        let timing = BonusTiming::from(&state.rules);
        let mut dots: Vec<Dot> = self
            .dots
            .iter()
            .chain(self.player.iter())
            .chain(self.bonus.iter())
            .map(|d| d.restore(self.tick, timing))
            .collect();
        dots.sort_by_key(|d| d.id);
        state.dots = dots;
        state.player_id = self.player.as_ref().map(|p| p.id);
        state.bonus_id = self.bonus.as_ref().map(|b| b.id);

        log::info!(
            "Restored session at tick {} ({} dots, score {})",
            state.tick,
            state.live_count(),
            state.score
        );
        Ok(state)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a snapshot, rejecting other versions before reading the rest
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let probe: VersionProbe = serde_json::from_str(json)?;
        if probe.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: probe.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(serde_json::from_str(json)?)
    }
}
