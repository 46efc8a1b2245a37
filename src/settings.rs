//! Game settings: screen geometry, gameplay rules and loop timing
//!
//! Loaded from a JSON file; every field has a default so partial files work.

use std::path::Path;
use std::time::Duration;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::ConfigError;
use crate::sim::Rgb;

/// Drawable area the simulation runs in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Screen {
    pub width: f32,
    pub height: f32,
    /// Pixel density; every size and speed ratio is scaled by it
    pub density: f32,
}

impl Default for Screen {
    fn default() -> Self {
        Self {
            width: 1080.0,
            height: 1920.0,
            density: 480.0,
        }
    }
}

/// Which screen edges a circle of a given size sticks out of
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overflow {
    pub left: bool,
    pub top: bool,
    pub right: bool,
    pub bottom: bool,
}

impl Overflow {
    /// Out on the x axis
    pub fn horizontal(&self) -> bool {
        self.left || self.right
    }

    /// Out on the y axis
    pub fn vertical(&self) -> bool {
        self.top || self.bottom
    }

    pub fn any(&self) -> bool {
        self.horizontal() || self.vertical()
    }
}

impl Screen {
    pub fn new(width: f32, height: f32, density: f32) -> Self {
        Self {
            width,
            height,
            density,
        }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }

    /// Check a circle's bounding box against each screen edge
    pub fn overflow(&self, pos: Vec2, size: f32) -> Overflow {
        let half = size / 2.0;
        Overflow {
            left: pos.x - half < 0.0,
            top: pos.y - half < 0.0,
            right: pos.x + half > self.width,
            bottom: pos.y + half > self.height,
        }
    }
}

/// What happens to an ordinary dot that leaves the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OffscreenPolicy {
    /// Reflect the direction on the crossed axis so the dot heads back in
    #[default]
    Bounce,
    /// Remove the dot as soon as any edge is crossed
    Despawn,
}

/// How colours are handed out to newly spawned dots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorOrder {
    #[default]
    RoundRobin,
    Random,
}

/// Gameplay tuning. Ratios are multiplied by `Screen::density`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    // === Ordinary dots ===
    pub small_dot_speed_ratio: f32,
    pub small_dot_size_ratio: f32,
    /// Spawn gap at the start of a session (ticks)
    pub small_dot_spawn_interval: f64,

    // === Bonus dot ===
    pub bonus_size_ratio: f32,
    pub bonus_value: u32,
    /// Zoom in/out duration (ticks)
    pub bonus_animation_ticks: u64,
    /// Mean wait before a bonus dot appears (ticks); actual wait is 0.5x..1.5x
    pub bonus_mean_wait_ticks: u64,
    /// Bonus dot starts vanishing this long after it appeared (ticks)
    pub bonus_lifetime_ticks: u64,
    /// Larger is a slower pulse
    pub bonus_pulse_speed: f32,

    // === Player ===
    /// Displacement per tick at full tilt
    pub player_speed_ratio: f32,
    pub player_size_ratio: f32,

    // === Sensor ===
    pub calibrate_sensor: bool,
    pub calibration_window_ms: u64,

    // === Difficulty and limits ===
    /// Elapsed ticks at which the spawn gap reaches zero
    pub max_difficulty_ticks: u64,
    pub dot_limit: usize,
    pub kiosk_dot_cap: usize,

    pub offscreen: OffscreenPolicy,
    pub color_order: ColorOrder,
    pub palette: Vec<Rgb>,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            small_dot_speed_ratio: 0.02,
            small_dot_size_ratio: 0.0625,
            small_dot_spawn_interval: 120.0,

            bonus_size_ratio: 0.125,
            bonus_value: 5,
            bonus_animation_ticks: 10,
            bonus_mean_wait_ticks: 300,
            bonus_lifetime_ticks: 150,
            bonus_pulse_speed: 12.0,

            player_speed_ratio: 0.3,
            player_size_ratio: 0.125,

            calibrate_sensor: true,
            calibration_window_ms: 100,

            max_difficulty_ticks: 7200,
            dot_limit: DOT_LIMIT,
            kiosk_dot_cap: KIOSK_DOT_CAP,

            offscreen: OffscreenPolicy::default(),
            color_order: ColorOrder::default(),
            palette: PALETTE.to_vec(),
        }
    }
}

impl Rules {
    pub fn small_dot_size(&self, screen: &Screen) -> f32 {
        self.small_dot_size_ratio * screen.density
    }

    pub fn small_dot_speed(&self, screen: &Screen) -> f32 {
        self.small_dot_speed_ratio * screen.density
    }

    pub fn bonus_size(&self, screen: &Screen) -> f32 {
        self.bonus_size_ratio * screen.density
    }

    pub fn player_size(&self, screen: &Screen) -> f32 {
        self.player_size_ratio * screen.density
    }

    pub fn player_speed(&self, screen: &Screen) -> f32 {
        self.player_speed_ratio * screen.density
    }
}

/// Fixed-step loop and render handoff timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopSettings {
    pub tick_hz: u32,
    pub max_catch_up_ticks: u32,
    /// `None` waits for the render consumer forever
    pub handoff_timeout_ms: Option<u64>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            tick_hz: TICK_HZ,
            max_catch_up_ticks: MAX_CATCH_UP_TICKS,
            handoff_timeout_ms: Some(HANDOFF_TIMEOUT_MS),
        }
    }
}

impl LoopSettings {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_hz.max(1)))
    }

    pub fn handoff_timeout(&self) -> Option<Duration> {
        self.handoff_timeout_ms.map(Duration::from_millis)
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub screen: Screen,
    pub rules: Rules,
    pub game_loop: LoopSettings,
}

impl Settings {
    /// Parse settings from JSON text and validate them
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Load settings from a JSON file, falling back to defaults
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::warn!("Using default settings ({})", e);
                Self::default()
            }
        }
    }

    /// Reject values the simulation cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.screen;
        if !(s.width.is_finite() && s.width > 0.0 && s.height.is_finite() && s.height > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "screen must be positive, got {}x{}",
                s.width, s.height
            )));
        }
        if !(s.density.is_finite() && s.density > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "density must be positive, got {}",
                s.density
            )));
        }
        if self.rules.palette.len() < 2 {
            return Err(ConfigError::Invalid(
                "palette needs at least two colours".into(),
            ));
        }
        if self.rules.dot_limit == 0 {
            return Err(ConfigError::Invalid("dot_limit must be at least 1".into()));
        }
        if !(self.rules.small_dot_spawn_interval.is_finite()
            && self.rules.small_dot_spawn_interval >= 0.0)
        {
            return Err(ConfigError::Invalid(
                "small_dot_spawn_interval must be non-negative".into(),
            ));
        }
        if self.game_loop.tick_hz == 0 {
            return Err(ConfigError::Invalid("tick_hz must be at least 1".into()));
        }
        if self.game_loop.max_catch_up_ticks == 0 {
            return Err(ConfigError::Invalid(
                "max_catch_up_ticks must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings =
            Settings::from_json(r#"{ "screen": { "width": 800.0 }, "rules": { "offscreen": "Despawn" } }"#)
                .unwrap();
        assert_eq!(settings.screen.width, 800.0);
        assert_eq!(settings.screen.height, Screen::default().height);
        assert_eq!(settings.rules.offscreen, OffscreenPolicy::Despawn);
        assert_eq!(settings.rules.bonus_value, 5);
        assert_eq!(settings.game_loop.handoff_timeout_ms, Some(500));
    }

    #[test]
    fn test_rejects_single_colour_palette() {
        let mut settings = Settings::default();
        settings.rules.palette.truncate(1);
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_bad_screen() {
        let result = Settings::from_json(r#"{ "screen": { "width": -1.0 } }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let settings = Settings::load(Path::new("/definitely/not/here.json"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_overflow_per_edge() {
        let screen = Screen::new(100.0, 50.0, 1.0);
        assert!(!screen.overflow(Vec2::new(50.0, 25.0), 10.0).any());

        let o = screen.overflow(Vec2::new(3.0, 48.0), 10.0);
        assert!(o.left && o.bottom);
        assert!(!o.right && !o.top);
        assert!(o.horizontal() && o.vertical());
    }

    #[test]
    fn test_tick_period() {
        let timing = LoopSettings {
            tick_hz: 50,
            ..Default::default()
        };
        assert_eq!(timing.tick_period(), Duration::from_millis(20));
        assert_eq!(timing.handoff_timeout(), Some(Duration::from_millis(500)));
    }
}
