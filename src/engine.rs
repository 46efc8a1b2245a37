//! Simulation engine
//!
//! Runs the fixed-step loop on its own thread and exposes the lifecycle entry
//! points to the platform layer. Each loop iteration:
//! 1. waits at the pause gate
//! 2. runs catch-up ticks for the elapsed wall time (capped, then clamped)
//! 3. publishes a frame to the [`FrameHandoff`] and the queued events
//! 4. waits for the render consumer to release the frame
//!
//! After a game over the loop publishes the final frame and exits on its own.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, unbounded};
use glam::Vec2;
use parking_lot::{Condvar, Mutex};

use crate::error::{EngineError, SensorError};
use crate::persistence::Snapshot;
use crate::platform::{OrientationInput, SensorEvent, SensorHost};
use crate::render::{FrameHandoff, HandoffOutcome};
use crate::settings::{LoopSettings, Settings};
use crate::sim::{GameEvent, GameState, SessionState, TickInput, tick};

/// State shared with the simulation thread
#[derive(Debug)]
struct Shared {
    running: AtomicBool,
    /// Pause gate, checked at the top of every iteration
    paused: Mutex<bool>,
    gate: Condvar,
    handoff: Arc<FrameHandoff>,
    /// Latest calibrated tilt from the sensor thread
    tilt: Mutex<Vec2>,
}

impl Shared {
    fn wake(&self) {
        let _paused = self.paused.lock();
        self.gate.notify_all();
    }
}

/// Owns one session's simulation and its thread
pub struct Engine {
    settings: Settings,
    game: Arc<Mutex<GameState>>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    events_tx: Sender<GameEvent>,
    events_rx: Receiver<GameEvent>,
    orientation: Mutex<Option<OrientationInput>>,
}

impl Engine {
    /// Validate `settings` and build an idle engine
    pub fn new(settings: Settings, seed: u64) -> Result<Self, EngineError> {
        settings.validate()?;
        let game = GameState::new(seed, settings.screen, settings.rules.clone());
        let (events_tx, events_rx) = unbounded();
        Ok(Self {
            settings,
            game: Arc::new(Mutex::new(game)),
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                paused: Mutex::new(false),
                gate: Condvar::new(),
                handoff: Arc::new(FrameHandoff::new()),
                tilt: Mutex::new(Vec2::ZERO),
            }),
            worker: None,
            events_tx,
            events_rx,
            orientation: Mutex::new(None),
        })
    }

    /// Event feed; every clone sees each event once
    pub fn events(&self) -> Receiver<GameEvent> {
        self.events_rx.clone()
    }

    /// Handoff the render consumer leases frames from
    pub fn handoff(&self) -> Arc<FrameHandoff> {
        Arc::clone(&self.shared.handoff)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Bind the device's orientation sensor.
    ///
    /// Without a usable sensor the player never moves; the caller decides
    /// whether that is acceptable.
    pub fn attach_sensors(&mut self, host: Box<dyn SensorHost>) -> Result<(), SensorError> {
        let mut input = match OrientationInput::new(host, &self.settings.rules) {
            Ok(input) => input,
            Err(e) => {
                log::warn!("{}; player displacement stays at zero", e);
                return Err(e);
            }
        };
        log::info!("Using {:?} orientation source", input.kind());
        let session = self.game.lock().session;
        if session == SessionState::Running {
            input.register();
        }
        *self.orientation.lock() = Some(input);
        Ok(())
    }

    /// Feed one raw sensor sample
    pub fn handle_sensor_event(&self, event: &SensorEvent) {
        let tilt = match self.orientation.lock().as_mut() {
            Some(input) => input.on_event(event),
            None => None,
        };
        if let Some(tilt) = tilt {
            *self.shared.tilt.lock() = tilt;
        }
    }

    /// Reset the field and start a session on a fresh loop
    pub fn start_new_game(&mut self, kiosk: bool) -> Result<(), EngineError> {
        self.stop_loop()?;

        let mut events = Vec::new();
        self.game.lock().start(kiosk, &mut events);
        self.emit(events);
        *self.shared.tilt.lock() = Vec2::ZERO;

        self.spawn_loop()?;
        self.set_sensors(!kiosk);
        Ok(())
    }

    /// Continue a restored session without resetting it
    pub fn continue_session(&mut self) -> Result<(), EngineError> {
        self.stop_loop()?;
        let (session, kiosk) = {
            let state = self.game.lock();
            (state.session, state.kiosk)
        };
        log::info!("Continuing session in {:?}", session);
        self.spawn_loop()?;
        self.set_sensors(session == SessionState::Running && !kiosk);
        Ok(())
    }

    /// Stop ticking until `resume`
    pub fn pause(&mut self) {
        let mut events = Vec::new();
        let changed = {
            let mut paused = self.shared.paused.lock();
            let changed = self.game.lock().pause(&mut events);
            if changed {
                *paused = true;
            }
            changed
        };
        if changed {
            log::info!("Paused");
            self.set_sensors(false);
            self.emit(events);
        }
    }

    pub fn resume(&mut self) {
        let mut events = Vec::new();
        let (changed, kiosk) = {
            let mut paused = self.shared.paused.lock();
            let mut state = self.game.lock();
            let changed = state.resume(&mut events);
            if changed {
                *paused = false;
                self.shared.gate.notify_all();
            }
            (changed, state.kiosk)
        };
        if changed {
            log::info!("Resumed");
            self.set_sensors(!kiosk);
            self.emit(events);
        }
    }

    /// Stop the loop, join its thread and close the handoff
    pub fn destroy(&mut self) -> Result<(), EngineError> {
        self.set_sensors(false);
        self.stop_loop()?;
        self.shared.handoff.close();
        log::info!("Engine destroyed");
        Ok(())
    }

    /// Whether the simulation thread is still running
    pub fn is_alive(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn score(&self) -> u32 {
        self.game.lock().score
    }

    pub fn session_state(&self) -> SessionState {
        self.game.lock().session
    }

    pub fn live_count(&self) -> usize {
        self.game.lock().live_count()
    }

    /// Ticks simulated in the current session
    pub fn current_tick(&self) -> u64 {
        self.game.lock().tick
    }

    /// Capture the session for a later `restore`
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.game.lock())
    }

    /// Replace the session with a saved one. Call `continue_session` to run it.
    pub fn restore(&mut self, snapshot: &Snapshot) -> Result<(), EngineError> {
        self.stop_loop()?;
        let state = snapshot.restore(self.settings.screen, self.settings.rules.clone())?;
        let events = vec![
            GameEvent::ScoreChanged(state.score),
            GameEvent::StateChanged(state.session),
        ];
        *self.game.lock() = state;
        self.emit(events);
        Ok(())
    }

    fn emit(&self, events: Vec<GameEvent>) {
        for event in events {
            // The receiver lives in `self`, so sending cannot fail
            let _ = self.events_tx.send(event);
        }
    }

    fn set_sensors(&self, active: bool) {
        if let Some(input) = self.orientation.lock().as_mut() {
            if active {
                input.register();
            } else {
                input.unregister();
            }
        }
    }

    fn spawn_loop(&mut self) -> Result<(), EngineError> {
        let paused = self.game.lock().session == SessionState::Paused;
        *self.shared.paused.lock() = paused;
        self.shared.running.store(true, Ordering::Release);
        self.shared.handoff.reopen();

        let game = Arc::clone(&self.game);
        let shared = Arc::clone(&self.shared);
        let events = self.events_tx.clone();
        let timing = self.settings.game_loop.clone();
        let handle = thread::Builder::new()
            .name("game-loop".into())
            .spawn(move || run_loop(game, shared, events, timing))
            .map_err(EngineError::Spawn)?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Signal the loop to stop, wake every waiter and join
    fn stop_loop(&mut self) -> Result<(), EngineError> {
        self.shared.running.store(false, Ordering::Release);
        self.shared.wake();
        self.shared.handoff.interrupt();

        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        if handle.thread().id() == thread::current().id() {
            // Joining ourselves would deadlock
            self.worker = Some(handle);
            return Err(EngineError::LoopStillAlive);
        }
        if handle.join().is_err() {
            log::error!("Simulation thread panicked");
            return Err(EngineError::LoopPanicked);
        }
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.stop_loop() {
            log::error!("Engine teardown failed: {}", e);
        }
        self.shared.handoff.close();
    }
}

/// Simulation thread body
fn run_loop(
    game: Arc<Mutex<GameState>>,
    shared: Arc<Shared>,
    events: Sender<GameEvent>,
    timing: LoopSettings,
) {
    let period = timing.tick_period();
    let timeout = timing.handoff_timeout();
    let mut last_update = Instant::now();
    let mut pending = Vec::new();
    log::debug!("Simulation loop started ({} Hz)", timing.tick_hz);

    while shared.running.load(Ordering::Acquire) {
        {
            let mut paused = shared.paused.lock();
            if *paused {
                while *paused && shared.running.load(Ordering::Acquire) {
                    shared.gate.wait(&mut paused);
                }
                // Paused time is absorbed by the catch-up cap below
            }
        }
        if !shared.running.load(Ordering::Acquire) {
            break;
        }

        let input = TickInput {
            tilt: *shared.tilt.lock(),
        };
        let mut frame = shared.handoff.take_spare().unwrap_or_default();
        let game_over = {
            let mut state = game.lock();
            let now = Instant::now();
            let mut updates = 0;
            while now.duration_since(last_update) >= period && updates < timing.max_catch_up_ticks {
                tick(&mut state, &input, &mut pending);
                last_update += period;
                updates += 1;
            }
            if now.duration_since(last_update) >= period {
                last_update = now;
            }
            frame.fill(&state);
            state.session == SessionState::GameOver
        };

        let seq = shared.handoff.publish(frame);
        for event in pending.drain(..) {
            let _ = events.send(event);
        }
        let _ = events.send(GameEvent::StepCompleted);

        match shared.handoff.wait_consumed(seq, timeout) {
            HandoffOutcome::Consumed => {}
            HandoffOutcome::Stalled => {
                log::warn!("Render consumer did not release frame {} in time", seq);
                let _ = events.send(GameEvent::ConsumerStalled);
            }
            HandoffOutcome::Closed => {}
        }

        if game_over {
            log::info!("Game over, simulation loop exiting");
            break;
        }

        let wait = (last_update + period).saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            let mut paused = shared.paused.lock();
            if !*paused && shared.running.load(Ordering::Acquire) {
                shared.gate.wait_for(&mut paused, wait);
            }
        }
    }
    log::debug!("Simulation loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::platform::SensorKind;
    use crate::sim::{Dot, pick_new_color};
    use glam::Quat;
    use std::time::Duration;

    fn fast_settings() -> Settings {
        let mut settings = Settings::default();
        settings.game_loop.tick_hz = 200;
        settings.game_loop.handoff_timeout_ms = Some(50);
        settings.rules.calibrate_sensor = false;
        settings
    }

    /// Lease frames until the handoff closes, recording each frame's tick
    fn spawn_consumer(handoff: Arc<FrameHandoff>) -> (Arc<Mutex<Vec<u64>>>, JoinHandle<()>) {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&ticks);
        let handle = thread::spawn(move || {
            loop {
                match handoff.acquire(Some(Duration::from_millis(20))) {
                    Some(lease) => seen.lock().push(lease.tick),
                    None if handoff.is_closed() => break,
                    None => {}
                }
            }
        });
        (ticks, handle)
    }

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    /// A running session with one ordinary dot sitting on the player
    fn collision_snapshot(same_color: bool) -> Snapshot {
        let settings = fast_settings();
        let mut state = GameState::new(5, settings.screen, settings.rules.clone());
        state.start(false, &mut Vec::new());
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
        Snapshot::capture(&state)
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let mut settings = fast_settings();
        settings.rules.palette.clear();
        assert!(matches!(
            Engine::new(settings, 1),
            Err(EngineError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn test_stop_from_simulation_thread_is_refused() {
        let mut engine = Engine::new(fast_settings(), 8).unwrap();
        let (engine_tx, engine_rx) = crossbeam_channel::bounded::<Engine>(1);
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);

        // Hand the engine to the thread its worker handle points at
        let handle = thread::spawn(move || {
            let Ok(mut engine) = engine_rx.recv() else {
                return;
            };
            let refused = matches!(engine.stop_loop(), Err(EngineError::LoopStillAlive));
            let _ = result_tx.send((refused, engine.worker.is_some()));
        });
        engine.worker = Some(handle);
        assert!(engine_tx.send(engine).is_ok());

        let (refused, kept) = result_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(refused);
        assert!(kept);
    }

    #[test]
    fn test_kiosk_runs_until_destroyed() {
        let mut engine = Engine::new(fast_settings(), 1).unwrap();
        let (ticks, consumer) = spawn_consumer(engine.handoff());

        engine.start_new_game(true).unwrap();
        assert!(engine.is_alive());
        assert!(wait_until(Duration::from_secs(2), || engine.current_tick() > 20));
        assert_eq!(engine.session_state(), SessionState::Kiosk);

        engine.destroy().unwrap();
        assert!(!engine.is_alive());
        consumer.join().unwrap();
        assert!(!ticks.lock().is_empty());
    }

    #[test]
    fn test_pause_stops_ticks_and_resume_catches_up_bounded() {
        // Unbounded handoff wait, so the consumer sees every frame
        let mut settings = fast_settings();
        settings.game_loop.handoff_timeout_ms = None;
        let mut engine = Engine::new(settings, 2).unwrap();
        let events = engine.events();
        let (ticks, consumer) = spawn_consumer(engine.handoff());

        engine.start_new_game(true).unwrap();
        assert!(wait_until(Duration::from_secs(2), || engine.current_tick() > 10));

        engine.pause();
        assert_eq!(engine.session_state(), SessionState::Paused);
        let frozen = engine.current_tick();
        thread::sleep(Duration::from_millis(150));
        assert_eq!(engine.current_tick(), frozen);

        engine.resume();
        assert_eq!(engine.session_state(), SessionState::Kiosk);
        assert!(wait_until(Duration::from_secs(2), || engine.current_tick() > frozen + 10));

        engine.destroy().unwrap();
        consumer.join().unwrap();

        let cap = u64::from(engine.settings().game_loop.max_catch_up_ticks);
        let seen = ticks.lock();
        for pair in seen.windows(2) {
            assert!(pair[1] - pair[0] <= cap, "jumped {} ticks", pair[1] - pair[0]);
        }
        let states: Vec<_> = events
            .try_iter()
            .filter_map(|e| match e {
                GameEvent::StateChanged(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![SessionState::Kiosk, SessionState::Paused, SessionState::Kiosk]
        );
    }

    #[test]
    fn test_mismatch_ends_game_and_loop() {
        let mut engine = Engine::new(fast_settings(), 3).unwrap();
        let events = engine.events();
        engine.restore(&collision_snapshot(false)).unwrap();
        engine.continue_session().unwrap();

        assert!(wait_until(Duration::from_secs(2), || !engine.is_alive()));
        assert_eq!(engine.session_state(), SessionState::GameOver);
        assert!(
            events
                .try_iter()
                .any(|e| e == GameEvent::StateChanged(SessionState::GameOver))
        );
        engine.destroy().unwrap();
        assert!(!engine.is_alive());

        // Restart from game over
        engine.start_new_game(false).unwrap();
        assert!(engine.is_alive());
        assert_eq!(engine.session_state(), SessionState::Running);
        assert_eq!(engine.score(), 0);
        engine.destroy().unwrap();
    }

    #[test]
    fn test_score_event_precedes_step_completed() {
        let mut engine = Engine::new(fast_settings(), 4).unwrap();
        let events = engine.events();
        let (_ticks, consumer) = spawn_consumer(engine.handoff());
        engine.restore(&collision_snapshot(true)).unwrap();
        engine.continue_session().unwrap();

        assert!(wait_until(Duration::from_secs(2), || engine.score() == 1));
        assert!(wait_until(Duration::from_secs(2), || engine.current_tick() > 5));
        engine.destroy().unwrap();
        consumer.join().unwrap();

        let feed: Vec<_> = events.try_iter().collect();
        let scored = feed
            .iter()
            .position(|e| *e == GameEvent::ScoreChanged(1))
            .unwrap();
        assert!(feed[scored..].contains(&GameEvent::StepCompleted));
    }

    #[test]
    fn test_missing_consumer_reports_stall() {
        let mut engine = Engine::new(fast_settings(), 5).unwrap();
        let events = engine.events();
        engine.start_new_game(true).unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            events.try_iter().any(|e| e == GameEvent::ConsumerStalled)
        }));
        engine.destroy().unwrap();
    }

    struct TiltHost;

    impl SensorHost for TiltHost {
        fn has_sensor(&self, kind: SensorKind) -> bool {
            kind == SensorKind::RotationVector
        }
        fn register(&mut self, _kind: SensorKind) {}
        fn unregister(&mut self, _kind: SensorKind) {}
    }

    struct NoSensors;

    impl SensorHost for NoSensors {
        fn has_sensor(&self, _kind: SensorKind) -> bool {
            false
        }
        fn register(&mut self, _kind: SensorKind) {}
        fn unregister(&mut self, _kind: SensorKind) {}
    }

    #[test]
    fn test_sensor_tilt_moves_player() {
        let mut engine = Engine::new(fast_settings(), 6).unwrap();
        engine.attach_sensors(Box::new(TiltHost)).unwrap();
        let (_ticks, consumer) = spawn_consumer(engine.handoff());
        engine.start_new_game(false).unwrap();

        let start = engine.snapshot().player.unwrap().pos;
        engine.handle_sensor_event(&SensorEvent::RotationVector {
            quat: Quat::from_rotation_y(std::f32::consts::FRAC_PI_4).to_array(),
            timestamp_ns: 0,
        });
        assert!(wait_until(Duration::from_secs(2), || {
            engine.snapshot().player.is_some_and(|p| p.pos.x > start.x + 1.0)
        }));
        engine.destroy().unwrap();
        consumer.join().unwrap();
    }

    #[test]
    fn test_no_sensor_is_reported_and_play_continues() {
        let mut engine = Engine::new(fast_settings(), 7).unwrap();
        assert!(matches!(
            engine.attach_sensors(Box::new(NoSensors)),
            Err(SensorError::NoSensorAvailable)
        ));
        engine.start_new_game(false).unwrap();
        assert!(engine.is_alive());
        engine.destroy().unwrap();
    }
}
