//! Headless demo: runs the engine with a scripted tilt sensor and a render
//! consumer thread that only counts frames.
//!
//! Usage: `united-colors [settings.json] [--kiosk]`

#[cfg(not(target_arch = "wasm32"))]
mod demo {
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::thread;
    use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

    use crossbeam_channel::{Receiver, Sender, select, unbounded};
    use glam::Quat;

    use united_colors::platform::{SensorEvent, SensorHost, SensorKind};
    use united_colors::render::FrameHandoff;
    use united_colors::sim::{GameEvent, SessionState, SoundCue};
    use united_colors::{Engine, Settings};

    const RUN_FOR: Duration = Duration::from_secs(12);
    const PAUSE_AT: Duration = Duration::from_secs(4);
    const PAUSE_FOR: Duration = Duration::from_secs(1);
    const SAMPLE_PERIOD: Duration = Duration::from_millis(10);

    /// Pretends to be a device with a rotation-vector sensor
    struct ScriptedHost {
        active: Arc<AtomicBool>,
    }

    impl SensorHost for ScriptedHost {
        fn has_sensor(&self, kind: SensorKind) -> bool {
            kind == SensorKind::RotationVector
        }

        fn register(&mut self, _kind: SensorKind) {
            self.active.store(true, Ordering::Release);
        }

        fn unregister(&mut self, _kind: SensorKind) {
            self.active.store(false, Ordering::Release);
        }
    }

    /// Slowly circling tilt, only while the host is registered
    fn feed_sensor(active: Arc<AtomicBool>, stop: Arc<AtomicBool>, tx: Sender<SensorEvent>) {
        let start = Instant::now();
        while !stop.load(Ordering::Acquire) {
            if active.load(Ordering::Acquire) {
                let t = start.elapsed().as_secs_f32();
                let orientation =
                    Quat::from_rotation_y(0.4 * (t * 0.7).sin()) * Quat::from_rotation_x(0.3 * (t * 0.5).cos());
                let event = SensorEvent::RotationVector {
                    quat: orientation.to_array(),
                    timestamp_ns: start.elapsed().as_nanos() as u64,
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
            thread::sleep(SAMPLE_PERIOD);
        }
    }

    /// Stand-in renderer: lease every frame and release it right away
    fn consume_frames(handoff: Arc<FrameHandoff>, frames: Arc<AtomicU64>) {
        loop {
            match handoff.acquire(Some(Duration::from_millis(100))) {
                Some(lease) => {
                    let count = frames.fetch_add(1, Ordering::Relaxed) + 1;
                    if count % 30 == 0 {
                        log::debug!(
                            "Frame {}: tick {}, {} dots, {} bytes of positions",
                            count,
                            lease.tick,
                            lease.buffers.len(),
                            lease.buffers.positions_bytes().len()
                        );
                    }
                }
                None if handoff.is_closed() => break,
                None => {}
            }
        }
    }

    enum Wake {
        Sensor(SensorEvent),
        Game(GameEvent),
        Idle,
        Closed,
    }

    fn log_event(event: GameEvent) {
        match event {
            GameEvent::ScoreChanged(score) => log::info!("Score: {}", score),
            GameEvent::StateChanged(state) => log::info!("State: {:?}", state),
            GameEvent::Sound(SoundCue::DotConsumed) => log::debug!("*pop*"),
            GameEvent::Sound(SoundCue::BonusSpawned) => log::debug!("*ding*"),
            GameEvent::ConsumerStalled => log::warn!("Renderer stalled"),
            GameEvent::StepCompleted => {}
        }
    }

    pub fn run() {
        env_logger::init();

        let args: Vec<String> = std::env::args().skip(1).collect();
        let kiosk = args.iter().any(|a| a == "--kiosk");
        let settings = args
            .iter()
            .find(|a| !a.starts_with("--"))
            .map(|path| Settings::load(Path::new(path)))
            .unwrap_or_default();
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        log::info!("United Colors (headless) starting, seed {}", seed);

        let mut engine = match Engine::new(settings, seed) {
            Ok(engine) => engine,
            Err(e) => {
                log::error!("Could not create engine: {}", e);
                return;
            }
        };
        let events: Receiver<GameEvent> = engine.events();

        let active = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        if let Err(e) = engine.attach_sensors(Box::new(ScriptedHost {
            active: Arc::clone(&active),
        })) {
            log::warn!("Playing without tilt: {}", e);
        }
        let (sensor_tx, sensor_rx) = unbounded();
        let feeder = {
            let (active, stop) = (Arc::clone(&active), Arc::clone(&stop));
            thread::spawn(move || feed_sensor(active, stop, sensor_tx))
        };

        let frames = Arc::new(AtomicU64::new(0));
        let consumer = {
            let (handoff, frames) = (engine.handoff(), Arc::clone(&frames));
            thread::spawn(move || consume_frames(handoff, frames))
        };

        if let Err(e) = engine.start_new_game(kiosk) {
            log::error!("Could not start: {}", e);
            return;
        }

        let started = Instant::now();
        let mut paused_once = false;
        while started.elapsed() < RUN_FOR {
            let wake = select! {
                recv(sensor_rx) -> msg => msg.map_or(Wake::Idle, Wake::Sensor),
                recv(events) -> msg => msg.map_or(Wake::Closed, Wake::Game),
                default(Duration::from_millis(50)) => Wake::Idle,
            };
            match wake {
                Wake::Sensor(event) => engine.handle_sensor_event(&event),
                Wake::Game(event) => {
                    log_event(event);
                    if event == GameEvent::StateChanged(SessionState::GameOver) {
                        log::info!("Game over with {} points, switching to kiosk", engine.score());
                        if let Err(e) = engine.start_new_game(true) {
                            log::error!("Could not restart: {}", e);
                            break;
                        }
                    }
                }
                Wake::Idle => {}
                Wake::Closed => break,
            }

            if !paused_once && started.elapsed() >= PAUSE_AT {
                paused_once = true;
                engine.pause();
                let snapshot = engine.snapshot();
                match snapshot.to_json() {
                    Ok(json) => log::info!("Suspended: {} dots, {} byte snapshot", engine.live_count(), json.len()),
                    Err(e) => log::warn!("Snapshot failed: {}", e),
                }
                thread::sleep(PAUSE_FOR);
                engine.resume();
            }
        }

        log::info!(
            "Stopping: {} frames rendered, score {}, state {:?}",
            frames.load(Ordering::Relaxed),
            engine.score(),
            engine.session_state()
        );
        if let Err(e) = engine.destroy() {
            log::error!("Teardown failed: {}", e);
        }
        stop.store(true, Ordering::Release);
        let _ = feeder.join();
        let _ = consumer.join();
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    demo::run();
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // Embedding hosts drive `Engine` directly, this is just to satisfy the compiler
}
