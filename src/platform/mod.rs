//! Platform abstraction layer
//!
//! Turns raw orientation sensor samples into the normalized tilt the
//! simulation steers the player with:
//! - `SensorHost`: what the device offers and (un)registration
//! - `OrientationSource`: rotation vector or integrated gyroscope
//! - `Calibrator`: averages the first samples into a bias that is subtracted
//!   from everything after

use std::f32::consts::FRAC_PI_2;

use glam::{Mat3, Quat, Vec2, Vec3};

use crate::error::SensorError;
use crate::is_finite_vec;
use crate::settings::Rules;

/// Hardware sensors an orientation source can read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    RotationVector,
    Gyroscope,
}

/// A raw sample delivered by the host
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorEvent {
    /// Unit quaternion as `[x, y, z, w]`
    RotationVector { quat: [f32; 4], timestamp_ns: u64 },
    /// Angular velocity around the device axes (rad/s)
    Gyroscope { omega: Vec3, timestamp_ns: u64 },
}

impl SensorEvent {
    pub fn timestamp_ns(&self) -> u64 {
        match *self {
            SensorEvent::RotationVector { timestamp_ns, .. } => timestamp_ns,
            SensorEvent::Gyroscope { timestamp_ns, .. } => timestamp_ns,
        }
    }
}

/// Device side of the sensor plumbing
pub trait SensorHost: Send {
    fn has_sensor(&self, kind: SensorKind) -> bool;
    fn register(&mut self, kind: SensorKind);
    fn unregister(&mut self, kind: SensorKind);
}

/// Converts raw samples of one sensor kind into a tilt in [-1, 1] per axis
pub trait OrientationSource: Send {
    fn kind(&self) -> SensorKind;

    /// Feed one sample. `None` when the sample is unusable or of another kind.
    fn process(&mut self, event: &SensorEvent) -> Option<Vec2>;

    /// Forget accumulated state before the source is registered again
    fn reset(&mut self);
}

/// Tilt from a device orientation: roll on x, pitch on y.
///
/// A quarter turn on either axis is full deflection.
pub fn tilt_from_orientation(orientation: Quat) -> Vec2 {
    let m = Mat3::from_quat(orientation);
    let pitch = (-m.y_axis.z).clamp(-1.0, 1.0).asin();
    let roll = (-m.x_axis.z).atan2(m.z_axis.z);
    (Vec2::new(roll, -pitch) / FRAC_PI_2).clamp(Vec2::NEG_ONE, Vec2::ONE)
}

/// Reads the fused rotation-vector sensor directly
#[derive(Debug, Default)]
pub struct RotationVectorSource;

impl OrientationSource for RotationVectorSource {
    fn kind(&self) -> SensorKind {
        SensorKind::RotationVector
    }

    fn process(&mut self, event: &SensorEvent) -> Option<Vec2> {
        let SensorEvent::RotationVector { quat, .. } = *event else {
            return None;
        };
        let q = Quat::from_array(quat);
        if !q.is_finite() || q.length_squared() < f32::EPSILON {
            return None;
        }
        Some(tilt_from_orientation(q.normalize()))
    }

    fn reset(&mut self) {}
}

/// Integrates angular velocity over sample timestamps
#[derive(Debug)]
pub struct GyroSource {
    orientation: Quat,
    last_ns: Option<u64>,
}

impl Default for GyroSource {
    fn default() -> Self {
        Self {
            orientation: Quat::IDENTITY,
            last_ns: None,
        }
    }
}

impl OrientationSource for GyroSource {
    fn kind(&self) -> SensorKind {
        SensorKind::Gyroscope
    }

    fn process(&mut self, event: &SensorEvent) -> Option<Vec2> {
        let SensorEvent::Gyroscope {
            omega,
            timestamp_ns,
        } = *event
        else {
            return None;
        };
        if !omega.is_finite() {
            return None;
        }

        let Some(last) = self.last_ns.replace(timestamp_ns) else {
            return Some(tilt_from_orientation(self.orientation));
        };
        // Out-of-order sample: keep the orientation, resync the clock
        let Some(elapsed) = timestamp_ns.checked_sub(last) else {
            return Some(tilt_from_orientation(self.orientation));
        };

        let dt = elapsed as f32 * 1e-9;
        let rate = omega.length();
        if rate > f32::EPSILON {
            let delta = Quat::from_axis_angle(omega / rate, rate * dt);
            self.orientation = (self.orientation * delta).normalize();
        }
        Some(tilt_from_orientation(self.orientation))
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Pick the best available source: rotation vector, then gyroscope
pub fn select_source(host: &dyn SensorHost) -> Result<Box<dyn OrientationSource>, SensorError> {
    if host.has_sensor(SensorKind::RotationVector) {
        Ok(Box::new(RotationVectorSource))
    } else if host.has_sensor(SensorKind::Gyroscope) {
        log::warn!("No rotation vector sensor, integrating gyroscope");
        Ok(Box::new(GyroSource::default()))
    } else {
        Err(SensorError::NoSensorAvailable)
    }
}

/// Calibration sub-state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationPhase {
    /// Averaging samples until the window has elapsed
    Calibrating {
        started_ns: Option<u64>,
        sum: Vec2,
        count: u32,
    },
    /// Bias known; samples pass through with it removed
    Calibrated { bias: Vec2 },
    /// Samples pass through untouched
    Disabled,
}

/// Measures the resting tilt right after registration
#[derive(Debug, Clone)]
pub struct Calibrator {
    window_ns: u64,
    enabled: bool,
    phase: CalibrationPhase,
}

impl Calibrator {
    pub fn new(enabled: bool, window_ms: u64) -> Self {
        let mut calibrator = Self {
            window_ns: window_ms.saturating_mul(1_000_000),
            enabled,
            phase: CalibrationPhase::Disabled,
        };
        calibrator.restart();
        calibrator
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn is_calibrating(&self) -> bool {
        matches!(self.phase, CalibrationPhase::Calibrating { .. })
    }

    /// Throw away the bias and start measuring again
    pub fn restart(&mut self) {
        self.phase = if self.enabled {
            CalibrationPhase::Calibrating {
                started_ns: None,
                sum: Vec2::ZERO,
                count: 0,
            }
        } else {
            CalibrationPhase::Disabled
        };
    }

    /// Feed a raw tilt. `None` while the bias is still being measured.
    pub fn apply(&mut self, tilt: Vec2, timestamp_ns: u64) -> Option<Vec2> {
        match &mut self.phase {
            CalibrationPhase::Disabled => Some(tilt),
            CalibrationPhase::Calibrated { bias } => {
                Some((tilt - *bias).clamp(Vec2::NEG_ONE, Vec2::ONE))
            }
            CalibrationPhase::Calibrating {
                started_ns,
                sum,
                count,
            } => {
                let start = *started_ns.get_or_insert(timestamp_ns);
                if timestamp_ns.saturating_sub(start) < self.window_ns {
                    *sum += tilt;
                    *count += 1;
                    return None;
                }
                let bias = if *count > 0 {
                    *sum / *count as f32
                } else {
                    Vec2::ZERO
                };
                log::debug!("Sensor calibrated over {} samples, bias {:?}", count, bias);
                self.phase = CalibrationPhase::Calibrated { bias };
                Some((tilt - bias).clamp(Vec2::NEG_ONE, Vec2::ONE))
            }
        }
    }
}

/// A selected source bound to its host, with calibration
pub struct OrientationInput {
    host: Box<dyn SensorHost>,
    source: Box<dyn OrientationSource>,
    calibrator: Calibrator,
    registered: bool,
}

impl OrientationInput {
    /// Select a source on `host`. Fails if the device has no usable sensor.
    pub fn new(host: Box<dyn SensorHost>, rules: &Rules) -> Result<Self, SensorError> {
        let source = select_source(host.as_ref())?;
        Ok(Self {
            host,
            source,
            calibrator: Calibrator::new(rules.calibrate_sensor, rules.calibration_window_ms),
            registered: false,
        })
    }

    pub fn kind(&self) -> SensorKind {
        self.source.kind()
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn calibrator(&self) -> &Calibrator {
        &self.calibrator
    }

    /// Start listening; calibration starts over
    pub fn register(&mut self) {
        if self.registered {
            return;
        }
        let kind = self.source.kind();
        self.host.register(kind);
        self.source.reset();
        self.calibrator.restart();
        self.registered = true;
        log::info!("Registered {:?} sensor", kind);
    }

    pub fn unregister(&mut self) {
        if !self.registered {
            return;
        }
        let kind = self.source.kind();
        self.host.unregister(kind);
        self.registered = false;
        log::info!("Unregistered {:?} sensor", kind);
    }

    /// Process one sample into a calibrated tilt
    pub fn on_event(&mut self, event: &SensorEvent) -> Option<Vec2> {
        if !self.registered {
            return None;
        }
        let tilt = self.source.process(event)?;
        if !is_finite_vec(tilt) {
            return None;
        }
        self.calibrator.apply(tilt, event.timestamp_ns())
    }
}

impl std::fmt::Debug for OrientationInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrientationInput")
            .field("kind", &self.source.kind())
            .field("calibrator", &self.calibrator)
            .field("registered", &self.registered)
            .finish()
    }
}
