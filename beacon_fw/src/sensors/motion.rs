// src/sensors/motion.rs
use std::sync::Arc;

use super::SimWorld;
use crate::drivers::MotionSensor;

/// Accelerometer stand-in: trips whenever simulated ground speed exceeds the
/// threshold.
pub struct SimMotion {
    world: Arc<SimWorld>,
    threshold_kmh: f64,
}

impl SimMotion {
    pub fn new(world: Arc<SimWorld>, threshold_kmh: f64) -> Self {
        Self { world, threshold_kmh }
    }
}

impl MotionSensor for SimMotion {
    fn motion_detected_since_last_check(&mut self) -> bool {
        *self.world.speed_kmh.lock() > self.threshold_kmh
    }

    fn is_moving(&self) -> Option<bool> {
        Some(*self.world.speed_kmh.lock() > self.threshold_kmh)
    }
}
