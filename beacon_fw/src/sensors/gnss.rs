// src/sensors/gnss.rs
use std::sync::Arc;

use chrono::Utc;
use cinet_protocol::PositionFix;
use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use tokio::time::Instant;
use tracing::{debug, info};

use super::SimWorld;
use crate::drivers::GnssSource;

pub const HOME: (f64, f64) = (53.8272, -1.6647);

const COLD_START_POLLS: u32 = 3;
// Mean drive or park phase of a few minutes.
const PHASE_SWITCHES_PER_S: f64 = 0.005;
const METRES_PER_DEG: f64 = 111_320.0;
const MAX_STEP_S: f64 = 60.0;

/// Random walk around a home position, alternating between driving and
/// parked phases.
pub struct SimGnss {
    rng: StdRng,
    world: Arc<SimWorld>,
    lat: f64,
    lon: f64,
    heading: f64,
    speed: f64,
    moving: bool,
    polls: u32,
    last_poll: Option<Instant>,
}

impl SimGnss {
    pub fn new(rng: StdRng, world: Arc<SimWorld>, home: (f64, f64)) -> Self {
        Self {
            rng,
            world,
            lat: home.0,
            lon: home.1,
            heading: 0.0,
            speed: 0.0,
            moving: false,
            polls: 0,
            last_poll: None,
        }
    }

    fn advance(&mut self, dt_s: f64) {
        if self.rng.random_bool((dt_s * PHASE_SWITCHES_PER_S).min(1.0)) {
            self.moving = !self.moving;
            info!(moving = self.moving, "gnss sim: phase change");
        }
        let target = if self.moving { self.rng.random_range(20.0..60.0) } else { 0.0 };
        self.speed = self.speed * 0.7 + target * 0.3;
        if self.speed < 0.5 {
            self.speed = 0.0;
        }

        let turn: f64 = self.rng.sample(StandardNormal);
        self.heading = (self.heading + turn * 8.0).rem_euclid(360.0);

        let dist_m = self.speed / 3.6 * dt_s;
        let h = self.heading.to_radians();
        self.lat += dist_m * h.cos() / METRES_PER_DEG;
        self.lon += dist_m * h.sin() / (METRES_PER_DEG * self.lat.to_radians().cos().max(1e-6));
        *self.world.speed_kmh.lock() = self.speed;
    }
}

impl GnssSource for SimGnss {
    fn get_fix(&mut self) -> PositionFix {
        self.polls = self.polls.saturating_add(1);
        let now = Instant::now();
        let dt = self
            .last_poll
            .map(|t| now.duration_since(t).as_secs_f64().min(MAX_STEP_S))
            .unwrap_or(0.0);
        self.last_poll = Some(now);

        if self.polls <= COLD_START_POLLS {
            debug!(poll = self.polls, "gnss sim: acquiring");
            return PositionFix::default();
        }
        self.advance(dt);

        let alt_noise: f64 = self.rng.sample(StandardNormal);
        PositionFix {
            latitude: self.lat,
            longitude: self.lon,
            altitude_m: 120.0 + alt_noise * 3.0,
            speed_kmh: self.speed,
            heading_deg: (self.speed > 0.0).then_some(self.heading),
            hdop: self.rng.random_range(0.7..1.6),
            satellites: self.rng.random_range(6..=12),
            valid: true,
            timestamp: Some(Utc::now().naive_utc()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn sim(seed: u64) -> SimGnss {
        SimGnss::new(StdRng::seed_from_u64(seed), Arc::new(SimWorld::default()), HOME)
    }

    #[test]
    fn cold_start_then_valid() {
        let mut g = sim(1);
        for _ in 0..COLD_START_POLLS {
            assert!(!g.get_fix().valid);
        }
        let fix = g.get_fix();
        assert!(fix.valid);
        assert!(fix.timestamp.is_some());
        assert!((6..=12).contains(&fix.satellites));
    }

    #[test]
    fn walk_stays_near_home() {
        let mut g = sim(7);
        for _ in 0..500 {
            g.advance(1.0);
        }
        assert!((g.lat - HOME.0).abs() < 0.5);
        assert!((g.lon - HOME.1).abs() < 0.5);
        assert!((0.0..360.0).contains(&g.heading));
    }

    #[test]
    fn speed_is_published_to_world() {
        let mut g = sim(3);
        for _ in 0..5 {
            g.moving = true;
            g.advance(1.0);
        }
        assert!(*g.world.speed_kmh.lock() > 0.0);
    }
}
