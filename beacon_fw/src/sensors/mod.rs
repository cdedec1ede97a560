// src/sensors/mod.rs
//! Host-side stand-ins for the beacon's hardware.
pub mod gnss;
pub mod io;
pub mod motion;
pub mod power;

use std::sync::Arc;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::irq::InterruptFlags;

/// State the simulators share: the motion sensor follows simulated ground
/// speed.
#[derive(Debug, Default)]
pub struct SimWorld {
    pub speed_kmh: Mutex<f64>,
}

pub struct Simulators {
    pub gnss: gnss::SimGnss,
    pub power: power::SimPower,
    pub motion: motion::SimMotion,
    pub io: io::SimIo,
    /// Background input toggler; abort it before building a new set.
    pub toggler: JoinHandle<()>,
}

pub fn spawn_all(settings: &Settings, seed: Option<u64>, irq: Arc<InterruptFlags>) -> Simulators {
    let mut seeder = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_os_rng(),
    };
    let world = Arc::new(SimWorld::default());
    let home = if settings.geofence_enabled {
        (settings.geofence_lat, settings.geofence_lon)
    } else {
        gnss::HOME
    };
    let gnss = gnss::SimGnss::new(StdRng::from_rng(&mut seeder), world.clone(), home);
    let power = power::SimPower::new(StdRng::from_rng(&mut seeder)).with_irq(irq.clone());
    let motion = motion::SimMotion::new(world, settings.motion_speed_threshold_kmh);
    let io = io::SimIo::new(settings.output_default_state);
    let toggler = io::spawn_input_toggler(io.input_handle(), irq, StdRng::from_rng(&mut seeder));
    Simulators { gnss, power, motion, io, toggler }
}
