// src/sensors/power.rs
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, info};

use crate::drivers::PowerControl;
use crate::irq::{InterruptFlags, IoEvent, IoKind};

const START_PCT: f64 = 95.0;
const DRAIN_PER_AWAKE_HOUR: f64 = 2.0;
const DRAIN_PER_SLEEP_HOUR: f64 = 0.2;
const CHARGE_PER_HOUR: f64 = 10.0;
const EXT_TOGGLES_PER_HOUR: f64 = 0.05;

/// Battery that drains with time awake and charges on external supply.
pub struct SimPower {
    rng: StdRng,
    battery_pct: f64,
    temperature_c: f64,
    external: bool,
    peripherals_on: bool,
    last_sample: Option<Instant>,
    seq: u64,
    irq: Option<Arc<InterruptFlags>>,
}

impl SimPower {
    pub fn new(rng: StdRng) -> Self {
        Self {
            rng,
            battery_pct: START_PCT,
            temperature_c: 21.0,
            external: false,
            peripherals_on: false,
            last_sample: None,
            seq: 0,
            irq: None,
        }
    }

    /// Supply changes also raise the edge interrupt.
    pub fn with_irq(mut self, irq: Arc<InterruptFlags>) -> Self {
        self.irq = Some(irq);
        self
    }
}

#[async_trait]
impl PowerControl for SimPower {
    fn battery_pct(&mut self) -> u8 {
        self.seq = self.seq.wrapping_add(1);
        let now = Instant::now();
        let hours = self
            .last_sample
            .replace(now)
            .map_or(0.0, |t| now.duration_since(t).as_secs_f64() / 3600.0);
        if self.external {
            self.battery_pct = (self.battery_pct + hours * CHARGE_PER_HOUR).min(100.0);
        } else {
            self.battery_pct = (self.battery_pct - hours * DRAIN_PER_AWAKE_HOUR).max(0.0);
        }
        let noise: f64 = self.rng.sample(StandardNormal);
        self.temperature_c = (self.temperature_c + noise * 0.1).clamp(-20.0, 60.0);
        if hours > 0.0 && self.rng.random_bool((hours * EXT_TOGGLES_PER_HOUR).min(1.0)) {
            self.external = !self.external;
            info!(external = self.external, "power sim: external supply changed");
            if let Some(irq) = &self.irq {
                irq.push(IoEvent { kind: IoKind::ExternalPower, value: self.external });
            }
        }
        debug!(
            event = "sensor_sample",
            kind = "power",
            seq = self.seq,
            batt_pct = format_args!("{:.2}", self.battery_pct),
            temp_c = format_args!("{:.1}", self.temperature_c),
        );
        self.battery_pct.round() as u8
    }

    fn temperature_c(&self) -> i16 {
        self.temperature_c.round() as i16
    }

    fn external_power(&self) -> bool {
        self.external
    }

    fn enable_peripherals(&mut self) {
        if !self.peripherals_on {
            self.peripherals_on = true;
            info!("power sim: peripherals enabled");
        }
    }

    async fn light_sleep(&mut self, duration: Duration) {
        debug!(secs = duration.as_secs(), "power sim: light sleep");
        time::sleep(duration).await;
        if !self.external {
            let hours = duration.as_secs_f64() / 3600.0;
            self.battery_pct = (self.battery_pct - hours * DRAIN_PER_SLEEP_HOUR).max(0.0);
        }
        // the sleep itself is not awake time
        self.last_sample = Some(Instant::now());
    }
}
