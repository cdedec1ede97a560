// src/sensors/io.rs
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;
use rand::rngs::StdRng;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::{debug, info};

use crate::drivers::IoPort;
use crate::irq::{InterruptFlags, IoEvent, IoKind};

const TOGGLE_CHECK: Duration = Duration::from_secs(30);
const TOGGLE_P: f64 = 0.05;

pub struct SimIo {
    input: Arc<AtomicBool>,
    output: bool,
}

impl SimIo {
    pub fn new(output: bool) -> Self {
        Self {
            input: Arc::new(AtomicBool::new(false)),
            output,
        }
    }

    pub fn input_handle(&self) -> Arc<AtomicBool> {
        self.input.clone()
    }
}

impl IoPort for SimIo {
    fn input_state(&self) -> bool {
        self.input.load(Ordering::Acquire)
    }

    fn output_state(&self) -> bool {
        self.output
    }

    fn set_output(&mut self, on: bool) {
        if self.output != on {
            info!(on, "io sim: output driven");
        }
        self.output = on;
    }
}

/// Flips the simulated input now and then, raising the same event the GPIO
/// edge interrupt would.
pub fn spawn_input_toggler(input: Arc<AtomicBool>, irq: Arc<InterruptFlags>, mut rng: StdRng) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(TOGGLE_CHECK);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !rng.random_bool(TOGGLE_P) {
                continue;
            }
            let value = !input.fetch_xor(true, Ordering::AcqRel);
            debug!(value, "io sim: input edge");
            irq.push(IoEvent { kind: IoKind::Input, value });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn output_follows_commands() {
        let mut io = SimIo::new(false);
        io.set_output(true);
        assert!(io.output_state());
        assert!(!io.input_state());
    }

    #[tokio::test(start_paused = true)]
    async fn toggler_raises_input_events() {
        let io = SimIo::new(false);
        let irq = Arc::new(InterruptFlags::new(64));
        spawn_input_toggler(io.input_handle(), irq.clone(), StdRng::seed_from_u64(11));
        let mut events = Vec::new();
        for _ in 0..400 {
            time::sleep(TOGGLE_CHECK).await;
            events.extend(irq.drain());
        }
        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.kind == IoKind::Input));
        assert!(events.windows(2).all(|w| w[0].value != w[1].value));
    }
}
