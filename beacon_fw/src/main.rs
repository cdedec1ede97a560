// src/main.rs
mod commands;
mod config;
mod controller;
mod crypto;
mod drivers;
mod errors;
mod health;
mod irq;
mod logging;
mod net;
mod sensors;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::time::{self, Duration};
use tracing::{info, warn};

use config::{Cli, FileStore, SettingsStore};
use controller::{Controller, Restart};
use drivers::{Devices, LogStore, Watchdog};
use logging::store::MemoryLogStore;

const IRQ_QUEUE_DEPTH: usize = 32;
const COMMAND_QUEUE_DEPTH: usize = 16;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // -------- logging ----------
    let _log_guard = logging::init(cli.log_dir.as_deref())?;

    // -------- plumbing that survives restarts ----------
    let store = FileStore::new(&cli.config);
    let irq = Arc::new(irq::InterruptFlags::new(IRQ_QUEUE_DEPTH));
    let (tx, mut commands) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    commands::console::spawn(tx);

    let boot_settings = store.load()?;
    let mut dog = health::watchdog::spawn(
        Duration::from_secs(boot_settings.watchdog_timeout_sec),
        boot_settings.watchdog_enforce && !boot_settings.test_mode,
    );
    let mut point_log: Option<Box<dyn LogStore>> = None;

    loop {
        // -------- config ----------
        let mut settings = store.load()?;
        cli.apply_overrides(&mut settings);
        info!(
            serial = %settings.serial_number,
            server = %settings.server_host,
            port = settings.server_port,
            network = ?settings.network,
            mode = ?settings.mode,
            "beacon starting"
        );

        // -------- devices ----------
        if point_log.is_none() && settings.logging_enabled {
            point_log = Some(Box::new(MemoryLogStore::new(settings.max_log_points)));
        }
        if settings.test_mode {
            dog.suspend();
        }
        let sims = sensors::spawn_all(&settings, cli.seed, irq.clone());
        let devices = Devices {
            gnss: Box::new(sims.gnss),
            link: net::build_link(&settings),
            power: Box::new(sims.power),
            motion: Some(Box::new(sims.motion)),
            io: Some(Box::new(sims.io)),
            log_store: point_log.take(),
            watchdog: (!settings.test_mode).then(|| Box::new(dog.clone()) as Box<dyn Watchdog>),
        };
        let mut ctl = Controller::new(settings, Box::new(store.clone()), devices, irq.clone(), commands)?;

        // -------- run until restart or Ctrl+C ----------
        let restart = tokio::select! {
            restart = ctl.run() => Some(restart),
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(?e, "failed to install Ctrl+C handler");
                }
                None
            }
        };
        sims.toggler.abort();
        info!(
            state = ?ctl.state(),
            mode = ?ctl.settings().mode,
            degraded = ctl.is_degraded(),
            retries = ctl.retry_count(),
            unsent_alerts = ?ctl.pending_alerts(),
            error = ?ctl.error_cause(),
            "controller stopped"
        );
        let (rx, devices) = ctl.into_parts();
        commands = rx;
        point_log = devices.log_store;

        match restart {
            None => {
                info!("shutdown signal received; exiting.");
                return Ok(());
            }
            Some(Restart::Reboot) => info!("rebooting"),
            Some(Restart::DeepSleep(duration)) => {
                info!(secs = duration.as_secs(), "powered down for deep sleep");
                dog.suspend();
                time::sleep(duration).await;
            }
        }
    }
}
