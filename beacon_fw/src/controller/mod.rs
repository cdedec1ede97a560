// src/controller/mod.rs
//! The beacon's mode/state machine. One task owns it; every tick drains
//! control actions, samples interrupts and polled sensors, then runs exactly
//! one state handler.

mod actions;
pub mod alerts;
pub mod rate;

use std::sync::Arc;

use cinet_protocol::{AlertMask, DeviceStatus, MessageCodec, OperatingMode, PositionFix, StatusFlags};
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};
use tracing::{Level, debug, error, info, warn};

use crate::commands::ControlAction;
use crate::config::{RfMode, Settings, SettingsStore};
use crate::crypto;
use crate::drivers::{Devices, LogRecord};
use crate::errors::BeaconError;
use crate::irq::{InterruptFlags, IoKind};
use alerts::{AlertInputs, AlertMonitor};
use rate::{AwakeWindow, MotionEdge, MotionTracker, RateContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Startup,
    Init,
    AcquireFix,
    ConnectNetwork,
    Ready,
    Transmit,
    Sleep,
    Standby,
    Hibernate,
    UploadLog,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCause {
    BatteryCritical,
    Unexpected(String),
}

/// Why the run loop handed control back to the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restart {
    Reboot,
    /// Power off for this long, then cold-start.
    DeepSleep(Duration),
}

// Wake trigger codes carried in the status payload.
const WAKE_NONE: u8 = 0;
const WAKE_MOTION: u8 = 1;
const WAKE_INPUT: u8 = 2;
const WAKE_TIMER: u8 = 3;
const WAKE_COMMAND: u8 = 4;

/// Light-sleep step outside the awake hours.
const SCHEDULE_NAP: Duration = Duration::from_secs(300);

#[derive(Debug, Default, Clone, Copy)]
struct Pending {
    status: bool,
    locate: bool,
    log_upload: bool,
}

/// What this tick's sampling saw, for the state handlers.
#[derive(Debug, Default, Clone, Copy)]
struct TickEvents {
    motion: bool,
    input_changed: bool,
}

pub struct Controller {
    settings: Settings,
    store: Box<dyn SettingsStore>,
    codec: MessageCodec,
    dev: Devices,
    irq: Arc<InterruptFlags>,
    commands: mpsc::Receiver<ControlAction>,
    awake: Option<AwakeWindow>,

    state: State,
    error: Option<ErrorCause>,
    degraded_since: Option<Instant>,
    retry_count: u32,
    boot: Instant,
    last_transmit: Option<Instant>,
    last_log: Option<Instant>,
    fix_started: Option<Instant>,

    fix: PositionFix,
    motion: MotionTracker,
    monitor: AlertMonitor,
    alerts: AlertMask,
    tick_events: TickEvents,
    connection_lost: bool,
    wake_trigger: u8,
    pending: Pending,
    restart: Option<Restart>,
}

impl Controller {
    pub fn new(
        settings: Settings,
        store: Box<dyn SettingsStore>,
        dev: Devices,
        irq: Arc<InterruptFlags>,
        commands: mpsc::Receiver<ControlAction>,
    ) -> Result<Self, BeaconError> {
        let codec = crypto::build_codec(&settings)?;
        let awake = AwakeWindow::from_settings(&settings);
        if settings.test_mode {
            warn!("test mode: motion sensor, battery shutdown, sleeps and watchdog disabled");
        }
        Ok(Self {
            settings,
            store,
            codec,
            dev,
            irq,
            commands,
            awake,
            state: State::Startup,
            error: None,
            degraded_since: None,
            retry_count: 0,
            boot: Instant::now(),
            last_transmit: None,
            last_log: None,
            fix_started: None,
            fix: PositionFix::default(),
            motion: MotionTracker::default(),
            monitor: AlertMonitor::default(),
            alerts: AlertMask::empty(),
            tick_events: TickEvents::default(),
            connection_lost: false,
            wake_trigger: WAKE_NONE,
            pending: Pending::default(),
            restart: None,
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn error_cause(&self) -> Option<&ErrorCause> {
        self.error.as_ref()
    }

    pub fn pending_alerts(&self) -> AlertMask {
        self.alerts
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded_since.is_some()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Hand back what outlives a restart: the command channel and the
    /// devices (the point log in particular).
    pub fn into_parts(self) -> (mpsc::Receiver<ControlAction>, Devices) {
        (self.commands, self.dev)
    }

    pub fn rf_effective(&self) -> bool {
        self.settings.rf_mode != RfMode::Off && self.degraded_since.is_none()
    }

    fn network_wanted(&self) -> bool {
        self.rf_effective() && self.settings.mode != OperatingMode::Logging
    }

    pub fn in_deployment(&self) -> bool {
        !self.settings.test_mode
            && self.boot.elapsed() < Duration::from_secs(self.settings.deployment_window_sec)
    }

    /// Recomputed on every use.
    pub fn reporting_interval(&self) -> Duration {
        rate::reporting_interval(
            RateContext {
                in_deployment: self.in_deployment(),
                moving: self.motion.is_moving(),
            },
            &self.settings,
        )
    }

    // ============================== Run loop ================================

    /// Tick until a reboot or deep sleep is requested. Failures inside a tick
    /// park the machine in `Error`; they never end the loop.
    pub async fn run(&mut self) -> Restart {
        info!(mode = ?self.settings.mode, state = ?self.state, "controller running");
        loop {
            self.step().await;
            if let Some(restart) = self.restart.take() {
                info!(?restart, "controller stopping");
                return restart;
            }
            time::sleep(Duration::from_millis(self.settings.tick_ms)).await;
        }
    }

    /// One pass of the run loop: feed the watchdog, apply queued actions and
    /// tick, mapping any failure to `Error`.
    pub async fn step(&mut self) {
        if let Some(w) = self.dev.watchdog.as_mut() {
            if self.settings.test_mode {
                w.suspend();
            } else {
                w.feed();
            }
        }
        self.drain_commands();
        if let Err(e) = self.tick().await {
            error!(%e, state = ?self.state, "unexpected failure");
            self.fail(ErrorCause::Unexpected(e.to_string()));
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(action) = self.commands.try_recv() {
            self.apply(action);
        }
    }

    pub async fn tick(&mut self) -> Result<(), BeaconError> {
        self.sample();
        if self.outside_awake_hours().await {
            return Ok(());
        }
        match self.state {
            State::Startup => self.on_startup(),
            State::Init => self.on_init().await,
            State::AcquireFix => self.on_acquire_fix(),
            State::ConnectNetwork => self.on_connect().await,
            State::Ready => self.on_ready()?,
            State::Transmit => self.on_transmit().await?,
            State::Sleep => self.on_sleep().await,
            State::Standby => self.on_standby().await,
            State::Hibernate => self.on_hibernate().await,
            State::UploadLog => self.on_upload_log().await?,
            State::Error => self.on_error().await,
        }
        Ok(())
    }

    fn enter(&mut self, next: State) {
        if next == self.state {
            return;
        }
        debug!(from = ?self.state, to = ?next, "state change");
        if next == State::AcquireFix {
            self.fix_started = Some(Instant::now());
        }
        self.state = next;
    }

    fn fail(&mut self, cause: ErrorCause) {
        self.error = Some(cause);
        self.state = State::Error;
    }

    // ============================== Sampling ================================

    fn sample(&mut self) {
        let now = Instant::now();

        let mut detected = self.irq.take_motion();
        match self.dev.motion.as_mut() {
            Some(sensor) => {
                detected |= sensor.motion_detected_since_last_check();
                detected |= sensor.is_moving().unwrap_or(false);
            }
            None => {
                detected |= self.fix.valid && self.fix.speed_kmh > self.settings.motion_speed_threshold_kmh;
            }
        }
        if self.settings.test_mode {
            detected = false;
        }
        let timeout = Duration::from_secs(self.settings.motion_timeout_sec);
        match self.motion.observe(detected, now, timeout) {
            Some(MotionEdge::Started) => {
                info!("motion started");
                if self.settings.alert_motion_start {
                    self.alerts |= AlertMask::MOTION_START;
                }
            }
            Some(MotionEdge::Stopped) => {
                info!(timeout_s = timeout.as_secs(), "no motion within timeout; stopped");
                if self.settings.alert_motion_stop {
                    self.alerts |= AlertMask::MOTION_STOP;
                }
            }
            None => {}
        }

        // a supply edge interrupt beats the polled level
        let mut input_changes = 0;
        let mut supply_edge = None;
        for ev in self.irq.drain() {
            match ev.kind {
                IoKind::Input => input_changes += 1,
                IoKind::ExternalPower => supply_edge = Some(ev.value),
            }
        }
        self.tick_events = TickEvents { motion: detected, input_changed: input_changes > 0 };

        let external_power = supply_edge.unwrap_or_else(|| self.dev.power.external_power());
        let battery_pct = self.dev.power.battery_pct();
        let tamper = self.irq.take_tamper();
        let raised = self.monitor.evaluate(
            &AlertInputs { battery_pct, external_power, fix: &self.fix, tamper, input_changes },
            &self.settings,
        );
        if !raised.is_empty() {
            info!(alerts = ?raised, "alerts raised");
            self.alerts |= raised;
        }
    }

    /// Outside the awake hours each tick becomes a short nap; motion lets the
    /// tick run as normal.
    async fn outside_awake_hours(&mut self) -> bool {
        let Some(window) = self.awake else {
            return false;
        };
        if matches!(self.state, State::Startup | State::Init | State::Error) {
            return false;
        }
        if window.allows(&self.dev.gnss.get_fix()) {
            return false;
        }
        if self.tick_events.motion && self.settings.schedule_wake_on_motion {
            debug!("motion outside awake hours");
            return false;
        }
        info!(secs = SCHEDULE_NAP.as_secs(), "outside awake hours; sleeping");
        self.nap(SCHEDULE_NAP).await;
        true
    }

    fn device_status(&mut self) -> DeviceStatus {
        let battery_pct = self.dev.power.battery_pct();
        let external = self.dev.power.external_power();
        let signal = self.dev.link.signal_info();
        let connected = self.dev.link.is_connected();
        let input_on = self.dev.io.as_ref().is_some_and(|io| io.input_state());
        let output_on = self.dev.io.as_ref().is_some_and(|io| io.output_state());
        let moving = self.motion.is_moving();
        let mode = self.settings.mode;

        let mut flags = StatusFlags::empty();
        flags.set(StatusFlags::GPS_FIX, self.fix.valid);
        flags.set(StatusFlags::NETWORK_CONNECTED, connected);
        flags.set(StatusFlags::MOTION_DETECTED, moving);
        flags.set(StatusFlags::EXTERNAL_POWER, external);
        flags.set(StatusFlags::INPUT_ACTIVE, input_on);
        flags.set(StatusFlags::OUTPUT_ACTIVE, output_on);
        flags.set(StatusFlags::TAMPER_DETECTED, self.alerts.contains(AlertMask::TAMPER));
        flags.set(StatusFlags::LOW_BATTERY, battery_pct <= self.settings.low_battery_threshold);
        flags.set(StatusFlags::LOGGING_ACTIVE, self.logging_active());
        flags.set(StatusFlags::STANDBY_MODE, mode.is_standby());
        flags.set(StatusFlags::HIBERNATE_MODE, mode == OperatingMode::Hibernate);

        DeviceStatus {
            battery_pct,
            temperature_c: self.dev.power.temperature_c(),
            signal_dbm: signal.rssi_dbm,
            moving,
            status_flags: flags,
            lac: signal.lac.unwrap_or(0),
            cell_id: signal.cell_id.unwrap_or(0),
            access_technology: signal.access_technology,
            firmware: self.settings.firmware(),
            mode,
            motion_sensitivity: self.settings.motion_sensitivity,
            wake_trigger: self.wake_trigger,
            output_on,
            geozone: u8::from(self.monitor.inside_geofence().unwrap_or(false)),
            input_on,
        }
    }

    fn logging_active(&self) -> bool {
        self.settings.logging_enabled && self.dev.log_store.is_some()
    }

    fn record_log(&mut self, alerts: AlertMask) -> Result<(), BeaconError> {
        if !self.logging_active() {
            return Ok(());
        }
        let record = LogRecord {
            fix: self.fix.clone(),
            status: self.device_status(),
            alerts,
            captured_at: Instant::now(),
        };
        if let Some(store) = self.dev.log_store.as_mut() {
            store.append(record)?;
        }
        self.last_log = Some(Instant::now());
        Ok(())
    }

    // ============================== Handlers ================================

    fn on_startup(&mut self) {
        let battery = self.dev.power.battery_pct();
        info!(battery_pct = battery, "startup");
        if battery <= self.settings.critical_battery_threshold && !self.settings.test_mode {
            error!(battery_pct = battery, "battery critical");
            self.fail(ErrorCause::BatteryCritical);
            return;
        }
        self.enter(State::Init);
    }

    async fn on_init(&mut self) {
        self.dev.power.enable_peripherals();
        if let Some(io) = self.dev.io.as_mut() {
            io.set_output(self.settings.output_default_state);
        }
        if self.network_wanted() {
            if let Err(e) = self.dev.link.power_on().await {
                warn!(%e, "radio unavailable; continuing without network");
                self.degraded_since = Some(Instant::now());
            }
        }
        self.enter(State::AcquireFix);
    }

    fn on_acquire_fix(&mut self) {
        self.fix = self.dev.gnss.get_fix();
        let waited = self.fix_started.map(|t| t.elapsed()).unwrap_or_default();
        let gave_up = waited >= Duration::from_secs(self.settings.fix_timeout_sec);
        if !self.fix.valid && !gave_up {
            return;
        }
        if self.fix.valid {
            info!(
                lat = format_args!("{:.6}", self.fix.latitude),
                lon = format_args!("{:.6}", self.fix.longitude),
                sats = self.fix.satellites,
                hdop = self.fix.hdop,
                "fix acquired"
            );
        } else {
            warn!(waited_s = waited.as_secs(), "no fix; reporting without one");
        }
        if self.settings.mode == OperatingMode::Logging {
            self.enter(State::Ready);
        } else {
            self.enter(State::ConnectNetwork);
        }
    }

    async fn on_connect(&mut self) {
        if !self.network_wanted() {
            self.enter(State::Ready);
            return;
        }
        if self.dev.link.is_connected() {
            self.on_connected();
            self.enter(State::Ready);
            return;
        }
        let timeout = Duration::from_secs(self.settings.connection_timeout_sec);
        self.pause_watchdog();
        info!(timeout_s = timeout.as_secs(), attempt = self.retry_count + 1, "connecting");
        if self.dev.link.connect(timeout).await {
            info!("network connected");
            self.on_connected();
            self.enter(State::Ready);
            return;
        }
        self.retry_count += 1;
        if self.retry_count < self.settings.connection_retry_count {
            warn!(retry = self.retry_count, max = self.settings.connection_retry_count, "connect failed; retrying");
            time::sleep(Duration::from_millis(self.settings.connect_retry_ms)).await;
        } else {
            warn!(recheck_s = self.settings.degraded_recheck_sec, "network unavailable; logging only");
            self.retry_count = 0;
            self.degraded_since = Some(Instant::now());
            self.enter(State::Ready);
        }
    }

    fn on_connected(&mut self) {
        self.retry_count = 0;
        if !self.connection_lost {
            return;
        }
        self.connection_lost = false;
        self.alerts |= AlertMask::CONNECTION_RESTORED;
        let backlog = self.dev.log_store.as_ref().map_or(0, |s| s.len());
        if self.settings.auto_upload_logs && backlog > 0 {
            info!(backlog, "connection restored; log upload queued");
            self.pending.log_upload = true;
        }
    }

    fn on_ready(&mut self) -> Result<(), BeaconError> {
        if let Some(since) = self.degraded_since {
            if since.elapsed() >= Duration::from_secs(self.settings.degraded_recheck_sec) {
                info!("retrying network after degraded period");
                self.degraded_since = None;
            }
        }

        if self.pending.log_upload {
            self.enter(State::UploadLog);
            return Ok(());
        }
        if self.pending.status || self.pending.locate || !self.alerts.is_empty() {
            self.enter(State::Transmit);
            return Ok(());
        }

        let interval = self.reporting_interval();
        let due = self.last_transmit.is_none_or(|t| t.elapsed() >= interval);
        if due {
            if self.network_wanted() {
                self.enter(State::Transmit);
            } else {
                self.last_transmit = Some(Instant::now());
            }
            return Ok(());
        }

        self.fix = self.dev.gnss.get_fix();
        let log_due = self
            .last_log
            .is_none_or(|t| t.elapsed() >= Duration::from_secs(self.settings.logging_rate_sec));
        if log_due {
            self.record_log(AlertMask::empty())?;
        }

        if self.network_wanted() && !self.dev.link.is_connected() {
            warn!("network connection lost");
            self.alerts |= AlertMask::CONNECTION_LOST;
            self.connection_lost = true;
            self.enter(State::ConnectNetwork);
            return Ok(());
        }

        match self.settings.mode {
            OperatingMode::Standby | OperatingMode::ForeverStandby => self.enter(State::Standby),
            OperatingMode::Hibernate => self.enter(State::Hibernate),
            _ => {}
        }
        Ok(())
    }

    async fn on_transmit(&mut self) -> Result<(), BeaconError> {
        let reported = self.alerts;

        if !self.network_wanted() {
            self.record_log(reported)?;
            self.report_done(reported);
            return Ok(());
        }

        let status = self.device_status();
        let msg = self.codec.build(&self.fix, &status, reported);
        if self.send(&msg).await {
            info!(seq = self.codec.sequence(), alerts = ?reported, "report sent");
            self.retry_count = 0;
            self.report_done(reported);
            return Ok(());
        }

        self.retry_count += 1;
        if self.retry_count < self.settings.connection_retry_count {
            warn!(retry = self.retry_count, "send failed; retrying");
            time::sleep(Duration::from_millis(self.settings.transmit_retry_ms)).await;
        } else {
            warn!("send failed repeatedly; reconnecting");
            self.retry_count = 0;
            self.enter(State::ConnectNetwork);
        }
        Ok(())
    }

    /// Bookkeeping shared by a delivered report and the logging-only path.
    fn report_done(&mut self, reported: AlertMask) {
        self.last_transmit = Some(Instant::now());
        self.alerts.remove(reported);
        self.pending.status = false;
        self.pending.locate = false;
        self.wake_trigger = WAKE_NONE;
        let next = if self.settings.sleep_between_reports {
            State::Sleep
        } else {
            match self.settings.mode {
                OperatingMode::Standby | OperatingMode::ForeverStandby => State::Standby,
                OperatingMode::Hibernate => State::Hibernate,
                _ => State::Ready,
            }
        };
        self.enter(next);
    }

    async fn send(&mut self, msg: &[u8]) -> bool {
        debug!(len = msg.len(), bytes = %hex::encode(msg), "outgoing");
        if tracing::enabled!(Level::DEBUG) {
            match self.codec.open(msg) {
                Ok(d) => debug!(
                    seq = d.sequence,
                    lat = d.latitude(),
                    lon = d.longitude(),
                    valid = d.fix_valid,
                    alerts = ?d.alerts,
                    "outgoing decoded"
                ),
                Err(e) => warn!(%e, "outgoing message failed self-check"),
            }
        }
        let timeout = Duration::from_millis(self.settings.send_timeout_ms);
        self.dev
            .link
            .send(&self.settings.server_host, self.settings.server_port, msg, timeout)
            .await
    }

    async fn on_sleep(&mut self) {
        let interval = self.reporting_interval();
        if self.settings.deep_sleep_enabled && !self.settings.test_mode {
            info!(secs = interval.as_secs(), "deep sleep");
            self.restart = Some(Restart::DeepSleep(interval));
            return;
        }
        info!(secs = interval.as_secs(), "light sleep");
        self.nap(interval).await;
        self.wake_trigger = WAKE_TIMER;
        self.enter(State::AcquireFix);
    }

    async fn on_standby(&mut self) {
        if self.settings.mode == OperatingMode::ForeverStandby {
            let hours = self.settings.forever_standby_check_hr.max(1);
            self.nap(Duration::from_secs(hours * 3600)).await;
            self.wake_trigger = WAKE_TIMER;
            self.enter(State::AcquireFix);
            return;
        }

        let ev = self.tick_events;
        let wake = if ev.motion && self.settings.standby_wake_on_motion {
            Some(WAKE_MOTION)
        } else if ev.input_changed && self.settings.standby_wake_on_input {
            Some(WAKE_INPUT)
        } else {
            None
        };
        if let Some(trigger) = wake {
            info!(trigger, "woken from standby");
            self.wake_trigger = trigger;
            self.settings.mode = OperatingMode::Active;
            self.persist();
            self.enter(State::AcquireFix);
            return;
        }

        let check_in_due = self
            .last_transmit
            .is_none_or(|t| t.elapsed() >= self.reporting_interval());
        if check_in_due {
            debug!("standby check-in due");
            self.wake_trigger = WAKE_TIMER;
            self.enter(State::AcquireFix);
            return;
        }

        let nap = Duration::from_secs(self.settings.standby_check_interval_sec);
        self.nap(nap).await;
    }

    async fn on_hibernate(&mut self) {
        let hours = self.settings.hibernate_wake_interval_hr.max(1);
        let interval = Duration::from_secs(hours * 3600);
        if !self.settings.hibernate_check_motion {
            info!(hours, "hibernating");
            self.nap(interval).await;
            self.wake_trigger = WAKE_TIMER;
            self.enter(State::AcquireFix);
            return;
        }

        // watching the motion sensor: nap in standby-sized steps
        if self.tick_events.motion {
            info!("woken from hibernate by motion");
            self.wake_trigger = WAKE_MOTION;
            self.settings.mode = OperatingMode::Active;
            self.persist();
            self.enter(State::AcquireFix);
            return;
        }
        if self.last_transmit.is_none_or(|t| t.elapsed() >= interval) {
            self.wake_trigger = WAKE_TIMER;
            self.enter(State::AcquireFix);
            return;
        }
        self.nap(Duration::from_secs(self.settings.standby_check_interval_sec)).await;
    }

    async fn on_upload_log(&mut self) -> Result<(), BeaconError> {
        self.pending.log_upload = false;
        if !self.network_wanted() {
            self.enter(State::Ready);
            return Ok(());
        }
        let limit = self.settings.upload_batch_size;
        let batch = match self.dev.log_store.as_ref() {
            Some(store) => store.pending(limit)?,
            None => Vec::new(),
        };

        let mut uploaded = Vec::with_capacity(batch.len());
        for (id, record) in &batch {
            let msg = self.codec.build(&record.fix, &record.status, record.alerts);
            if !self.send(&msg).await {
                warn!(id, "log upload interrupted");
                break;
            }
            uploaded.push(*id);
        }
        if let Some(store) = self.dev.log_store.as_mut() {
            store.mark_uploaded(&uploaded)?;
        }
        info!(sent = uploaded.len(), batch = batch.len(), "log upload");
        if uploaded.len() == limit {
            self.pending.log_upload = true;
        }
        self.enter(State::Ready);
        Ok(())
    }

    async fn on_error(&mut self) {
        warn!(cause = ?self.error, "in error state");
        time::sleep(Duration::from_millis(self.settings.error_retry_ms)).await;
        let battery = self.dev.power.battery_pct();
        if battery > self.settings.critical_battery_threshold || self.settings.test_mode {
            info!(battery_pct = battery, "recovering");
            self.error = None;
            self.retry_count = 0;
            self.enter(State::Init);
        }
    }

    /// Long waits must not starve the watchdog; the next feed re-arms it.
    fn pause_watchdog(&mut self) {
        if let Some(w) = self.dev.watchdog.as_mut() {
            w.suspend();
        }
    }

    /// Test mode waits with the device awake.
    async fn nap(&mut self, duration: Duration) {
        self.pause_watchdog();
        if self.settings.test_mode {
            time::sleep(duration).await;
        } else {
            self.dev.power.light_sleep(duration).await;
        }
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.settings) {
            warn!(%e, "settings not persisted");
        }
    }
}
