// src/config.rs: command line interface and persisted settings (server, identity, rates, alerts)
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use cinet_protocol::{DEFAULT_SERVER_PORT, FirmwareVersion, Identity, OperatingMode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::BeaconError;

pub const MIN_RATE_SEC: u32 = 5;
pub const MAX_RATE_SEC: u32 = 86_400;

#[derive(Parser, Debug, Clone)]
#[command(name = "beacon_fw", about = "ciNet GPS tracking beacon")]
pub struct Cli {
    #[arg(long, default_value = "beacon.toml")]    pub config: PathBuf,
    /// Override the backend as HOST:PORT.
    #[arg(long)]                                   pub server: Option<String>,
    #[arg(long, value_enum)]                       pub network: Option<NetworkKind>,
    /// Also write daily-rolling log files here.
    #[arg(long)]                                   pub log_dir: Option<PathBuf>,
    /// Seed for the simulated GNSS/power/motion sources.
    #[arg(long)]                                   pub seed: Option<u64>,
}

impl Cli {
    /// Command-line overrides win over file and environment.
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(server) = &self.server {
            match server.rsplit_once(':') {
                Some((host, port)) => {
                    settings.server_host = host.to_string();
                    settings.server_port = port.parse().unwrap_or(DEFAULT_SERVER_PORT);
                }
                None => settings.server_host = server.clone(),
            }
        }
        if let Some(kind) = self.network {
            settings.network = kind;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum NetworkKind {
    Tcp,
    Udp,
    /// Never connects; the beacon runs logging-only.
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RfMode {
    On,
    Off,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateKind {
    Moving,
    Stopped,
    Standby,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // ---- backend ----
    pub server_host: String,
    pub server_port: u16,
    pub passphrase: String,
    pub network: NetworkKind,
    pub rf_mode: RfMode,

    // ---- identity ----
    pub cinet_key: String,
    pub serial_number: String,
    pub client_name: String,
    pub source_type: String,
    pub operator: String,
    pub fw_version_major: u8,
    pub fw_version_minor: u8,
    pub fw_version_patch: u8,

    // ---- mode and cadence ----
    pub mode: OperatingMode,
    pub rate_moving_sec: u32,
    pub rate_stopped_sec: u32,
    pub rate_standby_sec: u32,
    pub deployment_window_sec: u64,
    pub motion_timeout_sec: u64,
    pub motion_speed_threshold_kmh: f64,
    pub motion_sensitivity: u8,
    pub fix_timeout_sec: u64,
    pub tick_ms: u64,

    // ---- power ----
    pub low_battery_threshold: u8,
    pub critical_battery_threshold: u8,
    pub sleep_between_reports: bool,
    pub deep_sleep_enabled: bool,
    pub standby_check_interval_sec: u64,
    pub standby_wake_on_motion: bool,
    pub standby_wake_on_input: bool,
    pub forever_standby_check_hr: u64,
    pub hibernate_wake_interval_hr: u64,
    pub hibernate_check_motion: bool,

    // ---- awake hours (UTC, from the GNSS clock) ----
    pub schedule_enabled: bool,
    pub schedule_awake_start: String,
    pub schedule_awake_end: String,
    pub schedule_wake_on_motion: bool,

    // ---- connectivity ----
    pub connection_retry_count: u32,
    pub connection_timeout_sec: u64,
    pub connect_retry_ms: u64,
    pub transmit_retry_ms: u64,
    pub send_timeout_ms: u64,
    pub error_retry_ms: u64,
    pub degraded_recheck_sec: u64,

    // ---- local log ----
    pub logging_enabled: bool,
    pub logging_rate_sec: u64,
    pub max_log_points: usize,
    pub auto_upload_logs: bool,
    pub upload_batch_size: usize,

    // ---- alerts ----
    pub alert_low_battery: bool,
    pub alert_motion_start: bool,
    pub alert_motion_stop: bool,
    pub alert_input_change: bool,
    pub alert_external_power: bool,
    pub tamper_alerts: bool,
    pub geofence_enabled: bool,
    pub geofence_lat: f64,
    pub geofence_lon: f64,
    pub geofence_radius_m: f64,

    // ---- io ----
    pub output_default_state: bool,

    // ---- supervision ----
    pub watchdog_timeout_sec: u64,
    pub watchdog_enforce: bool,
    /// Bench mode: motion sensor, battery shutdown, sleeps, deployment
    /// window and watchdog all off.
    pub test_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_host: "86.188.208.143".into(),
            server_port: DEFAULT_SERVER_PORT,
            passphrase: "fredfred".into(),
            network: NetworkKind::Tcp,
            rf_mode: RfMode::Auto,

            cinet_key: "06.EA.83.A3".into(),
            serial_number: "0001576627".into(),
            client_name: "Python Simulator".into(),
            source_type: "Millitag".into(),
            operator: "O2 - UK".into(),
            fw_version_major: 2,
            fw_version_minor: 7,
            fw_version_patch: 4,

            mode: OperatingMode::Active,
            rate_moving_sec: 10,
            rate_stopped_sec: 60,
            rate_standby_sec: 3600,
            deployment_window_sec: 600,
            motion_timeout_sec: 120,
            motion_speed_threshold_kmh: 2.0,
            motion_sensitivity: 1,
            fix_timeout_sec: 300,
            tick_ms: 100,

            low_battery_threshold: 20,
            critical_battery_threshold: 10,
            sleep_between_reports: false,
            deep_sleep_enabled: false,
            standby_check_interval_sec: 60,
            standby_wake_on_motion: true,
            standby_wake_on_input: true,
            forever_standby_check_hr: 24,
            hibernate_wake_interval_hr: 24,
            hibernate_check_motion: false,

            schedule_enabled: false,
            schedule_awake_start: "06:00".into(),
            schedule_awake_end: "22:00".into(),
            schedule_wake_on_motion: true,

            connection_retry_count: 3,
            connection_timeout_sec: 120,
            connect_retry_ms: 5000,
            transmit_retry_ms: 1000,
            send_timeout_ms: 10_000,
            error_retry_ms: 5000,
            degraded_recheck_sec: 600,

            logging_enabled: true,
            logging_rate_sec: 10,
            max_log_points: 260_000,
            auto_upload_logs: true,
            upload_batch_size: 50,

            alert_low_battery: true,
            alert_motion_start: false,
            alert_motion_stop: false,
            alert_input_change: true,
            alert_external_power: true,
            tamper_alerts: true,
            geofence_enabled: false,
            geofence_lat: 0.0,
            geofence_lon: 0.0,
            geofence_radius_m: 1000.0,

            output_default_state: false,

            watchdog_timeout_sec: 30,
            watchdog_enforce: false,
            test_mode: false,
        }
    }
}

impl Settings {
    /// Bring loaded values back into the ranges the device accepts.
    pub fn normalized(mut self) -> Self {
        self.rate_moving_sec = clamp_rate(self.rate_moving_sec);
        self.rate_stopped_sec = clamp_rate(self.rate_stopped_sec);
        self.rate_standby_sec = clamp_rate(self.rate_standby_sec);
        self.connection_retry_count = self.connection_retry_count.max(1);
        self.upload_batch_size = self.upload_batch_size.max(1);
        self.max_log_points = self.max_log_points.max(1);
        self.tick_ms = self.tick_ms.max(1);
        self
    }

    /// Returns the value actually stored.
    pub fn set_rate(&mut self, kind: RateKind, seconds: u32) -> u32 {
        let secs = clamp_rate(seconds);
        match kind {
            RateKind::Moving => self.rate_moving_sec = secs,
            RateKind::Stopped => self.rate_stopped_sec = secs,
            RateKind::Standby => self.rate_standby_sec = secs,
        }
        secs
    }

    pub fn identity(&self) -> Result<Identity, BeaconError> {
        Ok(Identity::new(
            Identity::parse_device_key(&self.cinet_key)?,
            &self.serial_number,
            &self.client_name,
            &self.source_type,
            &self.operator,
        ))
    }

    pub fn firmware(&self) -> FirmwareVersion {
        FirmwareVersion {
            major: self.fw_version_major,
            minor: self.fw_version_minor,
            patch: self.fw_version_patch,
        }
    }
}

pub fn clamp_rate(seconds: u32) -> u32 {
    seconds.clamp(MIN_RATE_SEC, MAX_RATE_SEC)
}

// ============================ Settings stores ===============================

/// Last write wins.
pub trait SettingsStore: Send {
    fn load(&self) -> Result<Settings, BeaconError>;
    fn save(&mut self, settings: &Settings) -> Result<(), BeaconError>;
}

/// Defaults, then the TOML file (if present), then `BEACON_*` variables.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsStore for FileStore {
    fn load(&self) -> Result<Settings, BeaconError> {
        let defaults = config::Config::try_from(&Settings::default())?;
        let merged = config::Config::builder()
            .add_source(defaults)
            .add_source(
                config::File::new(&self.path.to_string_lossy(), config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix("BEACON").try_parsing(true))
            .build()?;
        let settings = merged.try_deserialize::<Settings>()?.normalized();
        debug!(path = %self.path.display(), "settings loaded");
        Ok(settings)
    }

    fn save(&mut self, settings: &Settings) -> Result<(), BeaconError> {
        let text = toml::to_string_pretty(settings)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, text)?;
        info!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    saved: Option<Settings>,
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<Settings, BeaconError> {
        Ok(self.saved.clone().unwrap_or_default())
    }

    fn save(&mut self, settings: &Settings) -> Result<(), BeaconError> {
        self.saved = Some(settings.clone());
        Ok(())
    }
}
