// src/drivers.rs
//! Collaborator seams the controller drives. Everything behind these traits
//! (GNSS parsing, modem AT commands, GPIO) lives outside this crate; the host
//! build plugs in the simulators from `sensors` and the links from `net`.

use async_trait::async_trait;
use cinet_protocol::{AlertMask, DeviceStatus, PositionFix};
use tokio::time::{Duration, Instant};

#[cfg(test)]
use mockall::automock;

use crate::errors::BeaconError;

pub trait GnssSource: Send {
    /// Latest best-effort fix; `valid == false` when there is none.
    fn get_fix(&mut self) -> PositionFix;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalInfo {
    pub rssi_dbm: i32,
    pub lac: Option<u16>,
    pub cell_id: Option<u16>,
    pub access_technology: u16,
}

/// One capability, several transports. Every call that can block carries its
/// own timeout.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NetworkLink: Send {
    /// Power the radio up; links without one return immediately.
    async fn power_on(&mut self) -> Result<(), BeaconError>;
    async fn connect(&mut self, timeout: Duration) -> bool;
    fn is_connected(&self) -> bool;
    async fn send(&mut self, host: &str, port: u16, bytes: &[u8], timeout: Duration) -> bool;
    fn signal_info(&self) -> SignalInfo;
}

pub trait MotionSensor: Send {
    fn motion_detected_since_last_check(&mut self) -> bool;

    /// Sensors with a continuous reading report it here.
    fn is_moving(&self) -> Option<bool> {
        None
    }
}

pub trait IoPort: Send {
    fn input_state(&self) -> bool;
    fn output_state(&self) -> bool;
    fn set_output(&mut self, on: bool);
}

#[async_trait]
pub trait PowerControl: Send {
    fn battery_pct(&mut self) -> u8;
    fn temperature_c(&self) -> i16;
    fn external_power(&self) -> bool;
    fn enable_peripherals(&mut self);
    /// Suspend with state retained.
    async fn light_sleep(&mut self, duration: Duration);
}

/// One locally logged point.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub fix: PositionFix,
    pub status: DeviceStatus,
    pub alerts: AlertMask,
    pub captured_at: Instant,
}

pub trait LogStore: Send {
    fn append(&mut self, record: LogRecord) -> Result<(), BeaconError>;
    /// Oldest first, at most `limit`, each with the id `mark_uploaded` takes.
    fn pending(&self, limit: usize) -> Result<Vec<(u64, LogRecord)>, BeaconError>;
    fn mark_uploaded(&mut self, ids: &[u64]) -> Result<(), BeaconError>;
    fn erase(&mut self) -> Result<(), BeaconError>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait Watchdog: Send {
    fn feed(&mut self);
    /// Stop counting until the next feed, e.g. across a sleep.
    fn suspend(&mut self) {}
}

/// The full set handed to the controller at construction.
pub struct Devices {
    pub gnss: Box<dyn GnssSource>,
    pub link: Box<dyn NetworkLink>,
    pub power: Box<dyn PowerControl>,
    pub motion: Option<Box<dyn MotionSensor>>,
    pub io: Option<Box<dyn IoPort>>,
    pub log_store: Option<Box<dyn LogStore>>,
    pub watchdog: Option<Box<dyn Watchdog>>,
}
