// src/lib.rs: ciNet position/status message: framing, CRC-16, Blowfish-ECB payload

use bitflags::bitflags;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub mod checksum;
pub mod cipher;
pub mod datong;
mod error;
pub mod message;
pub mod pack;

pub use checksum::{checksum, checksum_complement};
pub use cipher::{BlockCipher, derive_key};
pub use datong::DatongTime;
pub use error::ProtocolError;
pub use message::{DecodedMessage, MessageCodec};

// =============================== Common =====================================

pub const MSG_LEN: usize = 149;
pub const HEADER_LEN: usize = 51;
pub const PAYLOAD_LEN: usize = 96;
pub const PAYLOAD_BLOCKS: usize = PAYLOAD_LEN / cipher::BLOCK_LEN;

pub const START_MARKER: u8 = b'$';
pub const PACKET_TYPE: u8 = b'U';
pub const CINET_TYPE: u8 = b'D';
pub const MESSAGE_TYPE: u8 = 0x02;
pub const ALARM_DEFAULT: u8 = 0xFF;
pub const DEVICE_SPECIFIC_LEN: u16 = 0x2E;

pub const DEFAULT_SERVER_PORT: u16 = 4509;

/// Width of each null-padded identity field on the wire; the usable length is
/// one less.
pub const SERIAL_WIDTH: usize = 24;
pub const CLIENT_NAME_WIDTH: usize = 20;
pub const SOURCE_TYPE_WIDTH: usize = 12;
pub const OPERATOR_WIDTH: usize = 8;

// =============================== Enums ======================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    #[default]
    Active = 0,
    Standby = 1,
    Hibernate = 2,
    Logging = 3,
    Continuous = 4,
    ForeverStandby = 5,
}

impl OperatingMode {
    pub fn wire_code(self) -> u8 {
        self as u8
    }

    pub fn is_standby(self) -> bool {
        matches!(self, OperatingMode::Standby | OperatingMode::ForeverStandby)
    }
}

bitflags! {
    /// Pending alert bits, carried in payload bytes 144–145.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AlertMask: u16 {
        const LOW_BATTERY         = 0x0001;
        const MOTION_START        = 0x0002;
        const MOTION_STOP         = 0x0004;
        const INPUT_CHANGE        = 0x0008;
        const TAMPER              = 0x0010;
        const POWER_LOST          = 0x0020;
        const POWER_RESTORED      = 0x0040;
        const GEOFENCE_ENTER      = 0x0080;
        const GEOFENCE_EXIT       = 0x0100;
        const CONNECTION_LOST     = 0x0200;
        const CONNECTION_RESTORED = 0x0400;
    }
}

bitflags! {
    /// Device status bitfield, payload bytes 111–112.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StatusFlags: u16 {
        const GPS_FIX           = 0x0001;
        const NETWORK_CONNECTED = 0x0002;
        const MOTION_DETECTED   = 0x0004;
        const EXTERNAL_POWER    = 0x0008;
        const INPUT_ACTIVE      = 0x0010;
        const OUTPUT_ACTIVE     = 0x0020;
        const TAMPER_DETECTED   = 0x0040;
        const LOW_BATTERY       = 0x0080;
        const LOGGING_ACTIVE    = 0x0100;
        const STANDBY_MODE      = 0x0200;
        const HIBERNATE_MODE    = 0x0400;
    }
}

// ============================== Identity ====================================

/// Who the beacon says it is. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub device_key: u32,
    pub serial: heapless::String<{ SERIAL_WIDTH - 1 }>,
    pub client_name: heapless::String<{ CLIENT_NAME_WIDTH - 1 }>,
    pub source_type: heapless::String<{ SOURCE_TYPE_WIDTH - 1 }>,
    pub operator: heapless::String<{ OPERATOR_WIDTH - 1 }>,
}

impl Identity {
    /// Over-long strings are truncated to the field width.
    pub fn new(
        device_key: u32,
        serial: &str,
        client_name: &str,
        source_type: &str,
        operator: &str,
    ) -> Self {
        Self {
            device_key,
            serial: truncated(serial),
            client_name: truncated(client_name),
            source_type: truncated(source_type),
            operator: truncated(operator),
        }
    }

    /// Parse the dotted-hex form used in configuration, e.g. `"06.EA.83.A3"`.
    pub fn parse_device_key(text: &str) -> Result<u32, ProtocolError> {
        let parts: Vec<&str> = text.trim().split('.').collect();
        if parts.len() != 4 || parts.iter().any(|p| p.is_empty() || p.len() > 2) {
            return Err(ProtocolError::DeviceKey(text.to_string()));
        }
        let joined: String = parts.iter().map(|p| format!("{p:0>2}")).collect();
        let bytes = hex::decode(&joined).map_err(|_| ProtocolError::DeviceKey(text.to_string()))?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

fn truncated<const N: usize>(text: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in text.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

// ============================ Fix and status =================================

/// Latest best-effort position. Opaque to the codec beyond scaling.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    pub speed_kmh: f64,
    pub heading_deg: Option<f64>,
    pub hdop: f64,
    pub satellites: u8,
    pub valid: bool,
    pub timestamp: Option<NaiveDateTime>,
}

impl Default for PositionFix {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            altitude_m: 0.0,
            speed_kmh: 0.0,
            heading_deg: None,
            hdop: 99.9,
            satellites: 0,
            valid: false,
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

/// Snapshot of everything the device-specific payload region reports.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    pub battery_pct: u8,
    pub temperature_c: i16,
    pub signal_dbm: i32,
    pub moving: bool,
    pub status_flags: StatusFlags,
    pub lac: u16,
    pub cell_id: u16,
    pub access_technology: u16,
    pub firmware: FirmwareVersion,
    pub mode: OperatingMode,
    pub motion_sensitivity: u8,
    pub wake_trigger: u8,
    pub output_on: bool,
    pub geozone: u8,
    pub input_on: bool,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            battery_pct: 100,
            temperature_c: 20,
            signal_dbm: 0,
            moving: false,
            status_flags: StatusFlags::empty(),
            lac: 0,
            cell_id: 0,
            access_technology: 7,
            firmware: FirmwareVersion::default(),
            mode: OperatingMode::Active,
            motion_sensitivity: 1,
            wake_trigger: 0,
            output_on: false,
            geozone: 0,
            input_on: false,
        }
    }
}

// ================================ Tests =====================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_fields_truncate_to_width() {
        let id = Identity::new(
            1,
            "ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            "Python Simulator Long Name",
            "MillitagPlusExtra",
            "O2 - UK mobile",
        );
        assert_eq!(id.serial.as_str(), "ABCDEFGHIJKLMNOPQRSTUVW");
        assert_eq!(id.client_name.len(), CLIENT_NAME_WIDTH - 1);
        assert_eq!(id.source_type.as_str(), "MillitagPlu");
        assert_eq!(id.operator.as_str(), "O2 - UK");
    }

    #[test]
    fn device_key_parses_dotted_hex() {
        assert_eq!(Identity::parse_device_key("06.EA.83.A3"), Ok(0x06EA_83A3));
        assert_eq!(Identity::parse_device_key("6.ea.83.a3"), Ok(0x06EA_83A3));
        assert!(Identity::parse_device_key("06.EA.83").is_err());
        assert!(Identity::parse_device_key("06.EA.83.ZZ").is_err());
        assert!(Identity::parse_device_key("06.EA.830.A3").is_err());
    }

    #[test]
    fn mode_wire_codes_are_stable() {
        assert_eq!(OperatingMode::Active.wire_code(), 0);
        assert_eq!(OperatingMode::ForeverStandby.wire_code(), 5);
        assert!(OperatingMode::ForeverStandby.is_standby());
        assert!(!OperatingMode::Hibernate.is_standby());
    }

    #[test]
    fn alert_mask_accumulates_and_clears() {
        let mut mask = AlertMask::empty();
        mask |= AlertMask::TAMPER;
        mask |= AlertMask::LOW_BATTERY;
        assert_eq!(mask.bits(), 0x0011);
        mask.remove(AlertMask::TAMPER);
        assert_eq!(mask, AlertMask::LOW_BATTERY);
    }
}
