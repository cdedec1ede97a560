// src/message.rs
//! The 149-byte ciNet position/status message.
//!
//! ```text
//!   0..51   header (plain)    $ U len seq key D source serial timestamp
//!  51..147  payload (Blowfish-ECB, 12 blocks)
//! 147..149  complement of the checksum over 0..147
//! ```
//!
//! Inside the payload, bytes 53..55 carry the complement of the checksum over
//! 55..147, computed before encryption.

use chrono::NaiveDateTime;

use crate::checksum::{checksum_complement, store_complement};
use crate::cipher::BlockCipher;
use crate::datong::{DATONG_LEN, DatongTime};
use crate::pack::{get_i32, get_text, get_u16, get_u32, put_i32, put_text, put_u16, put_u32};
use crate::{
    ALARM_DEFAULT, AlertMask, CINET_TYPE, CLIENT_NAME_WIDTH, DEVICE_SPECIFIC_LEN, DeviceStatus,
    HEADER_LEN, Identity, MESSAGE_TYPE, MSG_LEN, OPERATOR_WIDTH, PACKET_TYPE, PAYLOAD_LEN,
    PositionFix, ProtocolError, SERIAL_WIDTH, SOURCE_TYPE_WIDTH, START_MARKER, StatusFlags,
};

// header offsets
const OFF_LENGTH: usize = 2;
const OFF_SEQUENCE: usize = 4;
const OFF_KEY: usize = 5;
const OFF_CINET_TYPE: usize = 9;
const OFF_SOURCE_TYPE: usize = 10;
const OFF_SERIAL: usize = 22;
const OFF_HEADER_TIME: usize = 46;

// payload offsets (absolute)
const OFF_PAYLOAD_LEN: usize = 51;
const OFF_PAYLOAD_CRC: usize = 53;
const OFF_MESSAGE_TYPE: usize = 55;
const OFF_CLIENT_NAME: usize = 56;
const OFF_LATITUDE: usize = 76;
const OFF_LONGITUDE: usize = 80;
const OFF_HEADING: usize = 84;
const OFF_SPEED: usize = 86;
const OFF_FIX_TIME: usize = 88;
const OFF_HDOP: usize = 93;
const OFF_FIX_VALID: usize = 95;
const OFF_MOTION: usize = 96;
const OFF_ALARM: usize = 97;
const OFF_DEVICE_LEN: usize = 98;
const OFF_BATTERY: usize = 100;
const OFF_TEMPERATURE: usize = 101;
const OFF_SATELLITES: usize = 102;
const OFF_SIGNAL: usize = 103;
const OFF_STATUS: usize = 111;
const OFF_LAC: usize = 113;
const OFF_CELL_ID: usize = 115;
const OFF_ACCESS_TECH: usize = 117;
const OFF_OPERATOR: usize = 119;
const OFF_FIRMWARE: usize = 127;
const OFF_MODE: usize = 138;
const OFF_SENSITIVITY: usize = 139;
const OFF_WAKE_TRIGGER: usize = 140;
const OFF_OUTPUT: usize = 141;
const OFF_GEOZONE: usize = 142;
const OFF_INPUT: usize = 143;
const OFF_ALERTS: usize = 144;
const OFF_TRAILER: usize = HEADER_LEN + PAYLOAD_LEN;

const PAYLOAD_CRC_SPAN: usize = OFF_TRAILER - OFF_MESSAGE_TYPE;

const COORD_SCALE: f64 = 60_000.0;
const HEADING_UNKNOWN: u16 = 0xFFFF;

/// Builds framed messages for one identity. Holds the only mutable protocol
/// state, the 8-bit sequence counter.
#[derive(Debug)]
pub struct MessageCodec {
    identity: Identity,
    sequence: u8,
    cipher: BlockCipher,
}

impl MessageCodec {
    pub fn new(identity: Identity, passphrase: &str) -> Result<Self, ProtocolError> {
        Ok(Self::with_cipher(identity, BlockCipher::from_passphrase(passphrase)?))
    }

    pub fn with_cipher(identity: Identity, cipher: BlockCipher) -> Self {
        Self {
            identity,
            sequence: 0,
            cipher,
        }
    }

    /// Sequence number carried by the most recently built message.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Swap the payload key, e.g. after the passphrase was reconfigured. The
    /// sequence counter carries on.
    pub fn rekey(&mut self, cipher: BlockCipher) {
        self.cipher = cipher;
    }

    pub fn build(&mut self, fix: &PositionFix, status: &DeviceStatus, alerts: AlertMask) -> [u8; MSG_LEN] {
        self.sequence = self.sequence.wrapping_add(1);

        let stamp = fix
            .timestamp
            .as_ref()
            .map(DatongTime::from_datetime)
            .unwrap_or(DatongTime::PLACEHOLDER)
            .encode();

        let mut msg = [0u8; MSG_LEN];
        self.write_header(&mut msg, &stamp);
        self.write_payload(&mut msg, &stamp, fix, status, alerts);

        store_complement(&mut msg, OFF_PAYLOAD_CRC, OFF_MESSAGE_TYPE, PAYLOAD_CRC_SPAN);
        self.cipher.encrypt_in_place(&mut msg[HEADER_LEN..OFF_TRAILER]);
        store_complement(&mut msg, OFF_TRAILER, 0, OFF_TRAILER);
        msg
    }

    fn write_header(&self, msg: &mut [u8; MSG_LEN], stamp: &[u8; DATONG_LEN]) {
        msg[0] = START_MARKER;
        msg[1] = PACKET_TYPE;
        put_u16(msg, OFF_LENGTH, MSG_LEN as u16);
        msg[OFF_SEQUENCE] = self.sequence;
        put_u32(msg, OFF_KEY, self.identity.device_key);
        msg[OFF_CINET_TYPE] = CINET_TYPE;
        put_text(msg, OFF_SOURCE_TYPE, SOURCE_TYPE_WIDTH, &self.identity.source_type);
        put_text(msg, OFF_SERIAL, SERIAL_WIDTH, &self.identity.serial);
        msg[OFF_HEADER_TIME..OFF_HEADER_TIME + DATONG_LEN].copy_from_slice(stamp);
    }

    fn write_payload(
        &self,
        msg: &mut [u8; MSG_LEN],
        stamp: &[u8; DATONG_LEN],
        fix: &PositionFix,
        status: &DeviceStatus,
        alerts: AlertMask,
    ) {
        put_u16(msg, OFF_PAYLOAD_LEN, PAYLOAD_LEN as u16);
        put_u16(msg, OFF_PAYLOAD_CRC, 0);
        msg[OFF_MESSAGE_TYPE] = MESSAGE_TYPE;
        put_text(msg, OFF_CLIENT_NAME, CLIENT_NAME_WIDTH, &self.identity.client_name);

        // ---- position ----
        put_i32(msg, OFF_LATITUDE, scale_coordinate(fix.latitude));
        put_i32(msg, OFF_LONGITUDE, scale_coordinate(fix.longitude));
        put_u16(msg, OFF_HEADING, scale_heading(fix.heading_deg));
        put_u16(msg, OFF_SPEED, saturate_u16(fix.speed_kmh));
        msg[OFF_FIX_TIME..OFF_FIX_TIME + DATONG_LEN].copy_from_slice(stamp);
        put_u16(msg, OFF_HDOP, saturate_u16(fix.hdop * 100.0));
        msg[OFF_FIX_VALID] = u8::from(fix.valid);
        msg[OFF_MOTION] = u8::from(status.moving);
        msg[OFF_ALARM] = ALARM_DEFAULT;
        put_u16(msg, OFF_DEVICE_LEN, DEVICE_SPECIFIC_LEN);

        // ---- device specific ----
        msg[OFF_BATTERY] = status.battery_pct.min(100);
        msg[OFF_TEMPERATURE] = status.temperature_c.clamp(i16::from(i8::MIN), i16::from(i8::MAX)) as i8 as u8;
        msg[OFF_SATELLITES] = fix.satellites;
        put_i32(msg, OFF_SIGNAL, status.signal_dbm);
        // 107..111 reserved, left zero
        put_u16(msg, OFF_STATUS, status.status_flags.bits());
        put_u16(msg, OFF_LAC, status.lac);
        put_u16(msg, OFF_CELL_ID, status.cell_id);
        put_u16(msg, OFF_ACCESS_TECH, status.access_technology);
        put_text(msg, OFF_OPERATOR, OPERATOR_WIDTH, &self.identity.operator);
        msg[OFF_FIRMWARE] = status.firmware.major;
        msg[OFF_FIRMWARE + 1] = status.firmware.minor;
        msg[OFF_FIRMWARE + 2] = status.firmware.patch;
        // 130..138 log range start/end, always zero
        msg[OFF_MODE] = status.mode.wire_code();
        msg[OFF_SENSITIVITY] = status.motion_sensitivity;
        msg[OFF_WAKE_TRIGGER] = status.wake_trigger;
        msg[OFF_OUTPUT] = u8::from(status.output_on);
        msg[OFF_GEOZONE] = status.geozone;
        msg[OFF_INPUT] = u8::from(status.input_on);
        put_u16(msg, OFF_ALERTS, alerts.bits());
        // 146 padding
    }

    /// Verify and decrypt a message built under the same key. The input is
    /// not modified.
    pub fn open(&self, bytes: &[u8]) -> Result<DecodedMessage, ProtocolError> {
        if bytes.len() != MSG_LEN {
            return Err(ProtocolError::Length {
                expected: MSG_LEN,
                actual: bytes.len(),
            });
        }
        for (offset, expected) in [(0, START_MARKER), (1, PACKET_TYPE), (OFF_CINET_TYPE, CINET_TYPE)] {
            if bytes[offset] != expected {
                return Err(ProtocolError::Marker {
                    offset,
                    found: bytes[offset],
                });
            }
        }
        let declared = usize::from(get_u16(bytes, OFF_LENGTH));
        if declared != MSG_LEN {
            return Err(ProtocolError::Length {
                expected: MSG_LEN,
                actual: declared,
            });
        }
        verify(bytes, OFF_TRAILER, 0, OFF_TRAILER, "message")?;

        let mut msg = [0u8; MSG_LEN];
        msg.copy_from_slice(bytes);
        self.cipher.decrypt_in_place(&mut msg[HEADER_LEN..OFF_TRAILER]);
        verify(&msg, OFF_PAYLOAD_CRC, OFF_MESSAGE_TYPE, PAYLOAD_CRC_SPAN, "payload")?;
        if msg[OFF_MESSAGE_TYPE] != MESSAGE_TYPE {
            return Err(ProtocolError::Marker {
                offset: OFF_MESSAGE_TYPE,
                found: msg[OFF_MESSAGE_TYPE],
            });
        }

        let mut header_time = [0u8; DATONG_LEN];
        header_time.copy_from_slice(&msg[OFF_HEADER_TIME..OFF_HEADER_TIME + DATONG_LEN]);
        let mut fix_time = [0u8; DATONG_LEN];
        fix_time.copy_from_slice(&msg[OFF_FIX_TIME..OFF_FIX_TIME + DATONG_LEN]);

        Ok(DecodedMessage {
            sequence: msg[OFF_SEQUENCE],
            device_key: get_u32(&msg, OFF_KEY),
            source_type: get_text(&msg, OFF_SOURCE_TYPE, SOURCE_TYPE_WIDTH),
            serial: get_text(&msg, OFF_SERIAL, SERIAL_WIDTH),
            header_time: DatongTime::decode(&header_time),
            client_name: get_text(&msg, OFF_CLIENT_NAME, CLIENT_NAME_WIDTH),
            latitude_raw: get_i32(&msg, OFF_LATITUDE),
            longitude_raw: get_i32(&msg, OFF_LONGITUDE),
            heading_raw: get_u16(&msg, OFF_HEADING),
            speed_kmh: get_u16(&msg, OFF_SPEED),
            fix_time: DatongTime::decode(&fix_time),
            hdop_raw: get_u16(&msg, OFF_HDOP),
            fix_valid: msg[OFF_FIX_VALID] != 0,
            moving: msg[OFF_MOTION] != 0,
            battery_pct: msg[OFF_BATTERY],
            temperature_c: msg[OFF_TEMPERATURE] as i8,
            satellites: msg[OFF_SATELLITES],
            signal_dbm: get_i32(&msg, OFF_SIGNAL),
            status_flags: StatusFlags::from_bits_retain(get_u16(&msg, OFF_STATUS)),
            lac: get_u16(&msg, OFF_LAC),
            cell_id: get_u16(&msg, OFF_CELL_ID),
            access_technology: get_u16(&msg, OFF_ACCESS_TECH),
            operator: get_text(&msg, OFF_OPERATOR, OPERATOR_WIDTH),
            firmware: [msg[OFF_FIRMWARE], msg[OFF_FIRMWARE + 1], msg[OFF_FIRMWARE + 2]],
            mode: msg[OFF_MODE],
            motion_sensitivity: msg[OFF_SENSITIVITY],
            wake_trigger: msg[OFF_WAKE_TRIGGER],
            output_on: msg[OFF_OUTPUT] != 0,
            geozone: msg[OFF_GEOZONE],
            input_on: msg[OFF_INPUT] != 0,
            alerts: AlertMask::from_bits_retain(get_u16(&msg, OFF_ALERTS)),
        })
    }
}

fn verify(
    buf: &[u8],
    at: usize,
    offset: usize,
    length: usize,
    scope: &'static str,
) -> Result<(), ProtocolError> {
    let stored = get_u16(buf, at);
    let computed = checksum_complement(buf, offset, length);
    if stored == computed {
        Ok(())
    } else {
        Err(ProtocolError::ChecksumMismatch {
            scope,
            stored,
            computed,
        })
    }
}

/// Degrees to 1/60000ths, truncated toward zero. `as` saturates and maps NaN
/// to 0.
fn scale_coordinate(degrees: f64) -> i32 {
    (degrees * COORD_SCALE) as i32
}

fn scale_heading(heading: Option<f64>) -> u16 {
    match heading {
        Some(deg) => saturate_u16(deg * 100.0).min(HEADING_UNKNOWN - 1),
        None => HEADING_UNKNOWN,
    }
}

fn saturate_u16(value: f64) -> u16 {
    value as u16
}

/// Field-by-field view of an opened message.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub sequence: u8,
    pub device_key: u32,
    pub source_type: String,
    pub serial: String,
    pub header_time: DatongTime,
    pub client_name: String,
    pub latitude_raw: i32,
    pub longitude_raw: i32,
    pub heading_raw: u16,
    pub speed_kmh: u16,
    pub fix_time: DatongTime,
    pub hdop_raw: u16,
    pub fix_valid: bool,
    pub moving: bool,
    pub battery_pct: u8,
    pub temperature_c: i8,
    pub satellites: u8,
    pub signal_dbm: i32,
    pub status_flags: StatusFlags,
    pub lac: u16,
    pub cell_id: u16,
    pub access_technology: u16,
    pub operator: String,
    pub firmware: [u8; 3],
    pub mode: u8,
    pub motion_sensitivity: u8,
    pub wake_trigger: u8,
    pub output_on: bool,
    pub geozone: u8,
    pub input_on: bool,
    pub alerts: AlertMask,
}

impl DecodedMessage {
    pub fn latitude(&self) -> f64 {
        f64::from(self.latitude_raw) / COORD_SCALE
    }

    pub fn longitude(&self) -> f64 {
        f64::from(self.longitude_raw) / COORD_SCALE
    }

    pub fn heading(&self) -> Option<f64> {
        (self.heading_raw != HEADING_UNKNOWN).then(|| f64::from(self.heading_raw) / 100.0)
    }

    pub fn hdop(&self) -> f64 {
        f64::from(self.hdop_raw) / 100.0
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.fix_time.to_datetime()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FirmwareVersion, OperatingMode};
    use chrono::NaiveDate;

    fn identity() -> Identity {
        Identity::new(0x06EA_83A3, "0001576627", "Python Simulator", "Millitag", "O2 - UK")
    }

    fn codec() -> MessageCodec {
        MessageCodec::new(identity(), "fredfred").unwrap()
    }

    fn fix() -> PositionFix {
        PositionFix {
            latitude: 53.8272,
            longitude: -1.6647,
            altitude_m: 120.0,
            speed_kmh: 42.7,
            heading_deg: Some(271.35),
            hdop: 0.9,
            satellites: 9,
            valid: true,
            timestamp: NaiveDate::from_ymd_opt(2024, 12, 26)
                .and_then(|d| d.and_hms_opt(4, 37, 0)),
        }
    }

    fn status() -> DeviceStatus {
        DeviceStatus {
            battery_pct: 87,
            temperature_c: -12,
            signal_dbm: -71,
            moving: true,
            status_flags: StatusFlags::GPS_FIX | StatusFlags::NETWORK_CONNECTED,
            lac: 0x1A2B,
            cell_id: 0x3C4D,
            access_technology: 7,
            firmware: FirmwareVersion { major: 2, minor: 7, patch: 4 },
            mode: OperatingMode::Continuous,
            motion_sensitivity: 3,
            wake_trigger: 1,
            output_on: true,
            geozone: 2,
            input_on: false,
        }
    }

    #[test]
    fn framing_and_plain_header() {
        let mut codec = codec();
        let msg = codec.build(&fix(), &status(), AlertMask::empty());

        assert_eq!(msg.len(), 149);
        assert_eq!(msg[0], b'$');
        assert_eq!(msg[1], b'U');
        assert_eq!(&msg[2..4], &[0x00, 0x95]);
        assert_eq!(msg[4], 1);
        assert_eq!(&msg[5..9], &[0x06, 0xEA, 0x83, 0xA3]);
        assert_eq!(msg[9], b'D');
        assert_eq!(get_text(&msg, 10, 12), "Millitag");
        assert_eq!(get_text(&msg, 22, 24), "0001576627");
        assert_eq!(&msg[46..51], &[0xD6, 0x2C, 0x24, 0xA0, 0x00]);
    }

    #[test]
    fn trailer_covers_encrypted_message() {
        let mut codec = codec();
        let msg = codec.build(&fix(), &status(), AlertMask::TAMPER);
        assert_eq!(get_u16(&msg, 147), checksum_complement(&msg, 0, 147));
    }

    #[test]
    fn payload_is_encrypted() {
        let mut codec = codec();
        let msg = codec.build(&fix(), &status(), AlertMask::empty());
        // plaintext would carry 0x0060 then the message type byte
        assert_ne!(&msg[51..53], &[0x00, 0x60]);
    }

    #[test]
    fn sequence_increments_and_wraps() {
        let mut codec = codec();
        let s = codec.sequence();
        let seqs: Vec<u8> = (0..3)
            .map(|_| codec.build(&fix(), &status(), AlertMask::empty())[4])
            .collect();
        assert_eq!(seqs, vec![s.wrapping_add(1), s.wrapping_add(2), s.wrapping_add(3)]);

        for _ in 0..253 {
            codec.build(&fix(), &status(), AlertMask::empty());
        }
        assert_eq!(codec.sequence(), 0);
        assert_eq!(codec.build(&fix(), &status(), AlertMask::empty())[4], 1);
    }

    #[test]
    fn coordinates_scale_and_truncate() {
        assert_eq!(scale_coordinate(53.8272), 3_229_632);
        assert_eq!(scale_coordinate(-1.6647), -99_882);
        assert_eq!(scale_coordinate(f64::NAN), 0);
        assert_eq!(scale_coordinate(1e12), i32::MAX);
    }

    #[test]
    fn open_recovers_every_field() {
        let mut codec = codec();
        let alerts = AlertMask::LOW_BATTERY | AlertMask::GEOFENCE_EXIT;
        let msg = codec.build(&fix(), &status(), alerts);
        let d = codec.open(&msg).unwrap();

        assert_eq!(d.sequence, 1);
        assert_eq!(d.device_key, 0x06EA_83A3);
        assert_eq!(d.source_type, "Millitag");
        assert_eq!(d.client_name, "Python Simulator");
        assert_eq!(d.latitude_raw, 3_229_632);
        assert_eq!(d.longitude_raw, -99_882);
        assert!((d.latitude() - 53.8272).abs() < 1e-4);
        assert_eq!(d.heading_raw, 27_135);
        assert_eq!(d.speed_kmh, 42);
        assert_eq!(d.hdop_raw, 90);
        assert_eq!(d.fix_time, DatongTime::new(2024, 12, 26, 4, 37, 0));
        assert_eq!(d.header_time, d.fix_time);
        assert!(d.fix_valid);
        assert!(d.moving);
        assert_eq!(d.battery_pct, 87);
        assert_eq!(d.temperature_c, -12);
        assert_eq!(d.satellites, 9);
        assert_eq!(d.signal_dbm, -71);
        assert_eq!(d.status_flags, StatusFlags::GPS_FIX | StatusFlags::NETWORK_CONNECTED);
        assert_eq!(d.lac, 0x1A2B);
        assert_eq!(d.cell_id, 0x3C4D);
        assert_eq!(d.access_technology, 7);
        assert_eq!(d.operator, "O2 - UK");
        assert_eq!(d.firmware, [2, 7, 4]);
        assert_eq!(d.mode, 4);
        assert_eq!(d.motion_sensitivity, 3);
        assert_eq!(d.wake_trigger, 1);
        assert!(d.output_on);
        assert_eq!(d.geozone, 2);
        assert!(!d.input_on);
        assert_eq!(d.alerts, alerts);
    }

    #[test]
    fn missing_timestamp_uses_placeholder_and_unknown_heading() {
        let mut codec = codec();
        let no_fix = PositionFix::default();
        let msg = codec.build(&no_fix, &status(), AlertMask::empty());
        let d = codec.open(&msg).unwrap();
        assert_eq!(d.fix_time, DatongTime::PLACEHOLDER);
        assert_eq!(d.heading(), None);
        assert!(!d.fix_valid);
        assert_eq!(d.hdop_raw, 9990);
    }

    #[test]
    fn out_of_range_inputs_are_clamped() {
        let mut codec = codec();
        let mut f = fix();
        f.speed_kmh = 1e9;
        f.hdop = f64::NAN;
        f.heading_deg = Some(1e9);
        let mut s = status();
        s.battery_pct = 250;
        s.temperature_c = 300;

        let msg = codec.build(&f, &s, AlertMask::empty());
        let d = codec.open(&msg).unwrap();
        assert_eq!(d.speed_kmh, u16::MAX);
        assert_eq!(d.hdop_raw, 0);
        assert_eq!(d.heading_raw, 0xFFFE);
        assert_eq!(d.battery_pct, 100);
        assert_eq!(d.temperature_c, 127);
    }

    #[test]
    fn tampering_is_detected() {
        let mut codec = codec();
        let mut msg = codec.build(&fix(), &status(), AlertMask::empty());
        msg[100] ^= 0x01;
        assert!(matches!(
            codec.open(&msg),
            Err(ProtocolError::ChecksumMismatch { scope: "message", .. })
        ));
    }

    #[test]
    fn payload_checksum_catches_wrong_key() {
        let mut sender = codec();
        let msg = sender.build(&fix(), &status(), AlertMask::empty());
        let receiver = MessageCodec::new(identity(), "different").unwrap();
        assert!(matches!(
            receiver.open(&msg),
            Err(ProtocolError::ChecksumMismatch { scope: "payload", .. })
                | Err(ProtocolError::Marker { .. })
        ));
    }

    #[test]
    fn rejects_bad_framing() {
        let mut codec = codec();
        let msg = codec.build(&fix(), &status(), AlertMask::empty());
        assert_eq!(
            codec.open(&msg[..148]),
            Err(ProtocolError::Length { expected: 149, actual: 148 })
        );
        let mut bad = msg;
        bad[0] = b'#';
        assert_eq!(codec.open(&bad), Err(ProtocolError::Marker { offset: 0, found: b'#' }));
    }
}
