// src/commands/mod.rs
//! Remote control actions. Transports (SMS, GPRS downlink, the dev console)
//! only ever hand the controller one of these.
pub mod console;

use cinet_protocol::OperatingMode;
use serde::{Deserialize, Serialize};

use crate::config::{RateKind, RfMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlAction {
    SetMode { mode: OperatingMode },
    ResetToDefaults,
    SetRf { rf: RfMode },
    RequestStatus,
    RequestLocate,
    RequestLogUpload,
    RequestReboot,
    SetOutput { on: bool },
    SetTamperAlerts { on: bool },
    SetReportingRate { rate: RateKind, seconds: u32 },
    EraseLog,
}
