// src/net/mod.rs
pub mod offline;
pub mod tcp;
pub mod udp;

use crate::config::{NetworkKind, Settings};
use crate::drivers::NetworkLink;

/// Pick the transport once at startup.
pub fn build_link(settings: &Settings) -> Box<dyn NetworkLink> {
    match settings.network {
        NetworkKind::Tcp => Box::new(tcp::TcpLink::default()),
        NetworkKind::Udp => Box::new(udp::UdpLink::default()),
        NetworkKind::Offline => Box::new(offline::OfflineLink),
    }
}

/// Host links have no radio to report on.
pub(crate) fn host_signal() -> crate::drivers::SignalInfo {
    crate::drivers::SignalInfo {
        rssi_dbm: 0,
        lac: None,
        cell_id: None,
        access_technology: 0,
    }
}
