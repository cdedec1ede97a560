// src/net/udp.rs
use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::{self, Duration};
use tracing::{debug, warn};

use crate::drivers::{NetworkLink, SignalInfo};
use crate::errors::BeaconError;

/// Connectionless transport: "connected" means a local socket is bound.
#[derive(Default)]
pub struct UdpLink {
    sock: Option<UdpSocket>,
}

#[async_trait]
impl NetworkLink for UdpLink {
    async fn power_on(&mut self) -> Result<(), BeaconError> {
        Ok(())
    }

    async fn connect(&mut self, timeout: Duration) -> bool {
        match time::timeout(timeout, UdpSocket::bind("0.0.0.0:0")).await {
            Ok(Ok(sock)) => {
                debug!(local = ?sock.local_addr().ok(), "udp: bound");
                self.sock = Some(sock);
                true
            }
            Ok(Err(e)) => {
                warn!(?e, "udp: bind failed");
                false
            }
            Err(_) => {
                warn!("udp: bind timed out");
                false
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.sock.is_some()
    }

    async fn send(&mut self, host: &str, port: u16, bytes: &[u8], timeout: Duration) -> bool {
        let Some(sock) = self.sock.as_ref() else {
            return false;
        };
        match time::timeout(timeout, sock.send_to(bytes, (host, port))).await {
            Ok(Ok(n)) if n == bytes.len() => true,
            Ok(Ok(n)) => {
                warn!(n, len = bytes.len(), "udp: short send");
                false
            }
            Ok(Err(e)) => {
                warn!(?e, host, port, "udp: send error");
                false
            }
            Err(_) => {
                warn!(host, port, "udp: send timed out");
                false
            }
        }
    }

    fn signal_info(&self) -> SignalInfo {
        super::host_signal()
    }
}
