// src/net/offline.rs
use async_trait::async_trait;
use tokio::time::Duration;

use crate::drivers::{NetworkLink, SignalInfo};
use crate::errors::BeaconError;

/// Bench link: never attaches, so the controller settles into logging-only.
pub struct OfflineLink;

#[async_trait]
impl NetworkLink for OfflineLink {
    async fn power_on(&mut self) -> Result<(), BeaconError> {
        Err(BeaconError::Driver { driver: "offline", reason: "no radio fitted".into() })
    }

    async fn connect(&mut self, _timeout: Duration) -> bool {
        false
    }

    fn is_connected(&self) -> bool {
        false
    }

    async fn send(&mut self, _host: &str, _port: u16, _bytes: &[u8], _timeout: Duration) -> bool {
        false
    }

    fn signal_info(&self) -> SignalInfo {
        SignalInfo::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn never_comes_up() {
        let mut link = OfflineLink;
        assert!(matches!(link.power_on().await, Err(BeaconError::Driver { driver: "offline", .. })));
        assert!(!link.connect(Duration::from_millis(1)).await);
        assert!(!link.send("localhost", 4509, &[0u8; 4], Duration::from_millis(1)).await);
    }
}
