// src/net/tcp.rs
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, lookup_host};
use tokio::time::{self, Duration};
use tracing::{debug, warn};

use crate::drivers::{NetworkLink, SignalInfo};
use crate::errors::BeaconError;

// Resolved on connect() so "attached" means name resolution works.
const ATTACH_CHECK_HOST: &str = "localhost:0";

/// One short-lived TCP connection per message, as the modem does it.
#[derive(Default)]
pub struct TcpLink {
    attached: bool,
}

#[async_trait]
impl NetworkLink for TcpLink {
    async fn power_on(&mut self) -> Result<(), BeaconError> {
        Ok(())
    }

    async fn connect(&mut self, timeout: Duration) -> bool {
        self.attached = matches!(time::timeout(timeout, lookup_host(ATTACH_CHECK_HOST)).await, Ok(Ok(_)));
        if !self.attached {
            warn!("tcp: network attach failed");
        }
        self.attached
    }

    fn is_connected(&self) -> bool {
        self.attached
    }

    async fn send(&mut self, host: &str, port: u16, bytes: &[u8], timeout: Duration) -> bool {
        if !self.attached {
            return false;
        }
        let attempt = async {
            let mut stream = TcpStream::connect((host, port)).await?;
            stream.write_all(bytes).await?;
            stream.shutdown().await
        };
        match time::timeout(timeout, attempt).await {
            Ok(Ok(())) => {
                debug!(host, port, len = bytes.len(), "tcp: delivered");
                true
            }
            Ok(Err(e)) => {
                warn!(?e, host, port, "tcp: send error");
                false
            }
            Err(_) => {
                warn!(host, port, "tcp: send timed out");
                false
            }
        }
    }

    fn signal_info(&self) -> SignalInfo {
        super::host_signal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn delivers_whole_message() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            sock.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let mut link = TcpLink::default();
        assert!(link.connect(Duration::from_secs(5)).await);
        assert!(link.send("127.0.0.1", port, &[0x55; 149], Duration::from_secs(5)).await);
        assert_eq!(server.await.unwrap().len(), 149);
    }

    #[tokio::test]
    async fn refused_connection_is_a_failed_send() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut link = TcpLink::default();
        assert!(link.connect(Duration::from_secs(5)).await);
        assert!(!link.send("127.0.0.1", port, &[0u8; 149], Duration::from_secs(5)).await);
    }
}
