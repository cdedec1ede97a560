// src/errors.rs: thiserror-based error types
use cinet_protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BeaconError {
    #[error("IO: {0}")] Io(#[from] std::io::Error),
    #[error("Protocol: {0}")] Protocol(#[from] ProtocolError),
    #[error("Config: {0}")] Config(#[from] config::ConfigError),
    #[error("Config encode: {0}")] Toml(#[from] toml::ser::Error),
    #[error("Driver {driver}: {reason}")] Driver { driver: &'static str, reason: String },
    #[error("Logging: {0}")] Logging(String),
}
