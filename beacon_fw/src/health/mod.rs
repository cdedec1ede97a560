// src/health/mod.rs
pub mod watchdog;
