// src/logging/store.rs
//! Circular in-memory point log. When full, the oldest point is overwritten.
use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::drivers::{LogRecord, LogStore};
use crate::errors::BeaconError;

pub struct MemoryLogStore {
    capacity: usize,
    points: VecDeque<(u64, LogRecord)>,
    next_id: u64,
    overwritten: u64,
}

impl MemoryLogStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            points: VecDeque::with_capacity(capacity.min(4096)),
            next_id: 0,
            overwritten: 0,
        }
    }

    /// Points lost to wrap-around since the last erase.
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }
}

impl LogStore for MemoryLogStore {
    fn append(&mut self, record: LogRecord) -> Result<(), BeaconError> {
        if self.points.len() == self.capacity {
            self.points.pop_front();
            self.overwritten += 1;
            if self.overwritten == 1 || self.overwritten % 1000 == 0 {
                warn!(capacity = self.capacity, overwritten = self.overwritten, "point log full; overwriting oldest");
            }
        }
        self.points.push_back((self.next_id, record));
        self.next_id += 1;
        Ok(())
    }

    fn pending(&self, limit: usize) -> Result<Vec<(u64, LogRecord)>, BeaconError> {
        Ok(self.points.iter().take(limit).cloned().collect())
    }

    fn mark_uploaded(&mut self, ids: &[u64]) -> Result<(), BeaconError> {
        if ids.is_empty() {
            return Ok(());
        }
        let before = self.points.len();
        self.points.retain(|(id, _)| !ids.contains(id));
        debug!(removed = before - self.points.len(), left = self.points.len(), "points uploaded");
        Ok(())
    }

    fn erase(&mut self) -> Result<(), BeaconError> {
        self.points.clear();
        self.overwritten = 0;
        Ok(())
    }

    fn len(&self) -> usize {
        self.points.len()
    }
}
