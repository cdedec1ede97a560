// src/irq.rs
//! Interrupt-side state. Producers only set flags or push events; the
//! controller drains everything once per tick.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam::queue::ArrayQueue;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    Input,
    ExternalPower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoEvent {
    pub kind: IoKind,
    pub value: bool,
}

pub struct InterruptFlags {
    motion: AtomicBool,
    tamper: AtomicBool,
    events: ArrayQueue<IoEvent>,
    dropped: AtomicU64,
}

impl InterruptFlags {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            motion: AtomicBool::new(false),
            tamper: AtomicBool::new(false),
            events: ArrayQueue::new(queue_depth.max(1)),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn raise_motion(&self) {
        self.motion.store(true, Ordering::Release);
    }

    pub fn raise_tamper(&self) {
        self.tamper.store(true, Ordering::Release);
    }

    /// A full queue drops the event and counts it.
    pub fn push(&self, event: IoEvent) -> bool {
        match self.events.push(event) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn take_motion(&self) -> bool {
        self.motion.swap(false, Ordering::AcqRel)
    }

    pub fn take_tamper(&self) -> bool {
        self.tamper.swap(false, Ordering::AcqRel)
    }

    /// Everything queued since the last drain, oldest first.
    pub fn drain(&self) -> Vec<IoEvent> {
        let lost = self.dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            warn!(lost, "interrupt queue overflowed");
        }
        std::iter::from_fn(|| self.events.pop()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn flags_are_taken_once() {
        let irq = InterruptFlags::new(4);
        irq.raise_tamper();
        assert!(irq.take_tamper());
        assert!(!irq.take_tamper());
        assert!(!irq.take_motion());
    }

    #[test]
    fn queue_is_bounded_and_fifo() {
        let irq = InterruptFlags::new(2);
        let ev = |value| IoEvent { kind: IoKind::Input, value };
        assert!(irq.push(ev(true)));
        assert!(irq.push(ev(false)));
        assert!(!irq.push(ev(true)));
        assert_eq!(irq.dropped.load(Ordering::Relaxed), 1);
        assert_eq!(irq.drain(), vec![ev(true), ev(false)]);
        assert!(irq.drain().is_empty());
    }

    #[test]
    fn producers_on_other_threads() {
        let irq = Arc::new(InterruptFlags::new(64));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let irq = irq.clone();
                std::thread::spawn(move || {
                    for i in 0..8 {
                        irq.push(IoEvent { kind: IoKind::Input, value: i % 2 == 0 });
                    }
                    irq.raise_motion();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(irq.drain().len(), 32);
        assert!(irq.take_motion());
    }
}
