//! Update Buffer Module
//!
//! Bounded multi-producer queue of access records feeding the frequency
//! sketch off the read/write hot path.
//!
//! Producers never wait: a full queue drops the record. The single consumer
//! end (`UpdateDrain`) is owned by the policy and only drained under its lock.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

// == Update Record ==
/// What produced an update record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Hit,
    Set,
}

/// One buffered access, discarded once applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRecord {
    pub kind: UpdateKind,
    pub key_hash: u64,
    pub cost: i64,
}

// == Update Buffer ==
/// Producer side of the update queue.
#[derive(Debug)]
pub struct UpdateBuffer {
    tx: mpsc::Sender<UpdateRecord>,
    capacity: usize,
}

/// Consumer side of the update queue.
#[derive(Debug)]
pub struct UpdateDrain {
    rx: mpsc::Receiver<UpdateRecord>,
}

impl UpdateBuffer {
    // == Constructor ==
    /// Creates a queue holding at most `capacity` records.
    pub fn new(capacity: usize) -> (Self, UpdateDrain) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, capacity }, UpdateDrain { rx })
    }

    /// Queues a read of `key_hash`; false if the record was dropped.
    pub fn record_hit(&self, key_hash: u64) -> bool {
        self.push(UpdateRecord {
            kind: UpdateKind::Hit,
            key_hash,
            cost: 0,
        })
    }

    /// Queues a write of `key_hash`; false if the record was dropped.
    pub fn record_set(&self, key_hash: u64, cost: i64) -> bool {
        self.push(UpdateRecord {
            kind: UpdateKind::Set,
            key_hash,
            cost,
        })
    }

    fn push(&self, record: UpdateRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                trace!(key_hash = dropped.key_hash, "update buffer full, dropping record");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Records currently queued.
    pub fn pending(&self) -> usize {
        self.capacity - self.tx.capacity()
    }
}

impl UpdateDrain {
    // == Drain ==
    /// Hands every queued record to `apply` without waiting for new ones.
    ///
    /// Returns how many records were drained.
    pub fn drain<F: FnMut(UpdateRecord)>(&mut self, mut apply: F) -> usize {
        let mut drained = 0;
        while let Ok(record) = self.rx.try_recv() {
            apply(record);
            drained += 1;
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_are_drained() {
        let (buffer, mut drain) = UpdateBuffer::new(8);
        assert!(buffer.record_hit(1));
        assert!(buffer.record_set(2, 10));
        assert_eq!(buffer.pending(), 2);

        let mut seen = Vec::new();
        assert_eq!(drain.drain(|record| seen.push(record)), 2);
        assert_eq!(seen[0].kind, UpdateKind::Hit);
        assert_eq!(seen[1].kind, UpdateKind::Set);
        assert_eq!(seen[1].cost, 10);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_full_buffer_drops_records() {
        let (buffer, mut drain) = UpdateBuffer::new(2);
        assert!(buffer.record_hit(1));
        assert!(buffer.record_hit(2));
        assert!(!buffer.record_hit(3));

        assert_eq!(drain.drain(|_| {}), 2);
        assert!(buffer.record_hit(4));
    }

    #[test]
    fn test_drain_empty() {
        let (_buffer, mut drain) = UpdateBuffer::new(4);
        assert_eq!(drain.drain(|_| {}), 0);
    }

    #[test]
    fn test_concurrent_producers() {
        let (buffer, mut drain) = UpdateBuffer::new(1024);
        std::thread::scope(|scope| {
            for t in 0..4u64 {
                let buffer = &buffer;
                scope.spawn(move || {
                    for i in 0..100 {
                        buffer.record_hit(t * 1000 + i);
                    }
                });
            }
        });
        assert_eq!(drain.drain(|_| {}), 400);
    }
}
