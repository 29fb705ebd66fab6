//! Bounded hand-off between decode producers and the exporter.

use crate::record::Record;
use crossbeam_channel::{Receiver, Sender};
use tracing::warn;

pub const DEFAULT_CAPACITY: usize = 20_000;

pub type RecordReceiver = Receiver<Record>;

/// Producer side of the output queue. Cloned into every decoder.
#[derive(Debug, Clone)]
pub struct RecordSender {
    tx: Sender<Record>,
}

pub fn channel(capacity: usize) -> (RecordSender, RecordReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (RecordSender { tx }, rx)
}

impl RecordSender {
    /// Blocks while the queue is full. Returns false when the consumer is gone
    /// and the record was dropped.
    pub fn enqueue(&self, record: Record) -> bool {
        match self.tx.send(record) {
            Ok(()) => true,
            Err(err) => {
                warn!(record = %err.0, "output queue disconnected, dropping record");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}
