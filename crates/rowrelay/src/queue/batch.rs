//! 📦 Batches, pending items, and the little envelopes that carry outcomes back.

use tokio::sync::oneshot;

use crate::common::{DestinationKey, QueuedRecord};
use crate::error::TransportError;

/// ✅ or 💀: what one batch delivery came to. Every item in the batch gets the same one.
pub type DeliveryOutcome = Result<(), TransportError>;

/// 📬 The sending half of a per-record completion. Resolved exactly once.
pub type Completion = oneshot::Sender<DeliveryOutcome>;

/// 🎟️ The receiving half: await it to learn how the record's batch fared.
#[derive(Debug)]
pub struct CompletionHandle(oneshot::Receiver<DeliveryOutcome>);

impl CompletionHandle {
    /// Waits for the batch outcome. `None` means the delivery task died without reporting.
    pub async fn wait(self) -> Option<DeliveryOutcome> {
        self.0.await.ok()
    }

    /// Non-blocking peek: `None` while the batch is still buffered or in flight.
    pub fn try_outcome(&mut self) -> Option<DeliveryOutcome> {
        self.0.try_recv().ok()
    }
}

/// 🔗 A fresh completion pair for [`crate::queue::BatchQueue::enqueue`].
pub fn completion() -> (Completion, CompletionHandle) {
    let (tx, rx) = oneshot::channel();
    (tx, CompletionHandle(rx))
}

/// ⏳ One record waiting in a destination buffer, plus whoever wants to hear about it.
#[derive(Debug)]
pub struct PendingItem {
    pub record: QueuedRecord,
    pub completion: Option<Completion>,
}

/// 📦 An immutable, ordered slice of one destination's buffer, sent as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    destination: DestinationKey,
    sequence: u64,
    records: Vec<QueuedRecord>,
}

impl Batch {
    pub fn new(destination: DestinationKey, sequence: u64, records: Vec<QueuedRecord>) -> Self {
        Self {
            destination,
            sequence,
            records,
        }
    }

    pub fn destination(&self) -> &DestinationKey {
        &self.destination
    }

    /// Queue-wide formation order. Strictly increasing per destination.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn records(&self) -> &[QueuedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// 📋 What happened to one batch, for the pipeline's roll-up.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub destination: DestinationKey,
    pub sequence: u64,
    pub size: usize,
    pub outcome: DeliveryOutcome,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Record;

    #[tokio::test]
    async fn the_one_where_a_completion_delivers_exactly_what_was_sent() {
        let (tx, handle) = completion();
        tx.send(Err(TransportError::Encode("nope".into())))
            .expect("💀 receiver should still be listening");
        assert_eq!(handle.wait().await, Some(Err(TransportError::Encode("nope".into()))));
    }

    #[tokio::test]
    async fn the_one_where_a_dropped_sender_means_no_news() {
        let (tx, mut handle) = completion();
        assert_eq!(handle.try_outcome(), None);
        drop(tx);
        assert_eq!(handle.wait().await, None);
    }

    #[test]
    fn the_one_where_batches_remember_where_they_came_from() {
        let batch = Batch::new(
            DestinationKey::fixed("track"),
            7,
            vec![QueuedRecord::new(Record::new()), QueuedRecord::new(Record::new())],
        );
        assert_eq!(batch.destination().as_str(), "track");
        assert_eq!(batch.sequence(), 7);
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
    }
}
