//! 🧪 The in-memory transport: a truck that parks in the driveway and takes notes.
//!
//! Every batch it is handed lands in a shared `Vec`, in call order, so tests can
//! look at exactly what would have gone over the wire. It can also be told to
//! fail a destination, which is how the partial-failure tests make one key sad
//! while the others stay happy. The CLI's `--dry-run` uses it too.
//!
//! ⚠️ No network. No retries. No credential. Just heap memory and honesty.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::Transport;
use crate::common::{DestinationKey, QueuedRecord};
use crate::error::TransportError;
use crate::queue::Batch;

/// 📦 One batch, as the transport saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct SentBatch {
    pub destination: DestinationKey,
    pub sequence: u64,
    pub records: Vec<QueuedRecord>,
}

/// 📦 Records batches instead of sending them.
///
/// `Clone` shares the same storage, so a test can keep one handle and give the
/// other to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransport {
    sent: Arc<Mutex<Vec<SentBatch>>>,
    failures: Arc<Mutex<HashMap<DestinationKey, TransportError>>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 💀 Every future batch for `destination` fails with `error`. Failed batches are not recorded.
    pub async fn fail_destination(&self, destination: DestinationKey, error: TransportError) {
        self.failures.lock().await.insert(destination, error);
    }

    /// 🔍 A snapshot of everything delivered so far, in delivery order.
    pub async fn sent(&self) -> Vec<SentBatch> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, destination: &DestinationKey) -> Vec<SentBatch> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|b| &b.destination == destination)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, batch: &Batch) -> Result<(), TransportError> {
        if let Some(err) = self.failures.lock().await.get(batch.destination()) {
            return Err(err.clone());
        }
        debug!(
            destination = %batch.destination(),
            batch_size = batch.len(),
            "🧪 batch recorded in memory"
        );
        self.sent.lock().await.push(SentBatch {
            destination: batch.destination().clone(),
            sequence: batch.sequence(),
            records: batch.records().to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Record;

    #[tokio::test]
    async fn the_one_where_one_key_is_cursed_and_the_other_is_fine() -> anyhow::Result<()> {
        let transport = InMemoryTransport::new();
        let cursed = DestinationKey::fixed("page");
        let fine = DestinationKey::fixed("track");
        let nope = TransportError::Rejected {
            status: 400,
            message: "nope".into(),
        };
        transport.fail_destination(cursed.clone(), nope.clone()).await;

        let records = vec![QueuedRecord::new(Record::new())];
        assert_eq!(
            transport.send(&Batch::new(cursed.clone(), 0, records.clone())).await,
            Err(nope)
        );
        transport.send(&Batch::new(fine.clone(), 1, records)).await?;

        assert!(transport.sent_to(&cursed).await.is_empty());
        assert_eq!(transport.sent_to(&fine).await.len(), 1);
        assert_eq!(transport.sent().await[0].sequence, 1);
        Ok(())
    }
}
