//! 🚀 The pipeline: one file, start to finish.
//!
//! ```text
//!   source name ──▶ classify ──┐
//!   rows ──────────────────────┴─▶ transform each ──▶ enqueue ──▶ flush_all ──▶ FileReport
//!                                      └─▶ RowFailure (skipped, reported)
//! ```
//!
//! Every call builds its own [`BatchQueue`]. The only thing files share is the
//! transport, passed in as an `Arc`, never reached for globally.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::classify::{Classification, EventKind, classify};
use crate::common::{DestinationKey, QueuedRecord, RawRow};
use crate::decoders::decode_csv;
use crate::error::{DeliveryFailure, PipelineError, RowFailure};
use crate::queue::{BatchQueue, BatchReport, DEFAULT_FLUSH_AT};
use crate::transforms::{transform_object_row, transform_row};
use crate::transport::Transport;

/// 📋 What happened to one file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub source_name: String,
    pub kind: EventKind,
    pub destination: DestinationKey,
    pub rows_read: usize,
    pub rows_enqueued: usize,
    pub row_failures: Vec<RowFailure>,
    /// Every batch formed for this file, in formation order.
    pub batches: Vec<BatchReport>,
}

impl FileReport {
    pub fn batches_delivered(&self) -> usize {
        self.batches.iter().filter(|b| b.is_success()).count()
    }

    pub fn delivery_failures(&self) -> Vec<DeliveryFailure> {
        self.batches
            .iter()
            .filter_map(|b| {
                b.outcome.as_ref().err().map(|error| DeliveryFailure {
                    destination: b.destination.clone(),
                    batch_size: b.size,
                    error: error.clone(),
                })
            })
            .collect()
    }

    /// ✅ Every row made it into a batch and every batch landed.
    pub fn is_success(&self) -> bool {
        self.row_failures.is_empty() && self.batches.iter().all(BatchReport::is_success)
    }

    /// 🎯 Collapse into a verdict. Delivery failures outrank rejected rows.
    pub fn into_result(self) -> Result<FileReport, PipelineError> {
        let deliveries = self.delivery_failures();
        if !deliveries.is_empty() {
            return Err(PipelineError::Delivery(deliveries));
        }
        if !self.row_failures.is_empty() {
            return Err(PipelineError::Rows(self.row_failures));
        }
        Ok(self)
    }
}

/// 🚀 Relays files through a shared transport.
#[derive(Debug)]
pub struct Pipeline<T: Transport + 'static> {
    transport: Arc<T>,
    flush_at: usize,
}

impl<T: Transport + 'static> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            flush_at: self.flush_at,
        }
    }
}

impl<T: Transport + 'static> Pipeline<T> {
    pub fn new(transport: Arc<T>, flush_at: usize) -> Self {
        Self {
            transport,
            flush_at: flush_at.max(1),
        }
    }

    pub fn with_default_flush(transport: Arc<T>) -> Self {
        Self::new(transport, DEFAULT_FLUSH_AT)
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// 📄 Decode a CSV blob, then relay its rows. Classification is checked before
    /// decoding so a misnamed file never costs a parse.
    pub async fn relay_bytes(
        &self,
        source_name: &str,
        bytes: &[u8],
    ) -> Result<FileReport, PipelineError> {
        let classification = classify(source_name)?;
        let rows = decode_csv(bytes)?;
        debug!(source = source_name, rows = rows.len(), "📄 decoded");
        self.run(source_name, classification, &rows).await
    }

    /// 🚚 Classify, transform, enqueue, flush. Only an unroutable name fails outright;
    /// rejected rows and failed batches are in the report.
    pub async fn relay(
        &self,
        source_name: &str,
        rows: &[RawRow],
    ) -> Result<FileReport, PipelineError> {
        let classification = classify(source_name)?;
        self.run(source_name, classification, rows).await
    }

    async fn run(
        &self,
        source_name: &str,
        classification: Classification,
        rows: &[RawRow],
    ) -> Result<FileReport, PipelineError> {
        let destination = classification.destination();
        debug!(
            source = source_name,
            kind = %classification.kind,
            destination = %destination,
            "🏷️ classified"
        );

        // -- 🚦 a fresh queue per file; only the transport is shared
        let mut queue = BatchQueue::new(Arc::clone(&self.transport), self.flush_at);
        let mut row_failures = Vec::new();
        let mut rows_enqueued = 0;

        // -- 🔄 transform and enqueue; full buffers start flushing while we keep going
        for (index, row) in rows.iter().enumerate() {
            let transformed = match classification.kind {
                EventKind::Object => transform_object_row(row),
                _ => transform_row(row).map(QueuedRecord::new),
            };
            match transformed {
                Ok(record) => {
                    queue.enqueue(destination.clone(), record, None);
                    rows_enqueued += 1;
                }
                Err(error) => {
                    // -- 🚫 one bad row is skipped and written down, the file carries on
                    warn!(source = source_name, row = index + 1, error = %error, "🚫 row rejected");
                    row_failures.push(RowFailure {
                        row: index + 1,
                        error,
                    });
                }
            }
        }

        // -- 🏁 drain the leftovers and wait for every truck, then lock up
        let batches = queue.flush_all().await;
        queue.close()?;

        let report = FileReport {
            source_name: source_name.to_string(),
            kind: classification.kind,
            destination,
            rows_read: rows.len(),
            rows_enqueued,
            row_failures,
            batches,
        };
        if report.is_success() {
            info!(
                source = source_name,
                rows = report.rows_read,
                batches = report.batches.len(),
                "✅ file relayed"
            );
        } else {
            error!(
                source = source_name,
                rows = report.rows_read,
                rejected_rows = report.row_failures.len(),
                failed_batches = report.batches.len() - report.batches_delivered(),
                "💀 file relayed with failures"
            );
        }
        Ok(report)
    }
}
