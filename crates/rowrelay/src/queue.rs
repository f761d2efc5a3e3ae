//! 🚦 The batching queue: per-destination buffers that know when to let go.
//!
//! 🎬 COLD OPEN - INT. SORTING FACILITY - NIGHT SHIFT
//!
//! Records arrive one at a time, each wearing a name tag that says `track` or
//! `collection:accounts`. The queue drops each one in the right bin. When a bin
//! reaches `flush_at`, a truck is dispatched in the background and the sorter
//! keeps sorting. At the end of the shift, `flush_all` sends out whatever is
//! left and waits for every truck to come home.
//!
//! ```text
//!   enqueue(key, rec) ──▶ [lane: key] pending ▓▓▓▓░░ ──(len ≥ flush_at)──▶ spawn ──▶ Transport
//!                                       tail ◀──────── done signal ◀──────────────┘
//! ```
//!
//! 🧠 Knowledge graph:
//! - One [`BatchQueue`] is owned by one task. `&mut self` everywhere, no locks.
//! - Deliveries run on spawned tokio tasks. Each one waits for its predecessor on
//!   the same key before it calls the transport, so a key's batches go out in the
//!   order they were formed. Different keys do not wait on each other.
//! - A batch is at most `flush_at` records, never empty, never merged.
//! - Every enqueued record's completion (if it brought one) hears exactly one verdict:
//!   the verdict of the batch it rode in.
//! - Finished deliveries are reaped into the settled reports whenever a new batch
//!   is formed, so a long-lived queue only tracks what is still on the road.
//! - The queue never retries and never re-enqueues. That is the transport's department.
//!
//! 🦆

mod batch;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::common::{DestinationKey, QueuedRecord};
use crate::error::{QueueError, TransportError};
use crate::transport::Transport;

pub use batch::{
    Batch, BatchReport, Completion, CompletionHandle, DeliveryOutcome, PendingItem, completion,
};

pub const DEFAULT_FLUSH_AT: usize = 100;

/// 🛣️ One destination's buffer plus its deliveries still on the road.
#[derive(Debug, Default)]
struct Lane {
    pending: VecDeque<PendingItem>,
    in_flight: Vec<InFlight>,
    /// Fires when the most recently spawned delivery for this key has finished.
    tail: Option<oneshot::Receiver<()>>,
}

#[derive(Debug)]
struct InFlight {
    destination: DestinationKey,
    sequence: u64,
    size: usize,
    handle: JoinHandle<BatchReport>,
}

/// 🚦 Per-destination batching in front of a shared [`Transport`].
#[derive(Debug)]
pub struct BatchQueue<T: Transport + 'static> {
    transport: Arc<T>,
    flush_at: usize,
    lanes: HashMap<DestinationKey, Lane>,
    /// First-touch order of destinations, so `flush_all` is deterministic.
    order: Vec<DestinationKey>,
    next_sequence: u64,
    /// Reports from awaited `flush` calls, handed over by the next `flush_all`.
    settled: Vec<BatchReport>,
}

impl<T: Transport + 'static> BatchQueue<T> {
    /// 🚀 `flush_at` of 0 is treated as 1. A batch of nothing is not a batch.
    pub fn new(transport: Arc<T>, flush_at: usize) -> Self {
        Self {
            transport,
            flush_at: flush_at.max(1),
            lanes: HashMap::new(),
            order: Vec::new(),
            next_sequence: 0,
            settled: Vec::new(),
        }
    }

    pub fn flush_at(&self) -> usize {
        self.flush_at
    }

    /// 📥 Buffer one record. Reaching `flush_at` starts a background flush; this never awaits I/O.
    ///
    /// # Panics
    /// The background flush is a `tokio::spawn`, so reaching `flush_at` outside a
    /// Tokio runtime panics. The same goes for [`BatchQueue::start_flush`].
    pub fn enqueue(
        &mut self,
        destination: DestinationKey,
        record: QueuedRecord,
        completion: Option<Completion>,
    ) {
        if !self.lanes.contains_key(&destination) {
            debug!(destination = %destination, "🆕 new destination buffer");
            self.order.push(destination.clone());
        }
        let lane = self.lanes.entry(destination.clone()).or_default();
        lane.pending.push_back(PendingItem { record, completion });
        let pending = lane.pending.len();
        trace!(destination = %destination, pending, "📥 record buffered");

        if pending >= self.flush_at {
            debug!(
                destination = %destination,
                pending,
                flush_at = self.flush_at,
                "🚚 buffer full, flushing in the background"
            );
            self.start_flush(&destination);
        }
    }

    /// 🚚 Form one batch from the front of the buffer and dispatch it without waiting.
    /// Returns `false` when there was nothing to send.
    ///
    /// # Panics
    /// Outside a Tokio runtime, when there is something to send.
    pub fn start_flush(&mut self, destination: &DestinationKey) -> bool {
        self.spawn_batch(destination).is_some()
    }

    /// ⏳ Form one batch and wait for its verdict. An empty buffer is an instant `Ok(0)`.
    ///
    /// Anything beyond `flush_at` stays buffered. The returned count is the batch size.
    pub async fn flush(&mut self, destination: &DestinationKey) -> Result<usize, TransportError> {
        let Some(sequence) = self.spawn_batch(destination) else {
            return Ok(0);
        };
        let in_flight = self.lanes.get_mut(destination).and_then(|lane| {
            let index = lane.in_flight.iter().position(|f| f.sequence == sequence)?;
            Some(lane.in_flight.remove(index))
        });
        let Some(in_flight) = in_flight else {
            return Err(TransportError::Aborted(format!(
                "batch {sequence} for '{destination}' vanished before it could be awaited"
            )));
        };

        let report = settle(in_flight).await;
        let result = report.outcome.clone().map(|()| report.size);
        self.settled.push(report);
        result
    }

    /// 🏁 Flush every buffer to empty and wait for every delivery, automatic or forced.
    ///
    /// Returns the reports of every batch not yet handed out by a previous
    /// `flush_all`, ordered by formation sequence. One key failing does not stop the rest.
    pub async fn flush_all(&mut self) -> Vec<BatchReport> {
        for destination in self.order.clone() {
            while self.spawn_batch(&destination).is_some() {}
        }

        let in_flight: Vec<InFlight> = self
            .lanes
            .values_mut()
            .flat_map(|lane| lane.in_flight.drain(..))
            .collect();
        let finished = futures::future::join_all(in_flight.into_iter().map(settle)).await;

        let mut reports = std::mem::take(&mut self.settled);
        reports.extend(finished);
        reports.sort_by_key(|r| r.sequence);
        reports
    }

    /// 🗑️ Shut the queue. Anything still buffered is reported as undelivered and dropped.
    ///
    /// Call [`BatchQueue::flush_all`] first. Deliveries already spawned keep running.
    pub fn close(mut self) -> Result<(), QueueError> {
        let leftover = self.order.iter().find_map(|destination| {
            let count = self.lanes.get(destination).map_or(0, |lane| lane.pending.len());
            (count > 0).then(|| QueueError::Undelivered {
                destination: destination.clone(),
                count,
            })
        });
        for lane in self.lanes.values_mut() {
            lane.pending.clear();
        }
        match leftover {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn pending_len(&self, destination: &DestinationKey) -> usize {
        self.lanes.get(destination).map_or(0, |lane| lane.pending.len())
    }

    /// Deliveries for this key that have been spawned and have not finished yet.
    pub fn in_flight(&self, destination: &DestinationKey) -> usize {
        self.lanes.get(destination).map_or(0, |lane| {
            lane.in_flight.iter().filter(|f| !f.handle.is_finished()).count()
        })
    }

    /// Every destination seen so far, in first-enqueue order.
    pub fn destinations(&self) -> &[DestinationKey] {
        &self.order
    }

    fn spawn_batch(&mut self, destination: &DestinationKey) -> Option<u64> {
        let lane = self.lanes.get_mut(destination)?;
        if lane.pending.is_empty() {
            return None;
        }

        // -- 🧹 deliveries that already came home hand their reports over now, not at flush_all
        reap_finished(lane, &mut self.settled);

        // -- ✂️ cut at most flush_at records off the front; the rest wait for the next truck
        let take = self.flush_at.min(lane.pending.len());
        let (records, completions): (Vec<QueuedRecord>, Vec<Option<Completion>>) = lane
            .pending
            .drain(..take)
            .map(|item| (item.record, item.completion))
            .unzip();

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let batch = Batch::new(destination.clone(), sequence, records);
        let size = batch.len();

        // -- ⛓️ this batch becomes the new tail; it waits for whoever was the tail before it
        let (done_tx, done_rx) = oneshot::channel();
        let predecessor = lane.tail.replace(done_rx);
        let transport = Arc::clone(&self.transport);
        debug!(
            destination = %destination,
            batch_size = size,
            sequence,
            remaining = lane.pending.len(),
            "📦 batch formed"
        );

        let handle = tokio::spawn(async move {
            if let Some(predecessor) = predecessor {
                // -- ⛓️ a predecessor that died without signalling still counts as done
                let _ = predecessor.await;
            }
            // -- 📡 exactly one call, retries are the transport's business
            let outcome = transport.send(&batch).await;
            match &outcome {
                Ok(()) => trace!(
                    destination = %batch.destination(),
                    batch_size = batch.len(),
                    sequence,
                    "✅ batch delivered"
                ),
                Err(err) => warn!(
                    destination = %batch.destination(),
                    batch_size = batch.len(),
                    sequence,
                    error = %err,
                    "💀 batch delivery failed"
                ),
            }
            // -- 📣 everyone who rode in this batch hears the same verdict, then the next batch may go
            for completion in completions.into_iter().flatten() {
                let _ = completion.send(outcome.clone());
            }
            let _ = done_tx.send(());
            BatchReport {
                destination: batch.destination().clone(),
                sequence,
                size,
                outcome,
            }
        });

        lane.in_flight.push(InFlight {
            destination: destination.clone(),
            sequence,
            size,
            handle,
        });
        Some(sequence)
    }
}

impl<T: Transport + 'static> Drop for BatchQueue<T> {
    fn drop(&mut self) {
        for (destination, lane) in &self.lanes {
            if !lane.pending.is_empty() {
                warn!(
                    destination = %destination,
                    count = lane.pending.len(),
                    "🗑️ queue dropped with records still buffered; they will never be sent"
                );
            }
        }
    }
}

async fn settle(in_flight: InFlight) -> BatchReport {
    let InFlight {
        destination,
        sequence,
        size,
        handle,
    } = in_flight;
    match handle.await {
        Ok(report) => report,
        Err(join_error) => aborted(destination, sequence, size, join_error),
    }
}

/// 🧹 Move finished deliveries out of the lane and their reports into `settled`.
fn reap_finished(lane: &mut Lane, settled: &mut Vec<BatchReport>) {
    let mut still_running = Vec::with_capacity(lane.in_flight.len());
    for mut in_flight in lane.in_flight.drain(..) {
        if !in_flight.handle.is_finished() {
            still_running.push(in_flight);
            continue;
        }
        match (&mut in_flight.handle).now_or_never() {
            Some(Ok(report)) => settled.push(report),
            Some(Err(join_error)) => settled.push(aborted(
                in_flight.destination,
                in_flight.sequence,
                in_flight.size,
                join_error,
            )),
            None => still_running.push(in_flight),
        }
    }
    lane.in_flight = still_running;
}

fn aborted(
    destination: DestinationKey,
    sequence: u64,
    size: usize,
    join_error: tokio::task::JoinError,
) -> BatchReport {
    BatchReport {
        destination,
        sequence,
        size,
        outcome: Err(TransportError::Aborted(join_error.to_string())),
    }
}
