//! 📡 Transport: where a [`Batch`] stops being our problem.
//!
//! 🎬 COLD OPEN - INT. LOADING DOCK - 2:47 AM
//!
//! The queue has done its part. It sorted, it counted, it stacked the boxes by
//! destination. Now somebody has to drive the truck. That somebody implements
//! [`Transport`], takes exactly one batch, makes exactly one trip (plus a few
//! polite retries if the road is closed), and reports back how it went.
//!
//! 🧠 Knowledge graph:
//! - [`Transport`]: the trait. One method. `&self` because many files share one truck.
//! - [`HttpTransport`]: the real deal. One authenticated POST per batch.
//! - [`Retrying`]: wraps any transport, retries transient failures with backoff.
//! - [`InMemoryTransport`]: records batches instead of sending them. Tests and `--dry-run`.
//! - [`TransportBackend`]: the enum the binary hands to the pipeline so it never has to
//!   know which of the above it got.
//! - `payload`: the pure JSON body builder, testable without a server.
//!
//! 🦆

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::queue::Batch;

mod http;
mod in_mem;
pub mod payload;
mod retry;

pub use http::{AuthScheme, HttpTransport, HttpTransportConfig};
pub use in_mem::{InMemoryTransport, SentBatch};
pub use retry::{RetryPolicy, Retrying};

/// 🚚 Delivers one batch. Pure I/O: no buffering, no reordering, no re-enqueueing.
///
/// # Contract
/// - `send` makes the delivery attempt(s) for exactly this batch and returns one verdict.
/// - The same verdict is handed to every record in the batch, so it must be `Clone`.
///   [`TransportError`] is.
/// - Implementations are shared across concurrently running files behind an `Arc`.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn send(&self, batch: &Batch) -> Result<(), TransportError>;
}

/// 🎭 The many faces of a Transport.
///
/// Real HTTP with retries for production, the in-memory recorder for tests and dry
/// runs. The pipeline dispatches through this without caring which one showed up.
#[derive(Debug)]
pub enum TransportBackend {
    Http(Retrying<HttpTransport>),
    InMemory(InMemoryTransport),
}

#[async_trait]
impl Transport for TransportBackend {
    async fn send(&self, batch: &Batch) -> Result<(), TransportError> {
        match self {
            TransportBackend::Http(http) => http.send(batch).await,
            TransportBackend::InMemory(mem) => mem.send(batch).await,
        }
    }
}
