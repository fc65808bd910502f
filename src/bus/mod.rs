//! Message bus intake and publishing
//!
//! The consumer joins a queue group so replicas share the event stream;
//! the publisher drains an in-process queue onto the outbound topic
//! with bounded retries.

mod consumer;
mod publisher;

pub use consumer::Consumer;
pub use publisher::{validate_signal, ChannelSink, Publisher, PublisherHandle};

use crate::signal::TradeSignal;
use async_trait::async_trait;

/// Outbound publish failure
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("publisher queue closed")]
    QueueClosed,
    #[error("signal failed validation: {0}")]
    Invalid(String),
    #[error("bus publish failed: {0}")]
    Bus(String),
}

/// Destination for adapted signals.
///
/// The engine is fire-and-forget against this seam: the production
/// implementation enqueues onto the bus publisher, tests capture
/// signals on a channel.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn submit(&self, signal: TradeSignal) -> Result<(), PublishError>;
}
