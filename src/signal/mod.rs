//! Signal generation and adaptation
//!
//! Strategies emit the internal [`Signal`]; the [`adapter`] is the sole
//! place where it is transformed into the wire contract consumed by the
//! execution engine.

pub mod adapter;
mod types;

pub use adapter::{SignalAdapter, TradeSignal};
pub use types::{
    ConfigProvenance, Signal, SignalAction, SignalConfidence, SignalType,
};
