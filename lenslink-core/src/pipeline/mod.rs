//! Streaming pipeline: worker loops, session orchestration, stats.

pub mod recv;
pub mod send;
pub mod session;
pub mod stats;

pub use session::{InboundLeg, OutboundLeg, SessionConfig, SessionEvent, StreamSession};
pub use stats::{CounterSnapshot, StreamCounters, ThroughputEstimator};
