//! Low-overhead event chronicle for long-running agent simulations.
//!
//! Producers log pipeline stages (stimulus, meaning, decision, action,
//! feedback) through a non-blocking ring buffer; one background worker
//! batches entries to newline-delimited JSON with size-based rotation.
//! Under overload the oldest entries are dropped and counted —
//! observation must never perturb or crash the observed system.

pub mod chain;
pub mod config;
pub mod entry;
pub mod error;
pub mod ring;
pub mod writer;

pub use chain::ChainLogger;
pub use config::{ChainConfig, WriterConfig};
pub use entry::{LogEntry, Stage};
pub use error::ChronicleError;
pub use ring::{RingBuffer, RingStats};
pub use writer::{AsyncLogWriter, WriterStats};
