use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::{json, Map, Value};

use crate::config::ChainConfig;
use crate::entry::Stage;
use crate::error::ChronicleError;
use crate::writer::{AsyncLogWriter, WriterStats};

/// Correlation counters wrap here so ids stay short over very long runs.
const CHAIN_ID_WRAP: u64 = 1_000_000_000;

/// Causal-chain API over the writer: one correlation id threads every
/// record produced while a single stimulus moves through
/// event -> meaning -> decision -> action -> feedback.
///
/// This layer is a pure observer of the pipeline. It must never be read
/// back by decision logic, and none of its methods may panic or block on
/// I/O — a slow disk is the worker's problem, not the producer's.
pub struct ChainLogger {
    writer: AsyncLogWriter,
    detailed: bool,
    tick_sample_interval: u64,
    chain_counter: Mutex<u64>,
    tick_calls: AtomicU64,
}

impl ChainLogger {
    pub fn new(config: ChainConfig) -> Result<Self, ChronicleError> {
        let writer = AsyncLogWriter::new(config.writer)?;
        Ok(Self {
            writer,
            detailed: config.detailed,
            tick_sample_interval: config.tick_sample_interval.max(1),
            chain_counter: Mutex::new(0),
            tick_calls: AtomicU64::new(0),
        })
    }

    /// Allocation and formatting happen under one lock so concurrent
    /// producers never observe interleaved or duplicate ids.
    fn next_chain_id(&self) -> String {
        let mut counter = self
            .chain_counter
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *counter = (*counter + 1) % CHAIN_ID_WRAP;
        format!("chain_{}", *counter)
    }

    /// Records a stimulus entering the pipeline and returns the
    /// correlation id to thread through the later stages. When the
    /// caller supplies no id a fresh `chain_<n>` is allocated. The id is
    /// returned even when detailed logging is off, so chains stay
    /// threadable while the stage entries themselves are suppressed.
    pub fn log_event(
        &self,
        event_id: Option<String>,
        correlation_id: Option<String>,
        data: Map<String, Value>,
    ) -> String {
        let id = correlation_id.unwrap_or_else(|| self.next_chain_id());
        if self.detailed {
            self.writer
                .write_entry(Stage::Event.as_str(), Some(id.clone()), event_id, data);
        }
        id
    }

    /// Derived-meaning stage. No-op (not even buffered) unless detailed
    /// logging is on.
    pub fn log_meaning(&self, correlation_id: &str, data: Map<String, Value>) {
        self.log_stage(Stage::Meaning, correlation_id, data);
    }

    /// Decision stage. Same gating as `log_meaning`.
    pub fn log_decision(&self, correlation_id: &str, data: Map<String, Value>) {
        self.log_stage(Stage::Decision, correlation_id, data);
    }

    /// Action stage. Same gating as `log_meaning`.
    pub fn log_action(&self, correlation_id: &str, data: Map<String, Value>) {
        self.log_stage(Stage::Action, correlation_id, data);
    }

    fn log_stage(&self, stage: Stage, correlation_id: &str, data: Map<String, Value>) {
        if !self.detailed {
            return;
        }
        self.writer
            .write_entry(stage.as_str(), Some(correlation_id.to_string()), None, data);
    }

    /// Feedback is the outcome signal and is always recorded, never
    /// sampled away and never gated by the detailed flag.
    pub fn log_feedback(&self, correlation_id: &str, data: Map<String, Value>) {
        self.writer
            .write_entry(Stage::Feedback.as_str(), Some(correlation_id.to_string()), None, data);
    }

    /// Sampled: emits one entry per `tick_sample_interval` calls.
    pub fn log_tick_start(&self, tick_number: u64, queue_size: usize) {
        let calls = self.tick_calls.fetch_add(1, Ordering::Relaxed) + 1;
        if calls % self.tick_sample_interval != 0 {
            return;
        }
        let mut data = Map::new();
        data.insert("tick_number".to_string(), json!(tick_number));
        data.insert("queue_size".to_string(), json!(queue_size));
        self.writer
            .write_entry(Stage::TickStart.as_str(), None, None, data);
    }

    /// Always emits a single raw counter, no derived timing.
    pub fn log_tick_end(&self, tick_number: u64) {
        let mut data = Map::new();
        data.insert("tick_number".to_string(), json!(tick_number));
        self.writer
            .write_entry(Stage::TickEnd.as_str(), None, None, data);
    }

    /// Always emits, carrying the error type, message and the stage that
    /// failed.
    pub fn log_error<E: std::fmt::Display>(
        &self,
        stage: &str,
        error: &E,
        correlation_id: Option<&str>,
    ) {
        let mut data = Map::new();
        data.insert("stage".to_string(), json!(stage));
        data.insert("error_type".to_string(), json!(short_type_name::<E>()));
        data.insert("error".to_string(), json!(error.to_string()));
        self.writer.write_entry(
            Stage::Error.as_str(),
            correlation_id.map(str::to_string),
            None,
            data,
        );
    }

    pub fn flush(&self) {
        self.writer.flush();
    }

    pub async fn shutdown(&self) {
        self.writer.shutdown().await;
    }

    pub fn stats(&self) -> WriterStats {
        self.writer.stats()
    }

    pub fn writer(&self) -> &AsyncLogWriter {
        &self.writer
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::short_type_name;

    #[test]
    fn type_names_are_trimmed_to_last_segment() {
        assert_eq!(short_type_name::<String>(), "String");
        assert_eq!(short_type_name::<std::io::Error>(), "Error");
    }
}
