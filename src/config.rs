use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Writer configuration. Built by an external loader, immutable once the
/// writer is constructed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Active JSONL file. Parent directories are created eagerly.
    pub path: PathBuf,
    /// When false the writer spawns no worker and every write is a no-op.
    pub enabled: bool,
    /// Ring buffer capacity in entries.
    pub buffer_capacity: usize,
    /// Entries drained per batch write.
    pub batch_size: usize,
    /// Worker wake interval in seconds.
    pub flush_interval_secs: f64,
    /// Rotation threshold in megabytes.
    pub max_file_size_mb: f64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("logs/agent_events.jsonl"),
            enabled: true,
            buffer_capacity: 10_000,
            batch_size: 100,
            flush_interval_secs: 1.0,
            max_file_size_mb: 50.0,
        }
    }
}

impl WriterConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs_f64(self.flush_interval_secs.max(0.01))
    }

    pub fn max_file_bytes(&self) -> u64 {
        (self.max_file_size_mb.max(0.0) * 1024.0 * 1024.0) as u64
    }
}

/// Chain logger configuration, wrapping the writer it owns.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Gates the event/meaning/decision/action stages. Feedback, errors
    /// and tick counters are recorded regardless.
    pub detailed: bool,
    /// Emit one tick_start entry per this many calls.
    pub tick_sample_interval: u64,
    pub writer: WriterConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            detailed: true,
            tick_sample_interval: 100,
            writer: WriterConfig::default(),
        }
    }
}
