use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WriterConfig;
use crate::entry::LogEntry;
use crate::error::ChronicleError;
use crate::ring::{RingBuffer, RingStats};

/// Bounded wait for the worker to exit before the final flush proceeds
/// anyway. The token is already cancelled at that point, so a late task
/// still exits on its next wake.
const SHUTDOWN_JOIN_WAIT: Duration = Duration::from_secs(2);

/// Pause after a failed batch write before the worker tries again.
const IO_ERROR_BACKOFF: Duration = Duration::from_millis(250);

/// Decouples producer timing from disk I/O. Producers append to the ring
/// and return; exactly one background worker drains batches to the JSONL
/// file on a fixed cadence. Every runtime failure lands in a counter,
/// never on a producer.
#[derive(Debug)]
pub struct AsyncLogWriter {
    shared: Arc<WriterShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug)]
struct WriterShared {
    path: PathBuf,
    enabled: bool,
    batch_size: usize,
    max_file_bytes: u64,
    ring: RingBuffer,
    // Serializes batch writes between the worker and manual flush()
    // callers. The ring mutex orders the queue but not the file.
    file_lock: Mutex<()>,
    stop: CancellationToken,
    started_at: Instant,
    entries_written: AtomicU64,
    entries_lost: AtomicU64,
    batches_written: AtomicU64,
    flush_operations: AtomicU64,
    io_errors: AtomicU64,
    rotations_completed: AtomicU64,
    rotation_errors: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WriterStats {
    pub entries_buffered: usize,
    pub entries_written: u64,
    pub entries_lost: u64,
    pub batches_written: u64,
    pub flush_operations: u64,
    pub io_errors: u64,
    pub rotations_completed: u64,
    pub rotation_errors: u64,
    pub buffer: RingStats,
    /// Entries written per second since construction.
    pub entries_per_second: f64,
}

impl AsyncLogWriter {
    /// Creates parent directories eagerly and, when enabled, spawns the
    /// single flush worker. Construction is the only fallible surface.
    pub fn new(config: WriterConfig) -> Result<Self, ChronicleError> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let shared = Arc::new(WriterShared {
            path: config.path.clone(),
            enabled: config.enabled,
            batch_size: config.batch_size.max(1),
            max_file_bytes: config.max_file_bytes().max(1),
            ring: RingBuffer::new(config.buffer_capacity),
            file_lock: Mutex::new(()),
            stop: CancellationToken::new(),
            started_at: Instant::now(),
            entries_written: AtomicU64::new(0),
            entries_lost: AtomicU64::new(0),
            batches_written: AtomicU64::new(0),
            flush_operations: AtomicU64::new(0),
            io_errors: AtomicU64::new(0),
            rotations_completed: AtomicU64::new(0),
            rotation_errors: AtomicU64::new(0),
        });

        let worker = if config.enabled {
            let shared_clone = Arc::clone(&shared);
            let interval = config.flush_interval();
            Some(tokio::spawn(async move {
                run_worker(shared_clone, interval).await;
            }))
        } else {
            None
        };

        Ok(Self {
            shared,
            worker: Mutex::new(worker),
        })
    }

    /// Builds an entry stamped with the current wall clock and appends it
    /// to the ring. No I/O, no blocking beyond the O(1) queue op, no
    /// panics. No-op when disabled or after shutdown.
    pub fn write_entry(
        &self,
        stage: impl Into<String>,
        correlation_id: Option<String>,
        event_id: Option<String>,
        data: Map<String, Value>,
    ) {
        if !self.shared.enabled || self.shared.stop.is_cancelled() {
            return;
        }
        self.shared
            .ring
            .append(LogEntry::new(stage, correlation_id, event_id, data));
    }

    /// Synchronously drains the whole buffer to disk, batch by batch.
    /// Safe to call from any thread while the worker runs; batch writes
    /// are serialized by the file lock.
    pub fn flush(&self) {
        if !self.shared.enabled {
            return;
        }
        self.shared.flush_operations.fetch_add(1, Ordering::Relaxed);
        while self.shared.drain_batch().taken > 0 {}
    }

    /// Stops the worker, joins it with a bounded wait, then performs one
    /// final flush. Idempotent; entries written after this returns are
    /// dropped silently (single-use lifecycle).
    pub async fn shutdown(&self) {
        self.shared.stop.cancel();

        let handle = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if tokio::time::timeout(SHUTDOWN_JOIN_WAIT, handle).await.is_err() {
                warn!("flush worker did not stop within the join window");
            }
        }

        self.flush();
    }

    pub fn stats(&self) -> WriterStats {
        let buffer = self.shared.ring.stats();
        let entries_written = self.shared.entries_written.load(Ordering::Relaxed);
        let elapsed = self.shared.started_at.elapsed().as_secs_f64();
        WriterStats {
            entries_buffered: buffer.size,
            entries_written,
            entries_lost: self.shared.entries_lost.load(Ordering::Relaxed),
            batches_written: self.shared.batches_written.load(Ordering::Relaxed),
            flush_operations: self.shared.flush_operations.load(Ordering::Relaxed),
            io_errors: self.shared.io_errors.load(Ordering::Relaxed),
            rotations_completed: self.shared.rotations_completed.load(Ordering::Relaxed),
            rotation_errors: self.shared.rotation_errors.load(Ordering::Relaxed),
            buffer,
            entries_per_second: if elapsed > 0.0 {
                entries_written as f64 / elapsed
            } else {
                0.0
            },
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.shared.path
    }
}

struct DrainOutcome {
    taken: usize,
    io_error: bool,
}

impl WriterShared {
    /// The one drain routine shared by the worker and manual flush():
    /// pop a batch, serialize outside every lock, then rotate-and-append
    /// under the file lock. A batch whose write fails is counted lost,
    /// never retried and never raised.
    fn drain_batch(&self) -> DrainOutcome {
        let batch = self.ring.take_batch(self.batch_size);
        if batch.is_empty() {
            return DrainOutcome {
                taken: 0,
                io_error: false,
            };
        }
        let taken = batch.len();

        let mut buf = String::new();
        let mut serialized = 0u64;
        for entry in &batch {
            match serde_json::to_string(entry) {
                Ok(line) => {
                    buf.push_str(&line);
                    buf.push('\n');
                    serialized += 1;
                }
                Err(e) => {
                    // Count and move on; one bad payload must not sink
                    // the rest of the batch.
                    self.entries_lost.fetch_add(1, Ordering::Relaxed);
                    warn!("entry serialization failed: {}", e);
                }
            }
        }
        if serialized == 0 {
            return DrainOutcome {
                taken,
                io_error: false,
            };
        }

        let _guard = self.file_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.rotate_if_oversized();

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(buf.as_bytes()));

        match result {
            Ok(()) => {
                self.entries_written.fetch_add(serialized, Ordering::Relaxed);
                self.batches_written.fetch_add(1, Ordering::Relaxed);
                DrainOutcome {
                    taken,
                    io_error: false,
                }
            }
            Err(e) => {
                self.io_errors.fetch_add(1, Ordering::Relaxed);
                self.entries_lost.fetch_add(serialized, Ordering::Relaxed);
                warn!("batch write failed, {} entries lost: {}", serialized, e);
                DrainOutcome {
                    taken,
                    io_error: true,
                }
            }
        }
    }

    /// Caller must hold the file lock. Renames the active file to
    /// `<path>.<unix-epoch-seconds>.jsonl` once it reaches the size
    /// threshold; the next append reopens a fresh active file. A failed
    /// rename is counted and appending continues into the oversized file.
    fn rotate_if_oversized(&self) {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => return, // no active file yet
        };
        if size < self.max_file_bytes {
            return;
        }

        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let mut rotated = self.path.as_os_str().to_os_string();
        rotated.push(format!(".{}.jsonl", epoch));

        match fs::rename(&self.path, &rotated) {
            Ok(()) => {
                self.rotations_completed.fetch_add(1, Ordering::Relaxed);
                info!("rotated log file to {:?} ({} bytes)", rotated, size);
            }
            Err(e) => {
                self.rotation_errors.fetch_add(1, Ordering::Relaxed);
                warn!("log rotation failed, continuing on active file: {}", e);
            }
        }
    }
}

/// Worker loop: wake on the flush cadence or the stop signal, drain one
/// batch per wake. Never panics; a failed write backs off briefly and
/// the loop continues.
async fn run_worker(shared: Arc<WriterShared>, flush_interval: Duration) {
    debug!("flush worker started ({:?} cadence)", flush_interval);
    let mut cadence = tokio::time::interval(flush_interval);
    cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // interval fires immediately on the first tick; consume it so the
    // first drain happens one full interval after construction.
    cadence.tick().await;

    loop {
        tokio::select! {
            _ = shared.stop.cancelled() => break,
            _ = cadence.tick() => {}
        }

        let outcome = shared.drain_batch();
        if outcome.io_error {
            tokio::time::sleep(IO_ERROR_BACKOFF).await;
        }
    }
    debug!("flush worker stopped");
}
