use chronicle::{AsyncLogWriter, WriterConfig};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn test_config(path: &Path) -> WriterConfig {
    WriterConfig {
        path: path.to_path_buf(),
        enabled: true,
        buffer_capacity: 512,
        batch_size: 64,
        // Long cadence so tests control draining via flush()/shutdown().
        flush_interval_secs: 30.0,
        max_file_size_mb: 50.0,
    }
}

fn payload(tag: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("tag".to_string(), json!(tag));
    map
}

fn read_lines(path: &Path) -> Vec<Value> {
    let content = fs::read_to_string(path).unwrap_or_default();
    content
        .lines()
        .map(|line| serde_json::from_str(line).expect("every line is valid JSON"))
        .collect()
}

#[tokio::test]
async fn flush_makes_entries_immediately_visible() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let writer = AsyncLogWriter::new(test_config(&path)).unwrap();

    // 1. Write before the flush interval could possibly elapse
    writer.write_entry("event", Some("chain_1".to_string()), None, payload("x"));
    writer.flush();

    // 2. Entry is on disk now, not on the next worker wake
    let lines = read_lines(&path);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["stage"], "event");
    assert_eq!(lines[0]["correlation_id"], "chain_1");

    writer.shutdown().await;
}

#[tokio::test]
async fn conservation_law_under_concurrent_producers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let writer = Arc::new(AsyncLogWriter::new(test_config(&path)).unwrap());

    const THREADS: usize = 8;
    const PER_THREAD: usize = 1000;

    // 1. Hammer the writer from plain OS threads; write_entry is sync
    //    and must never panic or block on I/O
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let writer = Arc::clone(&writer);
            std::thread::spawn(move || {
                for i in 0..PER_THREAD {
                    writer.write_entry(
                        "event",
                        Some(format!("chain_{}", t)),
                        None,
                        payload(&format!("{}:{}", t, i)),
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("producer must not panic");
    }

    // 2. Drain whatever survived the ring
    writer.shutdown().await;

    // 3. written + dropped == produced
    let stats = writer.stats();
    let produced = (THREADS * PER_THREAD) as u64;
    assert_eq!(
        stats.entries_written + stats.buffer.dropped_entries,
        produced,
        "conservation law must hold"
    );
    assert_eq!(stats.io_errors, 0);
    assert_eq!(stats.entries_lost, 0);

    let lines = read_lines(&path);
    assert_eq!(lines.len() as u64, stats.entries_written);
}

#[tokio::test]
async fn rotation_produces_one_suffixed_file_and_a_fresh_active_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let mut config = test_config(&path);
    // ~1 KiB threshold so a handful of entries crosses it
    config.max_file_size_mb = 0.001;
    let writer = AsyncLogWriter::new(config).unwrap();

    // 1. Fill the active file past the threshold
    for i in 0..20 {
        writer.write_entry("event", None, None, payload(&format!("fill-{}", i)));
    }
    writer.flush();
    assert!(fs::metadata(&path).unwrap().len() >= 1024);

    // 2. One more flush triggers the rename before its batch write
    writer.write_entry("event", None, None, payload("after-rotation"));
    writer.flush();

    let rotated: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("events.jsonl.") && name.ends_with(".jsonl"))
        .collect();
    assert_eq!(rotated.len(), 1, "exactly one rotated file: {:?}", rotated);

    // 3. Active file was reopened fresh and holds only the new batch
    let lines = read_lines(&path);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["data"]["tag"], "after-rotation");

    let stats = writer.stats();
    assert_eq!(stats.rotations_completed, 1);
    assert_eq!(stats.rotation_errors, 0);

    writer.shutdown().await;
}

#[tokio::test]
async fn shutdown_is_idempotent_and_does_not_duplicate_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let writer = AsyncLogWriter::new(test_config(&path)).unwrap();

    for i in 0..10 {
        writer.write_entry("event", None, None, payload(&format!("e{}", i)));
    }

    writer.shutdown().await;
    let first = read_lines(&path).len();
    assert_eq!(first, 10);

    // Second shutdown: no panic, no duplicated final flush
    writer.shutdown().await;
    assert_eq!(read_lines(&path).len(), first);
}

#[tokio::test]
async fn writes_after_shutdown_are_safe_noops() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let writer = AsyncLogWriter::new(test_config(&path)).unwrap();

    writer.write_entry("event", None, None, payload("before"));
    writer.shutdown().await;
    assert_eq!(read_lines(&path).len(), 1);

    writer.write_entry("event", None, None, payload("after"));
    writer.flush();
    assert_eq!(read_lines(&path).len(), 1, "post-shutdown write must vanish");
}

#[tokio::test]
async fn disabled_writer_never_touches_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let mut config = test_config(&path);
    config.enabled = false;
    let writer = AsyncLogWriter::new(config).unwrap();

    writer.write_entry("event", None, None, payload("x"));
    writer.flush();
    writer.shutdown().await;

    assert!(!path.exists());
    let stats = writer.stats();
    assert_eq!(stats.entries_written, 0);
    assert_eq!(stats.entries_buffered, 0);
}

#[tokio::test]
async fn worker_drains_on_its_own_cadence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let mut config = test_config(&path);
    config.flush_interval_secs = 0.05;
    let writer = AsyncLogWriter::new(config).unwrap();

    writer.write_entry("event", None, None, payload("bg"));

    // No manual flush: the background worker must land the entry
    let mut landed = false;
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        if !read_lines(&path).is_empty() {
            landed = true;
            break;
        }
    }
    assert!(landed, "worker never flushed the entry");

    writer.shutdown().await;
}
