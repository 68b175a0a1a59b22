use chronicle::{ChainConfig, ChainLogger, WriterConfig};
use serde_json::{json, Map, Value};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::info;
use uuid::Uuid;

const TICK_MS: u64 = 20;

fn payload(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Driver harness: pushes a synthetic stimulus pipeline through the
/// chain logger at a fixed cadence until Ctrl+C, then shuts down
/// gracefully and reports the writer's counters.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    info!("Chronicle driver booting. Tick: {}ms", TICK_MS);

    let config = ChainConfig {
        detailed: true,
        tick_sample_interval: 50,
        writer: WriterConfig {
            path: "logs/agent_events.jsonl".into(),
            flush_interval_secs: 0.5,
            ..WriterConfig::default()
        },
    };
    let logger = ChainLogger::new(config)?;

    let mut cadence = interval(Duration::from_millis(TICK_MS));
    cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tick: u64 = 0;

    info!("Chronicle driver active. Press Ctrl+C to stop.");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = cadence.tick() => {}
        }
        tick += 1;
        logger.log_tick_start(tick, 0);

        // A stimulus every five ticks, traced through the whole pipeline.
        if tick % 5 == 0 {
            let event_id = Uuid::new_v4().to_string();
            let cid = logger.log_event(
                Some(event_id),
                None,
                payload(json!({"kind": "stimulus", "tick": tick})),
            );
            logger.log_meaning(&cid, payload(json!({"salience": 0.8})));
            logger.log_decision(&cid, payload(json!({"mode": "respond"})));
            logger.log_action(&cid, payload(json!({"output": "speech", "tick": tick})));
            logger.log_feedback(&cid, payload(json!({"accepted": tick % 10 != 0})));
        }

        logger.log_tick_end(tick);
    }

    info!("Chronicle driver stopping");
    logger.shutdown().await;

    let stats = logger.stats();
    info!(
        "session written={} dropped={} batches={} io_errors={} rate={:.1}/s",
        stats.entries_written,
        stats.buffer.dropped_entries,
        stats.batches_written,
        stats.io_errors,
        stats.entries_per_second,
    );
    Ok(())
}
