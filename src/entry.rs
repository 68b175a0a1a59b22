use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Well-known pipeline stages. `write_entry` still accepts any free-form
/// stage string; this enum just names the ones the chain logger emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Event,
    Meaning,
    Decision,
    Action,
    Feedback,
    TickStart,
    TickEnd,
    Error,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Event => "event",
            Stage::Meaning => "meaning",
            Stage::Decision => "decision",
            Stage::Action => "action",
            Stage::Feedback => "feedback",
            Stage::TickStart => "tick_start",
            Stage::TickEnd => "tick_end",
            Stage::Error => "error",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record in the event stream. Immutable once built; the buffer slot
/// owns it until it is popped into a batch.
///
/// Serializes to a single JSONL line:
/// `{"timestamp": <float>, "stage": <string>, "correlation_id": <string|null>,
///  "event_id": <string|null>, "data": <object>}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Wall-clock seconds since the unix epoch.
    pub timestamp: f64,
    pub stage: String,
    pub correlation_id: Option<String>,
    pub event_id: Option<String>,
    pub data: Map<String, Value>,
}

impl LogEntry {
    pub fn new(
        stage: impl Into<String>,
        correlation_id: Option<String>,
        event_id: Option<String>,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            timestamp: now_secs(),
            stage: stage.into(),
            correlation_id,
            event_id,
            data,
        }
    }
}

pub(crate) fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_serializes_to_expected_shape() {
        let mut data = Map::new();
        data.insert("tick".to_string(), json!(42));

        let entry = LogEntry::new("decision", Some("chain_7".to_string()), None, data);
        let line = serde_json::to_string(&entry).unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["stage"], "decision");
        assert_eq!(value["correlation_id"], "chain_7");
        assert_eq!(value["event_id"], Value::Null);
        assert_eq!(value["data"]["tick"], 42);
        assert!(value["timestamp"].as_f64().unwrap() > 0.0);
    }
}
