//! Lifecycle events for compositions.
//!
//! Pipelines and unions report fit progress to an [`EventSink`]. A sink can
//! be attached per composition; otherwise the process-wide sink set with
//! [`set_event_sink`] is used, falling back to [`NoOpEventSink`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::utils::{generate_run_id, iso_timestamp};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::Arc;

static GLOBAL_EVENT_SINK: RwLock<Option<Arc<dyn EventSink>>> = RwLock::new(None);

/// Sets the process-wide event sink.
pub fn set_event_sink(sink: Arc<dyn EventSink>) {
    *GLOBAL_EVENT_SINK.write() = Some(sink);
}

/// Clears the process-wide event sink.
pub fn clear_event_sink() {
    *GLOBAL_EVENT_SINK.write() = None;
}

/// Gets the process-wide event sink, or a [`NoOpEventSink`] if none is set.
pub fn get_event_sink() -> Arc<dyn EventSink> {
    GLOBAL_EVENT_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(NoOpEventSink))
}

/// Emits events for a single `fit` call, stamping each payload with the
/// run id, owner and timestamp.
pub(crate) struct RunEvents {
    sink: Arc<dyn EventSink>,
    run_id: String,
    owner: String,
}

impl RunEvents {
    pub(crate) fn start(sink: Option<&Arc<dyn EventSink>>, owner: impl Into<String>) -> Self {
        Self {
            sink: sink.map_or_else(get_event_sink, Arc::clone),
            run_id: generate_run_id(),
            owner: owner.into(),
        }
    }

    pub(crate) fn run_id(&self) -> &str {
        &self.run_id
    }

    pub(crate) fn emit(&self, event_type: &str, extra: Value) {
        let mut payload = json!({
            "run_id": self.run_id,
            "owner": self.owner,
            "timestamp": iso_timestamp(),
        });
        if let (Value::Object(target), Value::Object(fields)) = (&mut payload, extra) {
            target.extend(fields);
        }
        self.sink.emit(event_type, Some(payload));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_events_stamp_payload() {
        let sink = Arc::new(CollectingEventSink::new());
        let as_dyn: Arc<dyn EventSink> = sink.clone();
        let events = RunEvents::start(Some(&as_dyn), "Pipeline");
        events.emit("pipeline.fit.started", json!({"steps": 2}));

        let recorded = sink.events();
        assert_eq!(recorded.len(), 1);
        let data = recorded[0].1.clone().unwrap_or_default();
        assert_eq!(data["run_id"], events.run_id());
        assert_eq!(data["owner"], "Pipeline");
        assert_eq!(data["steps"], 2);
        assert!(data["timestamp"].is_string());
    }

    #[test]
    fn test_global_sink_receives_unrouted_events_until_cleared() {
        let sink = Arc::new(CollectingEventSink::new());
        set_event_sink(sink.clone());
        RunEvents::start(None, "GlobalSinkCheck").emit("global_sink_check.before", json!({}));
        clear_event_sink();
        RunEvents::start(None, "GlobalSinkCheck").emit("global_sink_check.after", json!({}));
        get_event_sink().emit("global_sink_check.fallback", None);

        let seen = sink.events_of_type("global_sink_check");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "global_sink_check.before");
        let data = seen[0].1.clone().unwrap_or_default();
        assert_eq!(data["owner"], "GlobalSinkCheck");
    }
}
