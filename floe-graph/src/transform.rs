use floe_window::Value;

use crate::event::{Event, KeyedEvent};
use crate::GraphError;

/// Turns one raw source value into zero or more timestamped events.
pub trait Transform: Send + Sync {
    fn transform(&self, value: Value) -> Result<Vec<Event>, GraphError>;
}

/// Assigns grouping keys to an event. Usually one key; returning more than
/// one fans the event out to several independent per-key state machines.
pub trait GroupBy: Send + Sync {
    fn keys(&self, event: &Event) -> Vec<String>;
}

/// `GroupAndWindowBy`: expands one `Event` into the `KeyedEvent`s the
/// shuffle carries. Window span assignment itself happens later, inside the
/// Reduce sub-task's merge (the event only needs its timestamp and key to
/// reach the right reducer).
pub fn group_and_window_by(event: &Event, group_by: &dyn GroupBy) -> Vec<KeyedEvent> {
    group_by
        .keys(event)
        .into_iter()
        .map(|key| KeyedEvent {
            timestamp: event.timestamp,
            key,
            message: event.message.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    struct SplitWords;
    impl GroupBy for SplitWords {
        fn keys(&self, event: &Event) -> Vec<String> {
            event
                .message
                .as_str()
                .unwrap_or_default()
                .split_whitespace()
                .map(|w| w.to_lowercase())
                .collect()
        }
    }

    #[test]
    fn one_event_fans_out_to_every_key() {
        let event = Event {
            id: "1".into(),
            timestamp: Utc::now(),
            message: json!("a a b"),
        };
        let keyed = group_and_window_by(&event, &SplitWords);
        let keys: Vec<&str> = keyed.iter().map(|k| k.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "a", "b"]);
    }
}
