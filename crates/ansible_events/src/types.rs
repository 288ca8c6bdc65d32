use std::{collections::BTreeMap, fmt, marker::PhantomData};

use serde::{
    de::{value::MapAccessDeserializer, MapAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};
use serde_json::Value;

/// Wire tag identifying one member of the closed event set.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum EventKind {
    PlaybookStart,
    PlaybookEnd,
    PlayStart,
    TaskStart,
    HandlerTaskStart,
    RunnerOk,
    RunnerItemOk,
    RunnerItemFailed,
    RunnerItemRetry,
    RunnerFailed,
    RunnerSkipped,
    RunnerUnreachable,
}

impl EventKind {
    pub const ALL: [EventKind; 12] = [
        EventKind::PlaybookStart,
        EventKind::PlaybookEnd,
        EventKind::PlayStart,
        EventKind::TaskStart,
        EventKind::HandlerTaskStart,
        EventKind::RunnerOk,
        EventKind::RunnerItemOk,
        EventKind::RunnerItemFailed,
        EventKind::RunnerItemRetry,
        EventKind::RunnerFailed,
        EventKind::RunnerSkipped,
        EventKind::RunnerUnreachable,
    ];

    /// The `eventType` value emitted by the runner callback for this kind.
    pub fn tag(self) -> &'static str {
        match self {
            EventKind::PlaybookStart => "PLAYBOOK_START",
            EventKind::PlaybookEnd => "PLAYBOOK_END",
            EventKind::PlayStart => "PLAY_START",
            EventKind::TaskStart => "TASK_START",
            EventKind::HandlerTaskStart => "HANDLER_TASK_START",
            EventKind::RunnerOk => "RUNNER_OK",
            EventKind::RunnerItemOk => "RUNNER_ITEM_OK",
            EventKind::RunnerItemFailed => "RUNNER_ITEM_FAILED",
            EventKind::RunnerItemRetry => "RUNNER_ITEM_RETRY",
            EventKind::RunnerFailed => "RUNNER_FAILED",
            EventKind::RunnerSkipped => "RUNNER_SKIPPED",
            EventKind::RunnerUnreachable => "RUNNER_UNREACHABLE",
        }
    }
}

/// A single lifecycle step reported by the Ansible runner.
///
/// Events carry no identity beyond their position in the stream they were read from.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "eventType", content = "eventData")]
pub enum AnsibleEvent {
    #[serde(rename = "PLAYBOOK_START")]
    PlaybookStart(PlaybookStart),
    #[serde(rename = "PLAYBOOK_END")]
    PlaybookEnd(PlaybookEnd),
    #[serde(rename = "PLAY_START")]
    PlayStart(PlayStart),
    #[serde(rename = "TASK_START")]
    TaskStart(TaskStart),
    #[serde(rename = "HANDLER_TASK_START")]
    HandlerTaskStart(HandlerTaskStart),
    #[serde(rename = "RUNNER_OK")]
    RunnerOk(RunnerResultEvent),
    #[serde(rename = "RUNNER_ITEM_OK")]
    RunnerItemOk(RunnerResultEvent),
    #[serde(rename = "RUNNER_ITEM_FAILED")]
    RunnerItemFailed(RunnerResultEvent),
    #[serde(rename = "RUNNER_ITEM_RETRY")]
    RunnerItemRetry(RunnerResultEvent),
    #[serde(rename = "RUNNER_FAILED")]
    RunnerFailed(RunnerResultEvent),
    #[serde(rename = "RUNNER_SKIPPED")]
    RunnerSkipped(RunnerResultEvent),
    #[serde(rename = "RUNNER_UNREACHABLE")]
    RunnerUnreachable(RunnerResultEvent),
}

impl AnsibleEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AnsibleEvent::PlaybookStart(_) => EventKind::PlaybookStart,
            AnsibleEvent::PlaybookEnd(_) => EventKind::PlaybookEnd,
            AnsibleEvent::PlayStart(_) => EventKind::PlayStart,
            AnsibleEvent::TaskStart(_) => EventKind::TaskStart,
            AnsibleEvent::HandlerTaskStart(_) => EventKind::HandlerTaskStart,
            AnsibleEvent::RunnerOk(_) => EventKind::RunnerOk,
            AnsibleEvent::RunnerItemOk(_) => EventKind::RunnerItemOk,
            AnsibleEvent::RunnerItemFailed(_) => EventKind::RunnerItemFailed,
            AnsibleEvent::RunnerItemRetry(_) => EventKind::RunnerItemRetry,
            AnsibleEvent::RunnerFailed(_) => EventKind::RunnerFailed,
            AnsibleEvent::RunnerSkipped(_) => EventKind::RunnerSkipped,
            AnsibleEvent::RunnerUnreachable(_) => EventKind::RunnerUnreachable,
        }
    }

    /// Result payload for runner events; `None` for playbook/play/task markers.
    pub fn runner_result(&self) -> Option<&RunnerResultEvent> {
        match self {
            AnsibleEvent::RunnerOk(ev)
            | AnsibleEvent::RunnerItemOk(ev)
            | AnsibleEvent::RunnerItemFailed(ev)
            | AnsibleEvent::RunnerItemRetry(ev)
            | AnsibleEvent::RunnerFailed(ev)
            | AnsibleEvent::RunnerSkipped(ev)
            | AnsibleEvent::RunnerUnreachable(ev) => Some(ev),
            _ => None,
        }
    }
}

/// Deserializes `T` from a map only. Derived struct impls also accept a
/// sequence of positional fields, which the runner never emits.
pub(crate) fn object<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct ObjectVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for ObjectVisitor<T> {
        type Value = T;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a JSON object")
        }

        fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<T, A::Error> {
            T::deserialize(MapAccessDeserializer::new(map))
        }
    }

    deserializer.deserialize_map(ObjectVisitor(PhantomData))
}

// Keys are matched case-sensitively, exactly as the runner callback writes them.

/// Emitted once when the playbook begins.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlaybookStart {
    pub name: String,
    /// Number of plays the runner expects to execute.
    pub count: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlaybookEnd {
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlayStart {
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TaskStart {
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HandlerTaskStart {
    pub name: String,
}

/// Per-host outcome of a task (or of one loop item of a task).
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerResultEvent {
    pub host: String,
    #[serde(rename = "ignoreErrors")]
    pub ignore_errors: bool,
    #[serde(deserialize_with = "object")]
    pub result: RunnerResult,
}

/// The module result as reported by Ansible. Keys the runner adds beyond the
/// ones modelled here are kept in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerResult {
    #[serde(rename = "msg")]
    pub message: String,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<Value>,
    pub changed: bool,
    pub failed: bool,
    pub skipped: bool,
    pub unreachable: bool,
    pub attempts: u32,
    pub retries: u32,
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_unique() {
        let mut tags: Vec<_> = EventKind::ALL.iter().map(|kind| kind.tag()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), EventKind::ALL.len());
    }

    #[test]
    fn serializes_back_to_envelope_shape() {
        let event = AnsibleEvent::TaskStart(TaskStart {
            name: "install packages".to_string(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "eventType": "TASK_START",
                "eventData": { "name": "install packages" }
            })
        );
    }

    #[test]
    fn runner_result_is_exposed_only_for_runner_events() {
        let runner = AnsibleEvent::RunnerSkipped(RunnerResultEvent::default());
        let marker = AnsibleEvent::PlaybookEnd(PlaybookEnd::default());
        assert!(runner.runner_result().is_some());
        assert!(marker.runner_result().is_none());
    }
}
