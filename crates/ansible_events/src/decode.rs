use std::{collections::HashMap, sync::OnceLock};

use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::value::RawValue;

use crate::{types::object, AnsibleEvent, DecodeError, EventKind};

/// Tag plus the still-encoded payload; the payload is only decoded once the
/// tag has picked a schema.
#[derive(Deserialize)]
struct Envelope {
    // `null` reads as a missing tag.
    #[serde(rename = "eventType", default)]
    event_type: Option<String>,
    #[serde(rename = "eventData", default, deserialize_with = "present")]
    event_data: Option<Box<RawValue>>,
}

// Keeps an explicit `null` distinct from a missing key.
fn present<'de, D>(deserializer: D) -> Result<Option<Box<RawValue>>, D::Error>
where
    D: Deserializer<'de>,
{
    Box::<RawValue>::deserialize(deserializer).map(Some)
}

type DecodeFn = fn(&RawValue) -> serde_json::Result<AnsibleEvent>;

fn payload<T: DeserializeOwned>(raw: &RawValue) -> serde_json::Result<T> {
    let mut deserializer = serde_json::Deserializer::from_str(raw.get());
    let value = object(&mut deserializer)?;
    deserializer.end()?;
    Ok(value)
}

fn decoders() -> &'static HashMap<&'static str, DecodeFn> {
    static DECODERS: OnceLock<HashMap<&'static str, DecodeFn>> = OnceLock::new();
    DECODERS.get_or_init(|| {
        let entries: [(EventKind, DecodeFn); 12] = [
            (EventKind::PlaybookStart, |raw| {
                payload(raw).map(AnsibleEvent::PlaybookStart)
            }),
            (EventKind::PlaybookEnd, |raw| {
                payload(raw).map(AnsibleEvent::PlaybookEnd)
            }),
            (EventKind::PlayStart, |raw| payload(raw).map(AnsibleEvent::PlayStart)),
            (EventKind::TaskStart, |raw| payload(raw).map(AnsibleEvent::TaskStart)),
            (EventKind::HandlerTaskStart, |raw| {
                payload(raw).map(AnsibleEvent::HandlerTaskStart)
            }),
            (EventKind::RunnerOk, |raw| payload(raw).map(AnsibleEvent::RunnerOk)),
            (EventKind::RunnerItemOk, |raw| {
                payload(raw).map(AnsibleEvent::RunnerItemOk)
            }),
            (EventKind::RunnerItemFailed, |raw| {
                payload(raw).map(AnsibleEvent::RunnerItemFailed)
            }),
            (EventKind::RunnerItemRetry, |raw| {
                payload(raw).map(AnsibleEvent::RunnerItemRetry)
            }),
            (EventKind::RunnerFailed, |raw| {
                payload(raw).map(AnsibleEvent::RunnerFailed)
            }),
            (EventKind::RunnerSkipped, |raw| {
                payload(raw).map(AnsibleEvent::RunnerSkipped)
            }),
            (EventKind::RunnerUnreachable, |raw| {
                payload(raw).map(AnsibleEvent::RunnerUnreachable)
            }),
        ];
        entries
            .into_iter()
            .map(|(kind, decode)| (kind.tag(), decode))
            .collect()
    })
}

/// Decodes one JSONL line into a typed [`AnsibleEvent`].
///
/// Stateless: the same line always yields the same outcome.
pub fn decode_line(line: &str) -> Result<AnsibleEvent, DecodeError> {
    decode_line_bytes(line.as_bytes())
}

/// Byte-oriented variant of [`decode_line`]. Invalid UTF-8 is reported as
/// [`DecodeError::EnvelopeParse`].
pub fn decode_line_bytes(line: &[u8]) -> Result<AnsibleEvent, DecodeError> {
    let envelope: Envelope =
        serde_json::from_slice(line).map_err(|source| DecodeError::EnvelopeParse {
            line: lossy(line),
            source,
        })?;

    let tag = envelope.event_type.unwrap_or_default();
    let Some(decode) = decoders().get(tag.as_str()) else {
        return Err(DecodeError::UnknownEventType { tag });
    };

    let Some(data) = envelope.event_data else {
        return Err(DecodeError::PayloadDecode {
            tag,
            line: lossy(line),
            source: <serde_json::Error as serde::de::Error>::missing_field("eventData"),
        });
    };

    decode(&data).map_err(|source| DecodeError::PayloadDecode {
        tag,
        line: lossy(line),
        source,
    })
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}
